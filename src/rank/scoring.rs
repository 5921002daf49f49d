//! Debate score: engagement + priority tier + controversy + freshness/velocity,
//! minus a penalty for subjects that dominated recent scans.
//!
//! Replies dominate (debate), retweets signal spread, likes break ties.
//! Pure: the result depends only on the post, `now`, the vocabulary, the params,
//! and the overexposure snapshot passed in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::params::RankParams;
use super::vocab::TopicVocab;
use crate::search::types::RawPost;

/// Read-only view of which subjects were overexposed in recent scans.
pub trait SubjectHistory: Send + Sync {
    /// 0 = not overexposed; higher means a larger penalty.
    fn severity_for(&self, subject: &str) -> u8;
}

/// No cross-run memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl SubjectHistory for NoHistory {
    fn severity_for(&self, _subject: &str) -> u8 {
        0
    }
}

impl SubjectHistory for BTreeMap<String, u8> {
    fn severity_for(&self, subject: &str) -> u8 {
        self.get(subject).copied().unwrap_or(0)
    }
}

/// Per-component contributions; `total` is their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub engagement: i64,
    pub priority: i64,
    pub controversy: i64,
    pub freshness: i64,
    pub velocity: i64,
    pub penalty: i64,
    pub total: i64,
}

pub fn age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - created_at).num_seconds().max(0);
    secs as f64 / 3600.0
}

fn weighted(count: u64, weight: i64) -> i64 {
    i64::try_from(count)
        .unwrap_or(i64::MAX)
        .saturating_mul(weight)
}

pub fn score_breakdown(
    post: &RawPost,
    subjects: &BTreeSet<String>,
    now: DateTime<Utc>,
    vocab: &TopicVocab,
    params: &RankParams,
    history: &dyn SubjectHistory,
) -> ScoreBreakdown {
    let text_lc = post.text.to_lowercase();
    let m = &post.metrics;
    let age = age_hours(post.created_at, now);

    let engagement = weighted(m.reply_count, params.w_reply)
        .saturating_add(weighted(m.retweet_count, params.w_retweet))
        .saturating_add(weighted(m.like_count, params.w_like));

    let (_, priority) = vocab.priority_for(&text_lc);

    let controversy = if vocab.has_controversy(&text_lc) {
        params.controversy_bonus
    } else {
        0
    };

    let freshness = params
        .freshness
        .iter()
        .find(|t| age < t.max_age_hours)
        .map(|t| t.bonus)
        .unwrap_or(0);

    let velocity = if age < params.velocity_max_age_hours
        && m.reply_count > params.velocity_min_replies
    {
        weighted(m.reply_count, params.velocity_per_reply)
    } else {
        0
    };

    let penalty = subjects
        .iter()
        .map(|s| params.overexposure_penalty.saturating_mul(history.severity_for(s) as i64))
        .fold(0i64, i64::saturating_add);

    let total = engagement
        .saturating_add(priority)
        .saturating_add(controversy)
        .saturating_add(freshness)
        .saturating_add(velocity)
        .saturating_sub(penalty);

    ScoreBreakdown {
        engagement,
        priority,
        controversy,
        freshness,
        velocity,
        penalty,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::subjects::extract_subjects;
    use crate::search::types::Engagement;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 5, 18, 0, 0).unwrap()
    }

    fn post(text: &str, age_h: i64, replies: u64, rts: u64, likes: u64) -> RawPost {
        RawPost {
            id: "p".into(),
            text: text.into(),
            author_handle: "fan".into(),
            author_name: "Fan".into(),
            created_at: now() - Duration::hours(age_h),
            metrics: Engagement {
                reply_count: replies,
                retweet_count: rts,
                like_count: likes,
                impression_count: Some(1_000_000),
            },
            references: vec![],
            media: vec![],
        }
    }

    fn score(p: &RawPost, history: &dyn SubjectHistory) -> ScoreBreakdown {
        let v = TopicVocab::default_seed();
        let subjects = extract_subjects(&p.text, &v);
        score_breakdown(p, &subjects, now(), &v, &RankParams::default(), history)
    }

    #[test]
    fn reference_weighting() {
        // 2 days old: no freshness, no velocity.
        let b = score(&post("Broncos looked fine", 48, 2, 3, 10), &NoHistory);
        assert_eq!(b.engagement, 2 * 75_000 + 3 * 1_200 + 10 * 8);
        assert_eq!(b.priority, 50);
        assert_eq!(b.controversy, 0);
        assert_eq!(b.freshness, 0);
        assert_eq!(b.velocity, 0);
        assert_eq!(b.total, b.engagement + 50);
    }

    #[test]
    fn freshness_tiers_and_velocity() {
        let b = score(&post("Broncos", 2, 10, 0, 0), &NoHistory);
        assert_eq!(b.freshness, 100_000);
        assert_eq!(b.velocity, 10 * 20_000);

        let b = score(&post("Broncos", 7, 10, 0, 0), &NoHistory);
        assert_eq!(b.freshness, 50_000);
        assert_eq!(b.velocity, 10 * 20_000);

        let b = score(&post("Broncos", 9, 10, 0, 0), &NoHistory);
        assert_eq!(b.freshness, 50_000);
        assert_eq!(b.velocity, 0);

        // Exactly three replies is not "more than a handful".
        let b = score(&post("Broncos", 1, 3, 0, 0), &NoHistory);
        assert_eq!(b.velocity, 0);
    }

    #[test]
    fn controversy_adds_fixed_bonus() {
        let plain = score(&post("Bo Nix played today", 30, 50, 10, 100), &NoHistory);
        let hot = score(&post("Bo Nix is overrated today", 30, 50, 10, 100), &NoHistory);
        assert_eq!(hot.total - plain.total, 250_000);
    }

    #[test]
    fn overexposed_subjects_are_penalized_per_tag() {
        let mut hist = BTreeMap::new();
        hist.insert("Bo Nix".to_string(), 3u8);
        hist.insert("Contracts".to_string(), 1u8);
        let p = post("Bo Nix contract talks", 48, 1, 0, 0);
        let b = score(&p, &hist);
        assert_eq!(b.penalty, 50_000 * 3 + 50_000);
        assert_eq!(b.total, b.engagement + b.priority - b.penalty);
    }

    #[test]
    fn future_timestamps_count_as_brand_new() {
        let p = post("Broncos", -3, 0, 0, 0);
        assert_eq!(age_hours(p.created_at, now()), 0.0);
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let b = score(&post("Broncos", 48, u64::MAX, u64::MAX, u64::MAX), &NoHistory);
        assert_eq!(b.total, i64::MAX);
    }
}
