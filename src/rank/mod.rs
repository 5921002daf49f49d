// src/rank/mod.rs
//! Debate ranking engine: dedupe → classify → score/tag → sort → partition →
//! diversity-capped selection with relaxation tiers.
//!
//! The engine never performs I/O. The fallback search for a short primary list
//! is issued by the caller, which then hands the batch to `admit_fallback`.

pub mod classify;
pub mod dedup;
pub mod params;
pub mod scoring;
pub mod select;
pub mod subjects;
pub mod vocab;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use crate::search::types::{Batch, BatchKind, Engagement, GroupRole, Media, RawPost, ReferenceKind};

pub use classify::{classify_post, Classification, RejectReason};
pub use dedup::NearDuplicateGuard;
pub use params::{HotReloadParams, RankParams};
pub use scoring::{score_breakdown, NoHistory, ScoreBreakdown, SubjectHistory};
pub use select::GroupSelection;
pub use subjects::extract_subjects;
pub use vocab::TopicVocab;

/// A post that survived filtering, with its score and tags.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPost {
    pub id: String,
    pub text: String,
    pub author_handle: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub metrics: Engagement,
    pub references: Vec<ReferenceKind>,
    pub media: Vec<Media>,
    pub url: String,
    pub debate_score: i64,
    pub breakdown: ScoreBreakdown,
    pub priority_label: String,
    pub subjects: BTreeSet<String>,
    pub is_fresh: bool,
    pub age_hours: f64,
    pub group: GroupRole,
    pub source_kind: BatchKind,
}

/// Score desc, then newer first, then id for a total order.
pub(crate) fn by_score_desc(a: &ScoredPost, b: &ScoredPost) -> Ordering {
    b.debate_score
        .cmp(&a.debate_score)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Inputs that are not part of the post itself.
pub struct RankContext<'a> {
    pub now: DateTime<Utc>,
    pub history: &'a dyn SubjectHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankStats {
    pub fetched: usize,
    pub excluded: usize,
    pub duplicates: usize,
    pub not_original: usize,
    pub spam: usize,
    pub off_topic: usize,
    pub near_duplicates: usize,
    pub scored: usize,
}

impl RankStats {
    fn count_reject(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::NotOriginal => self.not_original += 1,
            RejectReason::Spam => self.spam += 1,
            RejectReason::OffTopic => self.off_topic += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub primary: GroupSelection,
    pub secondary: GroupSelection,
    pub stats: RankStats,
    pub fallback_used: bool,
    #[serde(skip)]
    seen: HashSet<String>,
    #[serde(skip)]
    guard: NearDuplicateGuard,
}

impl Ranking {
    pub fn group(&self, role: GroupRole) -> &GroupSelection {
        match role {
            GroupRole::Primary => &self.primary,
            GroupRole::Secondary => &self.secondary,
        }
    }

    /// Every selected post, primary first.
    pub fn all_posts(&self) -> impl Iterator<Item = &ScoredPost> {
        self.primary.posts.iter().chain(self.secondary.posts.iter())
    }
}

#[derive(Debug, Clone)]
pub struct RankEngine {
    vocab: TopicVocab,
    params: RankParams,
}

impl RankEngine {
    pub fn new(vocab: TopicVocab, params: RankParams) -> Self {
        Self { vocab, params }
    }

    pub fn vocab(&self) -> &TopicVocab {
        &self.vocab
    }

    pub fn params(&self) -> &RankParams {
        &self.params
    }

    /// Same engine with a different parameter set (hot-reloaded params).
    pub fn with_params(&self, params: RankParams) -> Self {
        Self {
            vocab: self.vocab.clone(),
            params,
        }
    }

    pub fn classify_post(&self, post: &RawPost, kind: BatchKind) -> Classification {
        classify_post(post, kind, &self.vocab, &self.params)
    }

    pub fn extract_subjects(&self, text: &str) -> BTreeSet<String> {
        extract_subjects(text, &self.vocab)
    }

    pub fn score(&self, post: &RawPost, ctx: &RankContext<'_>) -> i64 {
        let subjects = self.extract_subjects(&post.text);
        score_breakdown(post, &subjects, ctx.now, &self.vocab, &self.params, ctx.history).total
    }

    /// Primary keyword first, then secondary, else the batch's own label.
    pub fn group_for(&self, text: &str, batch_group: GroupRole) -> GroupRole {
        let text_lc = text.to_lowercase();
        if self.vocab.primary.mentions(&text_lc) {
            GroupRole::Primary
        } else if self.vocab.secondary.mentions(&text_lc) {
            GroupRole::Secondary
        } else {
            batch_group
        }
    }

    fn group_name(&self, role: GroupRole) -> &str {
        match role {
            GroupRole::Primary => &self.vocab.primary.name,
            GroupRole::Secondary => &self.vocab.secondary.name,
        }
    }

    pub fn score_post(
        &self,
        post: &RawPost,
        batch_group: GroupRole,
        kind: BatchKind,
        ctx: &RankContext<'_>,
    ) -> ScoredPost {
        let subjects = self.extract_subjects(&post.text);
        let breakdown =
            score_breakdown(post, &subjects, ctx.now, &self.vocab, &self.params, ctx.history);
        let (priority_label, _) = self.vocab.priority_for(&post.text.to_lowercase());
        let age_hours = scoring::age_hours(post.created_at, ctx.now);
        ScoredPost {
            id: post.id.clone(),
            text: post.text.clone(),
            author_handle: post.author_handle.clone(),
            author_name: post.author_name.clone(),
            created_at: post.created_at,
            metrics: post.metrics,
            references: post.references.clone(),
            media: post.media.clone(),
            url: post.url(),
            debate_score: breakdown.total,
            breakdown,
            priority_label: priority_label.to_string(),
            subjects,
            is_fresh: age_hours < self.params.fresh_hours,
            age_hours,
            group: self.group_for(&post.text, batch_group),
            source_kind: kind,
        }
    }

    /// Shared by the main pass and the fallback pass: id dedupe + classification.
    /// Only admitted ids enter `seen`, so a copy rejected under one batch kind's
    /// spam floor does not shadow a later copy that passes under another.
    fn admit_candidate<'p>(
        &self,
        post: &'p RawPost,
        kind: BatchKind,
        exclude_ids: &HashSet<String>,
        seen: &mut HashSet<String>,
        stats: &mut RankStats,
    ) -> Option<&'p RawPost> {
        stats.fetched += 1;
        if exclude_ids.contains(&post.id) {
            stats.excluded += 1;
            return None;
        }
        if seen.contains(&post.id) {
            stats.duplicates += 1;
            return None;
        }
        if let Some(reason) = self.classify_post(post, kind).reject_reason() {
            stats.count_reject(reason);
            return None;
        }
        seen.insert(post.id.clone());
        Some(post)
    }

    pub fn rank_and_select(
        &self,
        batches: &[Batch],
        exclude_ids: &HashSet<String>,
        k_primary: usize,
        k_secondary: usize,
        ctx: &RankContext<'_>,
    ) -> Ranking {
        let mut stats = RankStats::default();
        let mut seen: HashSet<String> = HashSet::new();

        let mut scored: Vec<ScoredPost> = Vec::new();
        for batch in batches {
            for post in &batch.posts {
                if let Some(p) = self.admit_candidate(post, batch.kind, exclude_ids, &mut seen, &mut stats)
                {
                    scored.push(self.score_post(p, batch.group, batch.kind, ctx));
                }
            }
        }
        stats.scored = scored.len();
        scored.sort_by(by_score_desc);

        let (primary_pool, secondary_pool): (Vec<_>, Vec<_>) = scored
            .into_iter()
            .partition(|p| p.group == GroupRole::Primary);

        let strict = self.params.strict_cap();
        let relaxed = self.params.relaxed_caps();
        let mut guard = NearDuplicateGuard::new(self.params.near_duplicate_similarity);

        let mut primary = GroupSelection::new(
            GroupRole::Primary,
            self.group_name(GroupRole::Primary).to_string(),
            k_primary,
            strict,
        );
        primary.fill_strict(primary_pool, &mut guard);

        let mut secondary = GroupSelection::new(
            GroupRole::Secondary,
            self.group_name(GroupRole::Secondary).to_string(),
            k_secondary,
            strict,
        );
        secondary.fill_strict(secondary_pool, &mut guard);

        primary.relax(&relaxed, &mut guard);
        secondary.relax(&relaxed, &mut guard);
        stats.near_duplicates = guard.blocked();

        tracing::debug!(
            target: "rank",
            fetched = stats.fetched,
            scored = stats.scored,
            primary = primary.len(),
            primary_cap = primary.cap_used,
            secondary = secondary.len(),
            secondary_cap = secondary.cap_used,
            "ranking pass complete"
        );

        Ranking {
            primary,
            secondary,
            stats,
            fallback_used: false,
            seen,
            guard,
        }
    }

    /// Primary list is below the minimum viable size and not yet full.
    pub fn needs_fallback(&self, ranking: &Ranking) -> bool {
        !ranking.fallback_used
            && !ranking.primary.is_full()
            && ranking.primary.len() < self.params.min_viable_primary
    }

    /// Admit qualifying primary-group posts from a fallback batch under the
    /// loosest cap, reusing the run's dedupe state. Returns how many were added.
    pub fn admit_fallback(
        &self,
        ranking: &mut Ranking,
        batch: &Batch,
        exclude_ids: &HashSet<String>,
        ctx: &RankContext<'_>,
    ) -> usize {
        ranking.fallback_used = true;
        let cap = self.params.loosest_cap();

        let mut candidates: Vec<ScoredPost> = Vec::new();
        for post in &batch.posts {
            if let Some(p) = self.admit_candidate(
                post,
                batch.kind,
                exclude_ids,
                &mut ranking.seen,
                &mut ranking.stats,
            ) {
                let sp = self.score_post(p, batch.group, batch.kind, ctx);
                if sp.group == GroupRole::Primary {
                    candidates.push(sp);
                }
            }
        }
        ranking.stats.scored += candidates.len();
        candidates.sort_by(by_score_desc);

        let before = ranking.primary.len();
        let blocked_before = ranking.guard.blocked();
        for sp in candidates {
            if ranking.primary.is_full() {
                break;
            }
            // Cap overflow here is simply not admitted; there is no later pass.
            let _ = ranking.primary.try_admit(sp, cap, &mut ranking.guard);
        }
        let added = ranking.primary.len() - before;
        if added > 0 {
            ranking.primary.cap_used = ranking.primary.cap_used.max(cap);
            ranking.primary.sort();
        }
        ranking.stats.near_duplicates += ranking.guard.blocked() - blocked_before;
        added
    }
}
