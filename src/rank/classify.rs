//! Originality, spam, and off-topic checks.
//!
//! All checks are total over any input string and look only at the post itself
//! plus the kind of batch it came from.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::params::RankParams;
use super::vocab::TopicVocab;
use crate::search::types::{BatchKind, RawPost, ReferenceKind};

static RE_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]+").expect("mention regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_original: bool,
    pub is_spam: bool,
    pub is_off_topic: bool,
}

impl Classification {
    pub fn passes(&self) -> bool {
        self.is_original && !self.is_spam && !self.is_off_topic
    }

    /// First failing check, for filter accounting.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        if !self.is_original {
            Some(RejectReason::NotOriginal)
        } else if self.is_spam {
            Some(RejectReason::Spam)
        } else if self.is_off_topic {
            Some(RejectReason::OffTopic)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotOriginal,
    Spam,
    OffTopic,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotOriginal => "not_original",
            RejectReason::Spam => "spam",
            RejectReason::OffTopic => "off_topic",
        }
    }
}

pub fn classify_post(
    post: &RawPost,
    kind: BatchKind,
    vocab: &TopicVocab,
    params: &RankParams,
) -> Classification {
    let text_lc = post.text.to_lowercase();
    Classification {
        is_original: is_original(post, params),
        is_spam: is_spam(post, kind, params),
        is_off_topic: is_off_topic(&text_lc, vocab),
    }
}

fn is_original(post: &RawPost, params: &RankParams) -> bool {
    let head = post.text.trim_start();
    if head.starts_with("RT @") || post.references.contains(&ReferenceKind::Retweeted) {
        return false;
    }
    if params.block_replies
        && (head.starts_with('@') || post.references.contains(&ReferenceKind::RepliedTo))
    {
        return false;
    }
    true
}

fn is_spam(post: &RawPost, kind: BatchKind, params: &RankParams) -> bool {
    let total = post.metrics.total();
    let floor = if kind.relaxed_spam_floor() {
        params.relaxed_min_engagement
    } else {
        params.min_engagement
    };
    if total < floor {
        return true;
    }
    if post.text.trim_start().starts_with('@') && total < params.reply_shaped_min_engagement {
        return true;
    }
    count_mentions(&post.text) >= params.max_mentions
}

pub fn count_mentions(text: &str) -> usize {
    RE_MENTION.find_iter(text).count()
}

/// The primary name in its rugby-franchise sense without NFL context, or the
/// secondary keyword in its food sense without NBA context (group hashtag
/// passes). Exclusion vocabulary only counts when the group itself is named.
pub fn is_off_topic(text_lc: &str, vocab: &TopicVocab) -> bool {
    let p = &vocab.primary;
    if p.mentions(text_lc) && p.excludes(text_lc) && !p.confirms(text_lc) {
        return true;
    }
    let s = &vocab.secondary;
    s.keywords.matches(text_lc)
        && s.excludes(text_lc)
        && !s.confirms(text_lc)
        && !s.has_hashtag(text_lc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::Engagement;
    use chrono::{TimeZone, Utc};

    fn post(text: &str, replies: u64, rts: u64, likes: u64) -> RawPost {
        RawPost {
            id: "1".into(),
            text: text.into(),
            author_handle: "fan".into(),
            author_name: "Fan".into(),
            created_at: Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap(),
            metrics: Engagement {
                reply_count: replies,
                retweet_count: rts,
                like_count: likes,
                impression_count: None,
            },
            references: vec![],
            media: vec![],
        }
    }

    fn run(p: &RawPost, kind: BatchKind) -> Classification {
        classify_post(p, kind, &TopicVocab::default_seed(), &RankParams::default())
    }

    #[test]
    fn reshare_marker_is_not_original() {
        let c = run(&post("RT @someone: Broncos win", 100, 100, 100), BatchKind::Normal);
        assert!(!c.is_original);
        assert_eq!(c.reject_reason(), Some(RejectReason::NotOriginal));

        let mut quoted = post("Broncos win", 100, 100, 100);
        quoted.references = vec![ReferenceKind::Retweeted];
        assert!(!run(&quoted, BatchKind::Normal).is_original);
    }

    #[test]
    fn replies_are_original_unless_strict_policy() {
        let mut p = post("@coach Broncos need a new OC", 80, 10, 200);
        p.references = vec![ReferenceKind::RepliedTo];
        assert!(run(&p, BatchKind::Normal).is_original);

        let strict = RankParams {
            block_replies: true,
            ..Default::default()
        };
        let c = classify_post(&p, BatchKind::Normal, &TopicVocab::default_seed(), &strict);
        assert!(!c.is_original);
    }

    #[test]
    fn engagement_floor_depends_on_batch_kind() {
        let p = post("Broncos practice notes", 1, 2, 7); // total 10
        assert!(run(&p, BatchKind::Normal).is_spam);
        assert!(run(&p, BatchKind::Controversy).is_spam);
        assert!(!run(&p, BatchKind::Recency).is_spam);
        assert!(!run(&p, BatchKind::Accounts).is_spam);
    }

    #[test]
    fn reply_shaped_low_engagement_is_spam() {
        let p = post("@someone Broncos are fine", 5, 5, 20); // total 30
        assert!(run(&p, BatchKind::Normal).is_spam);
        let p = post("@someone Broncos are fine", 20, 10, 40); // total 70
        assert!(!run(&p, BatchKind::Normal).is_spam);
    }

    #[test]
    fn mention_flood_is_spam() {
        let handles: String = (0..15).map(|i| format!("@user{i} ")).collect();
        let p = post(&format!("Broncos giveaway {handles}"), 500, 500, 500);
        assert!(run(&p, BatchKind::Normal).is_spam);
        assert_eq!(count_mentions(&p.text), 15);
    }

    #[test]
    fn rugby_broncos_off_topic_without_nfl_context() {
        let v = TopicVocab::default_seed();
        assert!(is_off_topic("broncos win the nrl grand final in brisbane", &v));
        assert!(!is_off_topic("denver broncos fans in brisbane this week", &v));
    }

    #[test]
    fn rugby_words_alone_do_not_sink_a_secondary_post() {
        let v = TopicVocab::default_seed();
        assert!(!is_off_topic(
            "jokic and the nuggets fly out to brisbane for the preseason",
            &v
        ));
        assert!(!is_off_topic("rugby fans would love watching murray", &v));
        let c = run(
            &post("Jokic and the Nuggets fly out to Brisbane for the preseason", 80, 40, 900),
            BatchKind::Normal,
        );
        assert!(c.passes());
    }

    #[test]
    fn food_nuggets_off_topic_but_hashtag_passes() {
        let v = TopicVocab::default_seed();
        assert!(is_off_topic("these chicken nuggets slap", &v));
        assert!(!is_off_topic("chicken nuggets at ball arena before the game", &v));
        assert!(!is_off_topic("chicken nuggets to celebrate #milehighbasketball", &v));
        // Food words without the keyword are not this check's concern.
        assert!(!is_off_topic("chicken dinner tonight", &v));
    }

    #[test]
    fn checks_are_total_over_odd_text() {
        let p = post("", 0, 0, 0);
        let c = run(&p, BatchKind::Normal);
        assert!(c.is_spam);
        let p = post("🔥🔥 @ RT @", 50, 50, 50);
        let c = run(&p, BatchKind::Normal);
        assert!(c.is_original);
    }
}
