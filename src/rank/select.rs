// src/rank/select.rs
//! Diversity-constrained selection.
//!
//! Greedy walk over score-sorted candidates: a post is admitted only if none of
//! its subject tags would exceed the per-subject cap inside the result list.
//! Posts that would breach the cap go to a backup list, which is re-walked with
//! each relaxed cap until the target is met or the backup is exhausted.

use serde::Serialize;
use std::collections::HashMap;

use super::dedup::NearDuplicateGuard;
use super::ScoredPost;
use crate::search::types::GroupRole;

#[derive(Debug, Clone, Serialize)]
pub struct GroupSelection {
    pub group: GroupRole,
    pub group_name: String,
    pub target: usize,
    /// Loosest per-subject cap that was in force while building `posts`.
    pub cap_used: usize,
    pub posts: Vec<ScoredPost>,
    #[serde(skip)]
    pub(crate) backup: Vec<ScoredPost>,
    #[serde(skip)]
    counts: HashMap<String, usize>,
}

impl GroupSelection {
    pub(crate) fn new(group: GroupRole, group_name: String, target: usize, cap: usize) -> Self {
        Self {
            group,
            group_name,
            target,
            cap_used: cap,
            posts: Vec::new(),
            backup: Vec::new(),
            counts: HashMap::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.posts.len() >= self.target
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Per-subject counts over the admitted posts.
    pub fn subject_counts(&self) -> &HashMap<String, usize> {
        &self.counts
    }

    pub(crate) fn fits(&self, post: &ScoredPost, cap: usize) -> bool {
        post.subjects
            .iter()
            .all(|s| self.counts.get(s).copied().unwrap_or(0) < cap)
    }

    pub(crate) fn admit(&mut self, post: ScoredPost) {
        for s in &post.subjects {
            *self.counts.entry(s.clone()).or_insert(0) += 1;
        }
        self.posts.push(post);
    }

    /// Admit `post` if it fits `cap` and is not a near-duplicate of anything
    /// admitted so far. Returns the post back when it only failed the cap.
    pub(crate) fn try_admit(
        &mut self,
        post: ScoredPost,
        cap: usize,
        guard: &mut NearDuplicateGuard,
    ) -> Option<ScoredPost> {
        if !self.fits(&post, cap) {
            return Some(post);
        }
        if guard.check(&post.text) {
            return None;
        }
        guard.remember(&post.text);
        self.admit(post);
        None
    }

    /// Strict pass over score-sorted candidates.
    pub(crate) fn fill_strict(&mut self, candidates: Vec<ScoredPost>, guard: &mut NearDuplicateGuard) {
        let cap = self.cap_used;
        for post in candidates {
            if self.is_full() {
                break;
            }
            if let Some(overflow) = self.try_admit(post, cap, guard) {
                self.backup.push(overflow);
            }
        }
    }

    /// Re-walk the backup list with each relaxed cap in turn.
    pub(crate) fn relax(&mut self, relaxed_caps: &[usize], guard: &mut NearDuplicateGuard) {
        for &cap in relaxed_caps {
            if self.is_full() || self.backup.is_empty() {
                break;
            }
            self.cap_used = cap;
            let pending = std::mem::take(&mut self.backup);
            for post in pending {
                if self.is_full() {
                    self.backup.push(post);
                    continue;
                }
                if let Some(overflow) = self.try_admit(post, cap, guard) {
                    self.backup.push(overflow);
                }
            }
        }
        self.sort();
    }

    /// Restore score order after relaxed or fallback admissions.
    pub(crate) fn sort(&mut self) {
        self.posts.sort_by(super::by_score_desc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::scoring::ScoreBreakdown;
    use crate::search::types::{BatchKind, Engagement};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn guard() -> NearDuplicateGuard {
        NearDuplicateGuard::new(0.92)
    }

    fn sp(id: &str, score: i64, subjects: &[&str]) -> ScoredPost {
        ScoredPost {
            id: id.into(),
            text: format!("post {id}"),
            author_handle: "fan".into(),
            author_name: "Fan".into(),
            created_at: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            metrics: Engagement::default(),
            references: vec![],
            media: vec![],
            url: String::new(),
            debate_score: score,
            breakdown: ScoreBreakdown::default(),
            priority_label: "Generic".into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            is_fresh: false,
            age_hours: 100.0,
            group: GroupRole::Primary,
            source_kind: BatchKind::Normal,
        }
    }

    #[test]
    fn strict_cap_sends_overflow_to_backup() {
        let mut sel = GroupSelection::new(GroupRole::Primary, "Broncos".into(), 10, 2);
        sel.fill_strict(vec![
            sp("a", 9, &["QB"]),
            sp("b", 8, &["QB"]),
            sp("c", 7, &["QB"]),
            sp("d", 6, &["Defense"]),
        ], &mut guard());
        let ids: Vec<_> = sel.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert_eq!(sel.backup.len(), 1);
        assert_eq!(sel.cap_used, 2);
    }

    #[test]
    fn relaxation_grows_list_and_keeps_score_order() {
        let mut g = guard();
        let mut sel = GroupSelection::new(GroupRole::Primary, "Broncos".into(), 10, 2);
        sel.fill_strict(vec![
            sp("a", 9, &["QB"]),
            sp("b", 8, &["QB"]),
            sp("c", 7, &["QB"]),
            sp("d", 6, &["QB"]),
            sp("e", 5, &["QB"]),
            sp("f", 4, &["QB"]),
            sp("g", 3, &["Defense"]),
        ], &mut g);
        assert_eq!(sel.len(), 3);
        sel.relax(&[3, 5], &mut g);
        assert_eq!(sel.cap_used, 5);
        assert_eq!(sel.len(), 6);
        assert_eq!(sel.subject_counts()["QB"], 5);
        let scores: Vec<_> = sel.posts.iter().map(|p| p.debate_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(sel.backup.len(), 1);
    }

    #[test]
    fn relaxation_skipped_when_already_full() {
        let mut sel = GroupSelection::new(GroupRole::Secondary, "Nuggets".into(), 2, 2);
        let mut g = guard();
        sel.fill_strict(vec![sp("a", 3, &["X"]), sp("b", 2, &["X"]), sp("c", 1, &["X"])], &mut g);
        sel.relax(&[3, 5], &mut g);
        assert_eq!(sel.cap_used, 2);
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn near_duplicate_text_is_dropped_not_backed_up() {
        let mut g = guard();
        let mut sel = GroupSelection::new(GroupRole::Primary, "Broncos".into(), 10, 2);
        let mut dup = sp("b", 2, &["Y"]);
        dup.text = "post a".into();
        sel.fill_strict(vec![sp("a", 3, &["X"]), dup], &mut g);
        assert_eq!(sel.len(), 1);
        assert!(sel.backup.is_empty());
        assert_eq!(g.blocked(), 1);
    }

    #[test]
    fn multi_tag_post_blocked_by_any_full_tag() {
        let mut sel = GroupSelection::new(GroupRole::Primary, "Broncos".into(), 10, 1);
        sel.fill_strict(
            vec![sp("a", 3, &["X"]), sp("b", 2, &["X", "Y"]), sp("c", 1, &["Y"])],
            &mut guard(),
        );
        let ids: Vec<_> = sel.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
