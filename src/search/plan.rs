// src/search/plan.rs
//! Query plan: four strategies per topic group (relevancy, controversy-biased,
//! recency-biased, known accounts) plus the single fallback query.

use serde::{Deserialize, Serialize};

use crate::rank::vocab::{GroupVocab, TopicVocab};
use crate::search::types::{BatchKind, GroupRole, SearchQuery, SortOrder};

/// Hard limit of the recent-search query parameter.
pub const MAX_QUERY_LEN: usize = 512;

const ORIGINALS_ONLY: &str = " -is:retweet lang:en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSettings {
    pub full_window_hours: u32,
    pub recency_window_hours: u32,
    pub max_results: u32,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            full_window_hours: 168,
            recency_window_hours: 12,
            max_results: 100,
        }
    }
}

/// Multi-word terms are phrase-quoted.
fn term(t: &str) -> String {
    if t.chars().any(char::is_whitespace) {
        format!("\"{t}\"")
    } else {
        t.to_string()
    }
}

/// `(a OR b OR c)` with as many terms as fit in `budget` characters.
fn or_group(terms: impl IntoIterator<Item = String>, budget: usize) -> Option<String> {
    let mut out = String::from("(");
    let mut n = 0usize;
    for t in terms {
        let sep = if n == 0 { "" } else { " OR " };
        // +1 for the closing paren
        if out.len() + sep.len() + t.len() + 1 > budget {
            break;
        }
        out.push_str(sep);
        out.push_str(&t);
        n += 1;
    }
    if n == 0 {
        return None;
    }
    out.push(')');
    Some(out)
}

fn topic_terms(g: &GroupVocab) -> impl Iterator<Item = String> + '_ {
    g.keywords
        .iter()
        .chain(g.hashtags.iter())
        .map(|t| term(t))
}

fn topic_query(g: &GroupVocab) -> Option<String> {
    let group = or_group(topic_terms(g), MAX_QUERY_LEN - ORIGINALS_ONLY.len())?;
    Some(format!("{group}{ORIGINALS_ONLY}"))
}

fn controversy_query(g: &GroupVocab, controversy: &[String]) -> Option<String> {
    let topic = or_group(topic_terms(g), MAX_QUERY_LEN - ORIGINALS_ONLY.len())?;
    let budget = MAX_QUERY_LEN
        .saturating_sub(topic.len() + 1 + ORIGINALS_ONLY.len());
    match or_group(controversy.iter().map(|t| term(t)), budget) {
        Some(c) => Some(format!("{topic} {c}{ORIGINALS_ONLY}")),
        None => Some(format!("{topic}{ORIGINALS_ONLY}")),
    }
}

fn accounts_query(g: &GroupVocab) -> Option<String> {
    let group = or_group(
        g.accounts.iter().map(|a| format!("from:{a}")),
        MAX_QUERY_LEN - ORIGINALS_ONLY.len(),
    )?;
    Some(format!("{group}{ORIGINALS_ONLY}"))
}

fn group_plan(
    role: GroupRole,
    g: &GroupVocab,
    controversy: &[String],
    s: &PlanSettings,
) -> Vec<SearchQuery> {
    let mk = |kind, query: String, window_hours, sort| SearchQuery {
        group: role,
        kind,
        query,
        window_hours,
        sort,
        max_results: s.max_results,
    };

    let mut out = Vec::with_capacity(4);
    if let Some(q) = topic_query(g) {
        out.push(mk(BatchKind::Normal, q.clone(), s.full_window_hours, SortOrder::Relevancy));
        out.push(mk(BatchKind::Recency, q, s.recency_window_hours, SortOrder::Recency));
    }
    if let Some(q) = controversy_query(g, controversy) {
        out.push(mk(BatchKind::Controversy, q, s.full_window_hours, SortOrder::Relevancy));
    }
    if let Some(q) = accounts_query(g) {
        out.push(mk(BatchKind::Accounts, q, s.full_window_hours, SortOrder::Recency));
    }
    out
}

/// Every query of a scan, primary group first.
pub fn build_query_plan(vocab: &TopicVocab, settings: &PlanSettings) -> Vec<SearchQuery> {
    let mut plan = group_plan(GroupRole::Primary, &vocab.primary, vocab.controversy.terms(), settings);
    plan.extend(group_plan(
        GroupRole::Secondary,
        &vocab.secondary,
        vocab.controversy.terms(),
        settings,
    ));
    plan
}

/// Controversy-biased, full-window search for a short primary list.
pub fn fallback_query(vocab: &TopicVocab, settings: &PlanSettings) -> Option<SearchQuery> {
    let query = controversy_query(&vocab.primary, vocab.controversy.terms())?;
    Some(SearchQuery {
        group: GroupRole::Primary,
        kind: BatchKind::Controversy,
        query,
        window_hours: settings.full_window_hours,
        sort: SortOrder::Relevancy,
        max_results: settings.max_results,
    })
}
