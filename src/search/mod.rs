// src/search/mod.rs
pub mod fixture;
pub mod plan;
pub mod types;
pub mod x_api;

use crate::search::types::{Batch, SearchProvider, SearchQuery};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "scan_posts_fetched_total",
            "Posts returned by the search collaborator."
        );
        describe_counter!(
            "scan_fetch_errors_total",
            "Search requests that failed and degraded to an empty batch."
        );
        describe_histogram!("search_fetch_ms", "Search request latency in milliseconds.");
    });
}

/// Decode HTML entities and collapse whitespace. The search API returns
/// entity-escaped text (`&amp;`, `&gt;`).
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// Run every planned query concurrently, at most `max_concurrency` in flight.
///
/// The result has exactly one batch per query, in plan order. A failed query
/// becomes an empty batch; it never aborts the others.
pub async fn fetch_batches(
    provider: Arc<dyn SearchProvider>,
    plan: &[SearchQuery],
    max_concurrency: usize,
) -> Vec<Batch> {
    ensure_metrics_described();

    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut set = JoinSet::new();

    for (idx, query) in plan.iter().cloned().enumerate() {
        let provider = Arc::clone(&provider);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let t0 = Instant::now();
            let res = provider.search(&query).await;
            histogram!("search_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            (idx, query, res)
        });
    }

    let mut slots: Vec<Option<Batch>> = vec![None; plan.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, query, Ok(posts))) => {
                tracing::debug!(
                    target: "search",
                    provider = provider.name(),
                    group = query.group.as_str(),
                    kind = query.kind.as_str(),
                    count = posts.len(),
                    "batch fetched"
                );
                counter!("scan_posts_fetched_total").increment(posts.len() as u64);
                slots[idx] = Some(Batch {
                    group: query.group,
                    kind: query.kind,
                    posts,
                });
            }
            Ok((idx, query, Err(e))) => {
                tracing::warn!(
                    target: "search",
                    error = ?e,
                    provider = provider.name(),
                    group = query.group.as_str(),
                    kind = query.kind.as_str(),
                    "search failed; using empty batch"
                );
                counter!("scan_fetch_errors_total").increment(1);
                slots[idx] = Some(Batch::empty(query.group, query.kind));
            }
            Err(e) => {
                // Panicked task: its slot stays empty and is filled below.
                tracing::warn!(target: "search", error = %e, "search task failed");
                counter!("scan_fetch_errors_total").increment(1);
            }
        }
    }

    plan.iter()
        .zip(slots)
        .map(|(q, slot)| slot.unwrap_or_else(|| Batch::empty(q.group, q.kind)))
        .collect()
}

/// Single query with the same degrade-to-empty contract as `fetch_batches`.
pub async fn fetch_one(provider: &dyn SearchProvider, query: &SearchQuery) -> Batch {
    ensure_metrics_described();
    match provider.search(query).await {
        Ok(posts) => {
            counter!("scan_posts_fetched_total").increment(posts.len() as u64);
            Batch {
                group: query.group,
                kind: query.kind,
                posts,
            }
        }
        Err(e) => {
            tracing::warn!(
                target: "search",
                error = ?e,
                provider = provider.name(),
                kind = query.kind.as_str(),
                "search failed; using empty batch"
            );
            counter!("scan_fetch_errors_total").increment(1);
            Batch::empty(query.group, query.kind)
        }
    }
}
