// tests/search_fetch.rs
//
// Concurrent batch fetching: plan order, degrade-to-empty, and the in-flight bound.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use debate_radar::rank::TopicVocab;
use debate_radar::search::fetch_batches;
use debate_radar::search::fixture::FixtureProvider;
use debate_radar::search::plan::{build_query_plan, PlanSettings};
use debate_radar::search::types::{
    BatchKind, GroupRole, RawPost, SearchProvider, SearchQuery,
};

fn post(id: &str) -> RawPost {
    RawPost {
        id: id.into(),
        text: format!("Broncos post {id}"),
        author_handle: "fan".into(),
        author_name: "Fan".into(),
        created_at: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
        metrics: Default::default(),
        references: vec![],
        media: vec![],
    }
}

/// Sleeps per call and records the highest number of concurrent calls.
#[derive(Default)]
struct SlowProvider {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl SearchProvider for SlowProvider {
    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawPost>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if q.kind == BatchKind::Accounts {
            bail!("rate limited");
        }
        Ok(vec![post(&format!("{}-{}", q.group.as_str(), q.kind.as_str()))])
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_come_back_in_plan_order_with_failures_empty() {
    let plan = build_query_plan(&TopicVocab::default_seed(), &PlanSettings::default());
    let provider = Arc::new(SlowProvider::default());
    let batches = fetch_batches(provider.clone(), &plan, 3).await;

    assert_eq!(batches.len(), plan.len());
    for (b, q) in batches.iter().zip(&plan) {
        assert_eq!(b.group, q.group);
        assert_eq!(b.kind, q.kind);
        if q.kind == BatchKind::Accounts {
            assert!(b.posts.is_empty());
        } else {
            assert_eq!(b.posts[0].id, format!("{}-{}", q.group.as_str(), q.kind.as_str()));
        }
    }
    let peak = provider.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight {peak}");
    assert!(peak >= 2, "queries did not overlap");
}

#[tokio::test]
async fn fixture_failure_degrades_only_that_batch() {
    let plan = build_query_plan(&TopicVocab::default_seed(), &PlanSettings::default());
    let provider = Arc::new(
        FixtureProvider::new()
            .with_response(GroupRole::Primary, BatchKind::Normal, vec![post("1"), post("2")])
            .with_response(GroupRole::Secondary, BatchKind::Normal, vec![post("3")])
            .fail_on(GroupRole::Primary, BatchKind::Recency),
    );
    let batches = fetch_batches(provider.clone(), &plan, 7).await;

    let total: usize = batches.iter().map(|b| b.posts.len()).sum();
    assert_eq!(total, 3);
    assert_eq!(provider.calls(), plan.len());
    let recency = batches
        .iter()
        .find(|b| b.group == GroupRole::Primary && b.kind == BatchKind::Recency)
        .unwrap();
    assert!(recency.posts.is_empty());
}

#[tokio::test]
async fn zero_concurrency_is_treated_as_one() {
    let plan = build_query_plan(&TopicVocab::default_seed(), &PlanSettings::default());
    let provider = Arc::new(FixtureProvider::new());
    let batches = fetch_batches(provider, &plan, 0).await;
    assert_eq!(batches.len(), plan.len());
}
