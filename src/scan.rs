// src/scan.rs
//! Scan orchestration: plan → concurrent fetch → rank → optional fallback
//! search → record history.
//!
//! Nothing here is fatal: failed searches degrade to empty batches and a history
//! write failure is logged, so a scan always yields a (possibly short) report.
//! Scans on one `Scanner` run one at a time, so each sees the shown ids the
//! previous scan recorded.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::ScanConfig;
use crate::history::{ScanHistory, ScanRecord};
use crate::rank::{
    GroupSelection, HotReloadParams, RankContext, RankEngine, RankStats, ScoredPost, TopicVocab,
};
use crate::search::fixture::FixtureProvider;
use crate::search::plan::{build_query_plan, fallback_query};
use crate::search::types::SearchProvider;
use crate::search::x_api::XApiProvider;
use crate::search::{fetch_batches, fetch_one};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_runs_total", "Completed scans.");
        describe_counter!("scan_posts_kept_total", "Posts selected into either list.");
        describe_counter!(
            "scan_posts_filtered_total",
            "Posts dropped before selection, by reason."
        );
        describe_counter!(
            "scan_fallback_total",
            "Scans that issued the fallback search."
        );
        describe_histogram!("scan_duration_ms", "Wall-clock scan time in milliseconds.");
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    pub primary: GroupSelection,
    pub secondary: GroupSelection,
    pub stats: RankStats,
    pub fallback_used: bool,
    pub fallback_added: usize,
    /// Overexposure snapshot the scores were computed against.
    pub overexposed: BTreeMap<String, u8>,
    pub queries: usize,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn find_post(&self, id: &str) -> Option<&ScoredPost> {
        self.primary
            .posts
            .iter()
            .chain(self.secondary.posts.iter())
            .find(|p| p.id == id)
    }
}

pub struct Scanner {
    provider: Arc<dyn SearchProvider>,
    vocab: TopicVocab,
    params: HotReloadParams,
    history: Arc<ScanHistory>,
    config: ScanConfig,
    scan_lock: Mutex<()>,
}

impl Scanner {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        vocab: TopicVocab,
        params: HotReloadParams,
        history: Arc<ScanHistory>,
        config: ScanConfig,
    ) -> Self {
        Self {
            provider,
            vocab,
            params,
            history,
            config,
            scan_lock: Mutex::new(()),
        }
    }

    /// Wire every collaborator from configuration and environment.
    pub fn from_config(config: ScanConfig) -> Result<Self> {
        let provider: Arc<dyn SearchProvider> = match &config.fixture_path {
            Some(p) => {
                tracing::info!(target: "scan", path = %p, "serving searches from fixture");
                Arc::new(FixtureProvider::load_from_path(Path::new(p))?)
            }
            None => Arc::new(XApiProvider::from_env().context("configuring search provider")?),
        };

        let vocab = match &config.topics_path {
            Some(p) => TopicVocab::load_from_path(Path::new(p))?,
            None => TopicVocab::load_default()?,
        };

        let params = HotReloadParams::new(Some(Path::new(&config.rank_params_path)));

        let history = match &config.history_path {
            Some(p) => ScanHistory::open(p, config.history_max_runs, config.history_max_shown),
            None => ScanHistory::in_memory(config.history_max_runs, config.history_max_shown),
        };

        Ok(Self::new(provider, vocab, params, Arc::new(history), config))
    }

    pub fn history(&self) -> &Arc<ScanHistory> {
        &self.history
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn scan(&self) -> ScanReport {
        self.scan_at(Utc::now()).await
    }

    pub async fn scan_at(&self, now: DateTime<Utc>) -> ScanReport {
        ensure_metrics_described();
        // Held until the run is recorded: shown-id exclusion depends on it.
        let _scan = self.scan_lock.lock().await;
        let t0 = Instant::now();

        let engine = RankEngine::new(self.vocab.clone(), self.params.current());
        let settings = self.config.plan_settings();
        let plan = build_query_plan(engine.vocab(), &settings);

        let batches =
            fetch_batches(Arc::clone(&self.provider), &plan, self.config.max_concurrency).await;

        // Snapshot is read-only for the whole pass; history changes only after it.
        let overexposure = self.history.overexposure();
        let exclude = self.history.shown_ids();
        let ctx = RankContext {
            now,
            history: &overexposure,
        };

        let mut ranking = engine.rank_and_select(
            &batches,
            &exclude,
            self.config.k_primary,
            self.config.k_secondary,
            &ctx,
        );

        let mut fallback_added = 0;
        if engine.needs_fallback(&ranking) {
            if let Some(q) = fallback_query(engine.vocab(), &settings) {
                tracing::info!(
                    target: "scan",
                    primary = ranking.primary.len(),
                    min_viable = engine.params().min_viable_primary,
                    "primary list short; running fallback search"
                );
                counter!("scan_fallback_total").increment(1);
                let batch = fetch_one(self.provider.as_ref(), &q).await;
                fallback_added = engine.admit_fallback(&mut ranking, &batch, &exclude, &ctx);
            }
        }

        let run = ScanRecord::from_ranking(&ranking, now.timestamp());
        let shown: Vec<String> = ranking.all_posts().map(|p| p.id.clone()).collect();
        let history = Arc::clone(&self.history);
        match tokio::task::spawn_blocking(move || history.record_run(run, shown)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(target: "history", error = ?e, "failed to persist scan history")
            }
            Err(e) => tracing::warn!(target: "history", error = %e, "history write task failed"),
        }

        let stats = ranking.stats.clone();
        for (reason, n) in [
            ("excluded", stats.excluded),
            ("duplicate", stats.duplicates),
            ("not_original", stats.not_original),
            ("spam", stats.spam),
            ("off_topic", stats.off_topic),
            ("near_duplicate", stats.near_duplicates),
        ] {
            counter!("scan_posts_filtered_total", "reason" => reason).increment(n as u64);
        }
        let kept = ranking.primary.len() + ranking.secondary.len();
        counter!("scan_posts_kept_total").increment(kept as u64);
        counter!("scan_runs_total").increment(1);
        let duration_ms = t0.elapsed().as_millis() as u64;
        histogram!("scan_duration_ms").record(duration_ms as f64);

        if let Some(top) = ranking.primary.posts.first() {
            tracing::debug!(
                target: "scan",
                top = %crate::fingerprint(&top.text),
                score = top.debate_score,
                "top primary post"
            );
        }
        tracing::info!(
            target: "scan",
            fetched = stats.fetched,
            primary = ranking.primary.len(),
            secondary = ranking.secondary.len(),
            fallback = ranking.fallback_used,
            duration_ms,
            "scan complete"
        );

        ScanReport {
            scanned_at: now,
            primary: ranking.primary,
            secondary: ranking.secondary,
            stats,
            fallback_used: ranking.fallback_used,
            fallback_added,
            overexposed: overexposure.0,
            queries: plan.len(),
            duration_ms,
        }
    }
}
