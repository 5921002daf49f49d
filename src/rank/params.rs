//! Tunable ranking parameters with hot-reload from config/rank.json.
//!
//! Every field is optional in the JSON file; missing fields keep their defaults,
//! so a file like `{"controversy_bonus": 300000}` is valid.
//!
//! On each `current()` call we check the file's modified time and reload if changed.

use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
    time::SystemTime,
};

pub const DEFAULT_RANK_PARAMS_PATH: &str = "config/rank.json";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreshnessTier {
    pub max_age_hours: f64,
    pub bonus: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankParams {
    // --- score weights ---
    pub w_reply: i64,
    pub w_retweet: i64,
    pub w_like: i64,
    pub controversy_bonus: i64,
    /// Checked in order; the first tier whose age bound holds applies.
    pub freshness: Vec<FreshnessTier>,
    pub velocity_max_age_hours: f64,
    /// Velocity bonus needs strictly more replies than this.
    pub velocity_min_replies: u64,
    pub velocity_per_reply: i64,
    pub overexposure_penalty: i64,
    /// Posts younger than this are flagged `is_fresh`.
    pub fresh_hours: f64,

    // --- classification ---
    pub min_engagement: u64,
    pub relaxed_min_engagement: u64,
    pub reply_shaped_min_engagement: u64,
    pub max_mentions: usize,
    /// Superseded strict policy: treat every reply-shaped post as non-original.
    pub block_replies: bool,

    // --- selection ---
    /// First entry is the strict cap, the rest are relaxation tiers.
    pub subject_caps: Vec<usize>,
    pub min_viable_primary: usize,
    /// Normalized Levenshtein similarity at or above which two texts are duplicates.
    pub near_duplicate_similarity: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            w_reply: 75_000,
            w_retweet: 1_200,
            w_like: 8,
            controversy_bonus: 250_000,
            freshness: vec![
                FreshnessTier {
                    max_age_hours: 6.0,
                    bonus: 100_000,
                },
                FreshnessTier {
                    max_age_hours: 12.0,
                    bonus: 50_000,
                },
            ],
            velocity_max_age_hours: 8.0,
            velocity_min_replies: 3,
            velocity_per_reply: 20_000,
            overexposure_penalty: 50_000,
            fresh_hours: 6.0,
            min_engagement: 20,
            relaxed_min_engagement: 5,
            reply_shaped_min_engagement: 50,
            max_mentions: 15,
            block_replies: false,
            subject_caps: vec![2, 3, 5],
            min_viable_primary: 6,
            near_duplicate_similarity: 0.92,
        }
    }
}

impl RankParams {
    pub fn strict_cap(&self) -> usize {
        self.subject_caps.first().copied().unwrap_or(2).max(1)
    }

    pub fn loosest_cap(&self) -> usize {
        self.subject_caps
            .iter()
            .copied()
            .max()
            .unwrap_or(2)
            .max(self.strict_cap())
    }

    /// Relaxation tiers after the strict cap, only those that actually loosen it.
    pub fn relaxed_caps(&self) -> Vec<usize> {
        let mut last = self.strict_cap();
        let mut out = Vec::new();
        for &c in self.subject_caps.iter().skip(1) {
            if c > last {
                out.push(c);
                last = c;
            }
        }
        out
    }
}

/// Hot-reload wrapper: reloads when the config file mtime changes.
#[derive(Debug)]
pub struct HotReloadParams {
    path: PathBuf,
    inner: RwLock<State>,
}

#[derive(Debug)]
struct State {
    params: RankParams,
    last_modified: Option<SystemTime>,
}

impl HotReloadParams {
    /// Create with a path (defaults to "config/rank.json" if `None`).
    pub fn new(path: Option<&Path>) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RANK_PARAMS_PATH));
        Self {
            path,
            inner: RwLock::new(State {
                params: RankParams::default(),
                last_modified: None,
            }),
        }
    }

    /// Get the latest params, reloading if the config file changed.
    pub fn current(&self) -> RankParams {
        let needs_reload = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => {
                let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
                guard.last_modified != Some(mtime)
            }
            // No file: keep whatever we have.
            Err(_) => false,
        };

        if !needs_reload {
            return self
                .inner
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .params
                .clone();
        }

        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if let Ok(mtime) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            if guard.last_modified != Some(mtime) {
                match load_params_file(&self.path) {
                    Ok(p) => {
                        tracing::info!(target: "rank", path = %self.path.display(), "rank params reloaded");
                        guard.params = p;
                        guard.last_modified = Some(mtime);
                    }
                    Err(e) => {
                        tracing::warn!(target: "rank", error = %e, "rank params reload failed; keeping previous");
                    }
                }
            }
        }
        guard.params.clone()
    }
}

/// Load params directly (no caching). Public for tests/tools.
pub fn load_params_file(path: &Path) -> io::Result<RankParams> {
    let bytes = fs::read(path)?;
    let p: RankParams = serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(p)
}
