// src/config/scan.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::history::{DEFAULT_MAX_RUNS, DEFAULT_MAX_SHOWN};
use crate::search::plan::PlanSettings;

pub const DEFAULT_SCAN_CONFIG_PATH: &str = "config/scan.toml";
pub const ENV_SCAN_CONFIG_PATH: &str = "SCAN_CONFIG_PATH";
pub const ENV_SCAN_MAX_CONCURRENCY: &str = "SCAN_MAX_CONCURRENCY";
pub const ENV_SCAN_HISTORY_PATH: &str = "SCAN_HISTORY_PATH";

/// Scan orchestration settings. Every field has a default, so an empty file
/// (or no file at all) yields the reference behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub k_primary: usize,
    pub k_secondary: usize,
    pub max_concurrency: usize,
    pub max_results: u32,
    pub full_window_hours: u32,
    pub recency_window_hours: u32,
    pub history_path: Option<String>,
    pub history_max_runs: usize,
    pub history_max_shown: usize,
    pub topics_path: Option<String>,
    pub rank_params_path: String,
    /// Serve canned batches from this JSON file instead of calling the search API.
    pub fixture_path: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            k_primary: 10,
            k_secondary: 5,
            max_concurrency: 7,
            max_results: 100,
            full_window_hours: 168,
            recency_window_hours: 12,
            history_path: Some("data/scan_history.json".to_string()),
            history_max_runs: DEFAULT_MAX_RUNS,
            history_max_shown: DEFAULT_MAX_SHOWN,
            topics_path: None,
            rank_params_path: crate::rank::params::DEFAULT_RANK_PARAMS_PATH.to_string(),
            fixture_path: None,
        }
    }
}

impl ScanConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing scan config toml")
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scan config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $SCAN_CONFIG_PATH
    /// 2) config/scan.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_SCAN_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("SCAN_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from_path(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_SCAN_CONFIG_PATH);
            if default.exists() {
                Self::load_from_path(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(n) = std::env::var(ENV_SCAN_MAX_CONCURRENCY)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            self.max_concurrency = n;
        }
        if let Ok(p) = std::env::var(ENV_SCAN_HISTORY_PATH) {
            let p = p.trim();
            self.history_path = (!p.is_empty()).then(|| p.to_string());
        }
    }

    pub fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            full_window_hours: self.full_window_hours,
            recency_window_hours: self.recency_window_hours,
            max_results: self.max_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_is_reference_behavior() {
        let cfg = ScanConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ScanConfig::default());
        assert_eq!(cfg.k_primary, 10);
        assert_eq!(cfg.k_secondary, 5);
        assert_eq!(cfg.max_concurrency, 7);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = ScanConfig::from_toml_str("k_primary = 3\nfixture_path = \"x.json\"").unwrap();
        assert_eq!(cfg.k_primary, 3);
        assert_eq!(cfg.k_secondary, 5);
        assert_eq!(cfg.fixture_path.as_deref(), Some("x.json"));
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply_after_file() {
        env::set_var(ENV_SCAN_MAX_CONCURRENCY, "3");
        env::set_var(ENV_SCAN_HISTORY_PATH, "");
        let mut cfg = ScanConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.max_concurrency, 3);
        assert_eq!(cfg.history_path, None);

        env::set_var(ENV_SCAN_MAX_CONCURRENCY, "zero");
        let mut cfg = ScanConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.max_concurrency, 7);

        env::remove_var(ENV_SCAN_MAX_CONCURRENCY);
        env::remove_var(ENV_SCAN_HISTORY_PATH);
    }
}
