// src/session.rs
//! Server-side session: the last scan report and every rewrite generated for
//! it, so both survive page reloads until explicitly cleared.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;

use crate::rank::ScoredPost;
use crate::rewrite::RewriteMode;
use crate::scan::ScanReport;

#[derive(Debug, Clone, Serialize)]
pub struct RewriteSet {
    pub post_id: String,
    pub mode: RewriteMode,
    pub provider: String,
    pub variants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<ScanReport>>,
    rewrites: RwLock<Vec<RewriteSet>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, report: ScanReport) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(report);
    }

    pub fn current(&self) -> Option<ScanReport> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// A post of the current report, by id.
    pub fn find_post(&self, id: &str) -> Option<ScoredPost> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .and_then(|r| r.find_post(id).cloned())
    }

    /// Newer variants for the same post and mode replace older ones.
    pub fn store_rewrites(&self, set: RewriteSet) {
        let mut v = self.rewrites.write().unwrap_or_else(|p| p.into_inner());
        v.retain(|s| !(s.post_id == set.post_id && s.mode == set.mode));
        v.push(set);
    }

    pub fn rewrites(&self) -> Vec<RewriteSet> {
        self.rewrites
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = None;
        self.rewrites
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}
