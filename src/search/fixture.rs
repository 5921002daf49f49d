// src/search/fixture.rs
//! Offline search provider backed by canned batches.
//!
//! Each (group, kind) key holds a queue of responses; every call pops the next
//! one, and an exhausted queue answers with no posts. Keys registered with
//! `fail_on` return an error instead.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::search::types::{Batch, BatchKind, GroupRole, RawPost, SearchProvider, SearchQuery};

type Key = (GroupRole, BatchKind);

#[derive(Debug, Default)]
pub struct FixtureProvider {
    queues: Mutex<HashMap<Key, VecDeque<Vec<RawPost>>>>,
    failing: HashSet<Key>,
    calls: AtomicUsize,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the given group and strategy.
    pub fn with_response(self, group: GroupRole, kind: BatchKind, posts: Vec<RawPost>) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry((group, kind))
            .or_default()
            .push_back(posts);
        self
    }

    pub fn fail_on(mut self, group: GroupRole, kind: BatchKind) -> Self {
        self.failing.insert((group, kind));
        self
    }

    pub fn from_batches(batches: Vec<Batch>) -> Self {
        batches
            .into_iter()
            .fold(Self::new(), |p, b| p.with_response(b.group, b.kind, b.posts))
    }

    /// JSON array of batches, as served in offline mode.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading search fixture {}", path.display()))?;
        let batches: Vec<Batch> =
            serde_json::from_str(&raw).context("parsing search fixture json")?;
        Ok(Self::from_batches(batches))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FixtureProvider {
    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawPost>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (q.group, q.kind);
        if self.failing.contains(&key) {
            bail!("fixture failure for {}/{}", q.group.as_str(), q.kind.as_str());
        }
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        Ok(queues
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
