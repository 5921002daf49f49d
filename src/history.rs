//! history.rs — rolling record of past scans.
//!
//! Feeds two things back into the next scan: the overexposed-subject snapshot
//! (penalty input) and the shown-ids exclude set. Backed by one JSON file that is
//! rewritten atomically after every change; `in_memory` skips the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::rank::{GroupSelection, Ranking, SubjectHistory};
use crate::search::types::GroupRole;

pub const DEFAULT_MAX_RUNS: usize = 50;
pub const DEFAULT_MAX_SHOWN: usize = 2000;

/// How many recent runs the overexposure policy looks at.
const OVEREXPOSURE_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: GroupRole,
    pub name: String,
    pub count: usize,
    pub subjects: BTreeSet<String>,
    pub top_score: Option<i64>,
}

impl GroupSummary {
    fn from_selection(sel: &GroupSelection) -> Self {
        Self {
            group: sel.group,
            name: sel.group_name.clone(),
            count: sel.len(),
            subjects: sel
                .posts
                .iter()
                .flat_map(|p| p.subjects.iter().cloned())
                .collect(),
            top_score: sel.posts.first().map(|p| p.debate_score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ts_unix: i64,
    pub groups: Vec<GroupSummary>,
    pub fallback_used: bool,
}

impl ScanRecord {
    pub fn from_ranking(ranking: &Ranking, ts_unix: i64) -> Self {
        Self {
            ts_unix,
            groups: vec![
                GroupSummary::from_selection(&ranking.primary),
                GroupSummary::from_selection(&ranking.secondary),
            ],
            fallback_used: ranking.fallback_used,
        }
    }

    /// Every subject tag that appeared in either list of this run.
    pub fn subjects(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.subjects.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    runs: Vec<ScanRecord>,
    #[serde(default)]
    shown_ids: Vec<String>,
}

/// Subject → severity snapshot, read-only during a ranking pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overexposure(pub BTreeMap<String, u8>);

impl Overexposure {
    /// In all of the last 3 runs → 3; in 2 of the last 3 → 1; otherwise 0.
    pub fn from_runs(runs: &[ScanRecord]) -> Self {
        let window = &runs[runs.len().saturating_sub(OVEREXPOSURE_WINDOW)..];
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for run in window {
            for s in run.subjects() {
                *seen.entry(s).or_insert(0) += 1;
            }
        }
        let map = seen
            .into_iter()
            .filter_map(|(s, n)| {
                let severity = match n {
                    n if n >= OVEREXPOSURE_WINDOW => 3,
                    2 => 1,
                    _ => 0,
                };
                (severity > 0).then(|| (s.to_string(), severity))
            })
            .collect();
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SubjectHistory for Overexposure {
    fn severity_for(&self, subject: &str) -> u8 {
        self.0.severity_for(subject)
    }
}

#[derive(Debug)]
pub struct ScanHistory {
    path: Option<PathBuf>,
    max_runs: usize,
    max_shown: usize,
    inner: Mutex<HistoryFile>,
}

impl ScanHistory {
    pub fn in_memory(max_runs: usize, max_shown: usize) -> Self {
        Self {
            path: None,
            max_runs: max_runs.max(1),
            max_shown,
            inner: Mutex::new(HistoryFile::default()),
        }
    }

    /// Load from `path`. A missing file is an empty history; a corrupt one is
    /// logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>, max_runs: usize, max_shown: usize) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<HistoryFile>(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "history", path = %path.display(), error = %e, "corrupt history file; starting empty");
                HistoryFile::default()
            }),
            Err(_) => HistoryFile::default(),
        };
        Self {
            path: Some(path),
            max_runs: max_runs.max(1),
            max_shown,
            inner: Mutex::new(data),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryFile> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn overexposure(&self) -> Overexposure {
        Overexposure::from_runs(&self.lock().runs)
    }

    pub fn shown_ids(&self) -> HashSet<String> {
        self.lock().shown_ids.iter().cloned().collect()
    }

    pub fn run_count(&self) -> usize {
        self.lock().runs.len()
    }

    /// Append the run and mark `shown` as shown, then persist. Blocks on file
    /// I/O when the history is file-backed.
    pub fn record_run(&self, run: ScanRecord, shown: Vec<String>) -> Result<()> {
        let mut g = self.lock();
        g.runs.push(run);
        if g.runs.len() > self.max_runs {
            let excess = g.runs.len() - self.max_runs;
            g.runs.drain(0..excess);
        }

        let mut known: HashSet<String> = g.shown_ids.iter().cloned().collect();
        for id in shown {
            if known.insert(id.clone()) {
                g.shown_ids.push(id);
            }
        }
        if g.shown_ids.len() > self.max_shown {
            let excess = g.shown_ids.len() - self.max_shown;
            g.shown_ids.drain(0..excess);
        }

        self.persist(&g)
    }

    /// Most recent `n` runs, oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<ScanRecord> {
        let g = self.lock();
        let start = g.runs.len().saturating_sub(n);
        g.runs[start..].to_vec()
    }

    pub fn clear(&self) -> Result<()> {
        let mut g = self.lock();
        *g = HistoryFile::default();
        self.persist(&g)
    }

    fn persist(&self, data: &HistoryFile) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomic(path, data)
            .with_context(|| format!("writing scan history to {}", path.display()))
    }
}

fn write_atomic(path: &Path, data: &HistoryFile) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ts: i64, subjects: &[&str]) -> ScanRecord {
        ScanRecord {
            ts_unix: ts,
            groups: vec![GroupSummary {
                group: GroupRole::Primary,
                name: "Broncos".into(),
                count: subjects.len(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                top_score: Some(1),
            }],
            fallback_used: false,
        }
    }

    #[test]
    fn overexposure_policy_over_last_three_runs() {
        let runs = vec![
            run(1, &["Draft"]),
            run(2, &["Bo Nix", "Defense"]),
            run(3, &["Bo Nix", "Defense"]),
            run(4, &["Bo Nix", "Contracts"]),
        ];
        let o = Overexposure::from_runs(&runs);
        assert_eq!(o.severity_for("Bo Nix"), 3);
        assert_eq!(o.severity_for("Defense"), 1);
        assert_eq!(o.severity_for("Contracts"), 0);
        // Outside the window.
        assert_eq!(o.severity_for("Draft"), 0);
    }

    #[test]
    fn fewer_than_three_runs_never_reach_top_severity() {
        let runs = vec![run(1, &["Bo Nix"]), run(2, &["Bo Nix"])];
        assert_eq!(Overexposure::from_runs(&runs).severity_for("Bo Nix"), 1);
        assert!(Overexposure::from_runs(&[]).is_empty());
    }

    #[test]
    fn recording_caps_runs_and_shown_ids() {
        let h = ScanHistory::in_memory(2, 3);
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        h.record_run(run(1, &["Bo Nix"]), ids(&["a", "b"])).unwrap();
        h.record_run(run(2, &["Defense"]), ids(&["b", "c"])).unwrap();
        h.record_run(run(3, &["Draft"]), ids(&["d"])).unwrap();

        assert_eq!(h.run_count(), 2);
        assert_eq!(h.snapshot_last_n(5)[0].ts_unix, 2);
        let shown = h.shown_ids();
        assert_eq!(shown.len(), 3);
        assert!(!shown.contains("a"));
        assert!(shown.contains("d"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        let h = ScanHistory::open(&path, 50, 2000);
        assert_eq!(h.run_count(), 0);
        assert!(h.shown_ids().is_empty());
    }
}
