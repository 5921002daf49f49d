//! Near-duplicate guard for admitted posts.
//!
//! Copy-paste spam arrives under different ids, so id dedup alone misses it.
//! The guard remembers the normalized text of every admitted post and blocks a
//! candidate whose text is at least `threshold` similar to any of them.
//!
//! Similarity metric: `strsim::normalized_levenshtein` in [0.0, 1.0] over text
//! with links stripped, lower-cased, and whitespace collapsed.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;

static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("link regex"));

#[derive(Debug, Clone)]
pub struct NearDuplicateGuard {
    threshold: f64,
    seen: Vec<String>,
    blocked: usize,
}

impl NearDuplicateGuard {
    /// A threshold above 1.0 (or NaN) disables the guard.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: if threshold.is_finite() { threshold } else { 1.1 },
            seen: Vec::new(),
            blocked: 0,
        }
    }

    fn enabled(&self) -> bool {
        self.threshold <= 1.0
    }

    /// True (and counted) if `text` nearly matches an admitted text.
    pub fn check(&mut self, text: &str) -> bool {
        if !self.enabled() {
            return false;
        }
        let norm = normalize(text);
        let n = norm.chars().count();
        let hit = self.seen.iter().any(|prev| {
            let m = prev.chars().count();
            let longest = n.max(m);
            if longest == 0 {
                return true;
            }
            // Edit distance is at least the length gap; skip hopeless pairs.
            let best_case = 1.0 - (n.abs_diff(m) as f64 / longest as f64);
            best_case >= self.threshold && normalized_levenshtein(&norm, prev) >= self.threshold
        });
        if hit {
            self.blocked += 1;
        }
        hit
    }

    pub fn remember(&mut self, text: &str) {
        if self.enabled() {
            self.seen.push(normalize(text));
        }
    }

    pub fn blocked(&self) -> usize {
        self.blocked
    }
}

fn normalize(s: &str) -> String {
    let stripped = RE_LINK.replace_all(s, " ");
    let mut out = String::with_capacity(stripped.len());
    let mut last_was_space = false;
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
