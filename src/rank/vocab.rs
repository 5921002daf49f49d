// src/rank/vocab.rs
//! Topic vocabulary: keyword tables for group membership, off-topic detection,
//! controversy language, priority tiers, and subject tags.
//!
//! Loaded from TOML (`TOPICS_CONFIG_PATH` or `config/topics.toml`); falls back to
//! the seed embedded at build time. Terms are lower-cased and trimmed on load and
//! matched as whole words of the lower-cased post text, with an optional plural
//! `s`/`es` ending (`playoff` matches "playoffs", `bust` does not match "robust").

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOPICS_CONFIG_PATH: &str = "config/topics.toml";
pub const ENV_TOPICS_CONFIG_PATH: &str = "TOPICS_CONFIG_PATH";

/// Tag used when no subject rule and no group keyword matches.
pub const OTHER_SUBJECT: &str = "Other";

static SEED: Lazy<TopicVocab> = Lazy::new(|| {
    let raw = include_str!("../../config/topics.toml");
    TopicVocab::from_toml_str(raw).expect("valid built-in topic vocabulary")
});

fn default_baseline_label() -> String {
    "Generic".to_string()
}
fn default_baseline_bonus() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicVocab {
    pub primary: GroupVocab,
    pub secondary: GroupVocab,
    #[serde(default)]
    pub controversy: TermList,
    #[serde(default)]
    pub priority: Vec<PriorityTier>,
    #[serde(default = "default_baseline_label")]
    pub baseline_label: String,
    #[serde(default = "default_baseline_bonus")]
    pub baseline_bonus: i64,
    #[serde(default)]
    pub subjects: Vec<SubjectRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupVocab {
    pub name: String,
    pub keywords: TermList,
    #[serde(default)]
    pub hashtags: TermList,
    /// Handles (without `@`) searched by the known-accounts strategy.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Vocabulary of a same-named but different real-world entity.
    #[serde(default)]
    pub exclude: TermList,
    /// Context terms that confirm the post is really about this group.
    #[serde(default)]
    pub confirm: TermList,
    pub fallback_subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTier {
    pub label: String,
    pub bonus: i64,
    pub keywords: TermList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRule {
    pub tag: String,
    pub triggers: TermList,
}

/// Lower-cased, de-duplicated terms plus one compiled matcher for the whole list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TermList {
    terms: Vec<String>,
    matcher: Option<Regex>,
}

impl TermList {
    pub fn new<I, S>(terms: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for t in terms {
            let t = t.as_ref().trim().to_lowercase();
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        }
        let matcher = if out.is_empty() {
            None
        } else {
            let alts: Vec<String> = out.iter().map(|t| regex::escape(t)).collect();
            Some(Regex::new(&format!(
                r"(?:^|[^\p{{L}}\p{{N}}_])(?:{})(?:e?s)?(?:[^\p{{L}}\p{{N}}_]|$)",
                alts.join("|")
            ))?)
        };
        Ok(Self {
            terms: out,
            matcher,
        })
    }

    /// True if any term occurs as a word of the (already lower-cased) text.
    pub fn matches(&self, text_lc: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(text_lc))
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.terms.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl TryFrom<Vec<String>> for TermList {
    type Error = regex::Error;

    fn try_from(terms: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(terms)
    }
}

impl From<TermList> for Vec<String> {
    fn from(list: TermList) -> Self {
        list.terms
    }
}

impl GroupVocab {
    /// Core keyword or group hashtag present.
    pub fn mentions(&self, text_lc: &str) -> bool {
        self.keywords.matches(text_lc) || self.has_hashtag(text_lc)
    }

    pub fn has_hashtag(&self, text_lc: &str) -> bool {
        self.hashtags.matches(text_lc)
    }

    pub fn excludes(&self, text_lc: &str) -> bool {
        self.exclude.matches(text_lc)
    }

    pub fn confirms(&self, text_lc: &str) -> bool {
        self.confirm.matches(text_lc)
    }

    fn normalize(&mut self) {
        self.accounts = self
            .accounts
            .iter()
            .map(|a| a.trim().trim_start_matches('@').to_string())
            .filter(|a| !a.is_empty())
            .collect();
    }
}

impl TopicVocab {
    /// Built-in vocabulary (Broncos primary, Nuggets secondary).
    pub fn default_seed() -> Self {
        SEED.clone()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut v: TopicVocab = toml::from_str(s).context("parsing topic vocabulary toml")?;
        v.normalize();
        Ok(v)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading topic vocabulary from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// `$TOPICS_CONFIG_PATH` → `config/topics.toml` → built-in seed.
    /// A configured path that fails to load is an error; a missing default file is not.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_TOPICS_CONFIG_PATH) {
            return Self::load_from_path(&PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_TOPICS_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_path(&default);
        }
        Ok(Self::default_seed())
    }

    /// First matching tier wins; baseline when none match.
    pub fn priority_for(&self, text_lc: &str) -> (&str, i64) {
        self.priority
            .iter()
            .find(|t| t.keywords.matches(text_lc))
            .map(|t| (t.label.as_str(), t.bonus))
            .unwrap_or((self.baseline_label.as_str(), self.baseline_bonus))
    }

    pub fn has_controversy(&self, text_lc: &str) -> bool {
        self.controversy.matches(text_lc)
    }

    fn normalize(&mut self) {
        self.primary.normalize();
        self.secondary.normalize();
        // A rule with no triggers could never fire; drop it.
        self.subjects.retain(|r| !r.triggers.is_empty());
        self.priority.retain(|t| !t.keywords.is_empty());
    }
}
