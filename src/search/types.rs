// src/search/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two monitored topic groups a batch (or post) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Primary,
    Secondary,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Primary => "primary",
            GroupRole::Secondary => "secondary",
        }
    }
}

/// Search strategy that produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Normal,
    Controversy,
    Recency,
    Accounts,
}

impl BatchKind {
    /// Recency and known-account batches get the lower engagement floor.
    pub fn relaxed_spam_floor(&self) -> bool {
        matches!(self, BatchKind::Recency | BatchKind::Accounts)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Normal => "normal",
            BatchKind::Controversy => "controversy",
            BatchKind::Recency => "recency",
            BatchKind::Accounts => "accounts",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub impression_count: Option<u64>,
}

impl Engagement {
    /// replies + likes + retweets (impressions never count).
    pub fn total(&self) -> u64 {
        self.reply_count
            .saturating_add(self.like_count)
            .saturating_add(self.retweet_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Retweeted,
    Quoted,
    RepliedTo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub media_key: String,
    pub kind: String, // "photo" | "video" | "animated_gif"
    pub url: Option<String>,
    pub preview_url: Option<String>,
}

/// A post as returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub text: String,
    pub author_handle: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Engagement,
    #[serde(default)]
    pub references: Vec<ReferenceKind>,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl RawPost {
    pub fn url(&self) -> String {
        format!("https://x.com/{}/status/{}", self.author_handle, self.id)
    }
}

/// One search result set tagged with the group and strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub group: GroupRole,
    pub kind: BatchKind,
    pub posts: Vec<RawPost>,
}

impl Batch {
    pub fn empty(group: GroupRole, kind: BatchKind) -> Self {
        Self {
            group,
            kind,
            posts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Relevancy,
    Recency,
}

/// A single planned search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub group: GroupRole,
    pub kind: BatchKind,
    pub query: String,
    pub window_hours: u32,
    pub sort: SortOrder,
    pub max_results: u32,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPost>>;
    fn name(&self) -> &'static str;
}
