// src/search/x_api.rs
//! X API v2 recent-search adapter.
//!
//! Requires a bearer token in `X_BEARER_TOKEN` (or `TWITTER_BEARER_TOKEN`).
//! Response parsing is a pure function so it can be tested against fixtures.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use metrics::counter;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::search::normalize_text;
use crate::search::types::{
    Engagement, Media, RawPost, ReferenceKind, SearchProvider, SearchQuery, SortOrder,
};

pub const ENV_BEARER_TOKEN: &str = "X_BEARER_TOKEN";
pub const ENV_BEARER_TOKEN_LEGACY: &str = "TWITTER_BEARER_TOKEN";
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Recent search only reaches back seven days.
const MAX_WINDOW_HOURS: u32 = 168;

pub struct XApiProvider {
    http: reqwest::Client,
    bearer: String,
    base_url: String,
}

impl XApiProvider {
    pub fn new(bearer: String, base_url: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("debate-radar/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            bearer,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let bearer = std::env::var(ENV_BEARER_TOKEN)
            .or_else(|_| std::env::var(ENV_BEARER_TOKEN_LEGACY))
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("missing {ENV_BEARER_TOKEN} env var"))?;
        Self::new(bearer, None)
    }

    fn start_time(window_hours: u32) -> String {
        let hours = window_hours.min(MAX_WINDOW_HOURS);
        // A minute of slack so a full-window request is not rejected as too old.
        let start = Utc::now() - ChronoDuration::hours(i64::from(hours)) + ChronoDuration::minutes(1);
        start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[async_trait]
impl SearchProvider for XApiProvider {
    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawPost>> {
        let url = format!("{}/2/tweets/search/recent", self.base_url);
        let sort = match q.sort {
            SortOrder::Relevancy => "relevancy",
            SortOrder::Recency => "recency",
        };
        let max_results = q.max_results.clamp(10, 100).to_string();
        let start_time = Self::start_time(q.window_hours);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.bearer)
            .query(&[
                ("query", q.query.as_str()),
                ("max_results", max_results.as_str()),
                ("start_time", start_time.as_str()),
                ("sort_order", sort),
                (
                    "tweet.fields",
                    "created_at,public_metrics,referenced_tweets,author_id,attachments",
                ),
                ("expansions", "author_id,attachments.media_keys"),
                ("user.fields", "username,name"),
                ("media.fields", "type,url,preview_image_url"),
            ])
            .send()
            .await
            .context("x search http get()")?;

        let status = resp.status();
        if status.as_u16() == 429 {
            counter!("search_rate_limited_total").increment(1);
        }
        let body = resp.text().await.context("x search http .text()")?;
        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            bail!("x search returned {status}: {snippet}");
        }
        parse_search_response(&body)
    }

    fn name(&self) -> &'static str {
        "x"
    }
}

// ------------------------------------------------------------
// Wire format
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    media: Vec<WireMedia>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    public_metrics: Engagement,
    #[serde(default)]
    referenced_tweets: Vec<Reference>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

fn reference_kind(s: &str) -> Option<ReferenceKind> {
    match s {
        "retweeted" => Some(ReferenceKind::Retweeted),
        "quoted" => Some(ReferenceKind::Quoted),
        "replied_to" => Some(ReferenceKind::RepliedTo),
        _ => None,
    }
}

/// Parse a recent-search body into posts, joining authors and media from
/// `includes`. Tweets without a parseable timestamp are skipped.
pub fn parse_search_response(body: &str) -> Result<Vec<RawPost>> {
    let resp: SearchResponse = serde_json::from_str(body).context("parsing x search json")?;

    let users: HashMap<&str, &User> = resp
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u))
        .collect();
    let media: HashMap<&str, &WireMedia> = resp
        .includes
        .media
        .iter()
        .map(|m| (m.media_key.as_str(), m))
        .collect();

    let mut out = Vec::with_capacity(resp.data.len());
    for t in resp.data {
        let Some(created_at) = t
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
        else {
            tracing::debug!(target: "search", id = %t.id, "skipping tweet without created_at");
            continue;
        };

        let author = t.author_id.as_deref().and_then(|id| users.get(id));
        let post_media = t
            .attachments
            .map(|a| a.media_keys)
            .unwrap_or_default()
            .iter()
            .filter_map(|k| media.get(k.as_str()))
            .map(|m| Media {
                media_key: m.media_key.clone(),
                kind: m.kind.clone(),
                url: m.url.clone(),
                preview_url: m.preview_image_url.clone(),
            })
            .collect();

        out.push(RawPost {
            id: t.id,
            text: normalize_text(&t.text),
            author_handle: author.map(|u| u.username.clone()).unwrap_or_else(|| "i".into()),
            author_name: author.map(|u| u.name.clone()).unwrap_or_default(),
            created_at,
            metrics: t.public_metrics,
            references: t
                .referenced_tweets
                .iter()
                .filter_map(|r| reference_kind(&r.kind))
                .collect(),
            media: post_media,
        });
    }
    Ok(out)
}
