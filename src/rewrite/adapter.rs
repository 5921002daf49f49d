//! Rewrite adapter: provider abstraction + file cache + daily limit.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AiConfig;
use crate::rewrite::prompt::{parse_variants, system_prompt, user_prompt, Persona, RewriteRequest};

pub const ENV_AI_TEST_MODE: &str = "AI_TEST_MODE";

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Trait object used by the API layer.
pub trait RewriteClient: Send + Sync {
    /// Cleaned variants, or `None` when nothing usable could be produced.
    fn generate<'a>(
        &'a self,
        req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynRewriteClient = Arc<dyn RewriteClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider (OpenAI) wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynRewriteClient {
    let cache_dir = PathBuf::from(&config.cache_dir);

    if std::env::var(ENV_AI_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(CachingClient::new(
            MockProvider,
            config.persona.clone(),
            cache_dir,
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(config.api_key.clone(), &config.model) {
            Ok(provider) => Arc::new(CachingClient::new(
                provider,
                config.persona.clone(),
                cache_dir,
                config.daily_limit,
            )),
            Err(e) => {
                tracing::warn!(target: "rewrite", error = ?e, "openai client unavailable; generation disabled");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(target: "rewrite", provider = other, "unsupported rewrite provider; generation disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call and returns the raw completion.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        persona: &'a Persona,
        req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("debate-radar/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(
        &'a self,
        persona: &'a Persona,
        req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = system_prompt(persona);
            let user = user_prompt(req);
            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: &sys,
                    },
                    Msg {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: 0.9,
                max_tokens: 120 * req.count.max(1) as u32,
            };

            let resp = match self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(target: "rewrite", error = %e, "openai request failed");
                    return None;
                }
            };

            if !resp.status().is_success() {
                tracing::warn!(target: "rewrite", status = %resp.status(), "openai returned error status");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            body.choices.into_iter().next().map(|c| c.message.content)
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when generation is disabled.
pub struct DisabledClient;

impl RewriteClient for DisabledClient {
    fn generate<'a>(
        &'a self,
        _req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockProvider;

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        persona: &'a Persona,
        req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let head: String = req.text.chars().take(40).collect();
        let out = (1..=req.count)
            .map(|i| format!("{i}. [{}] {} #{i}: {head}", persona.name, req.mode.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    persona: Persona,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, persona: Persona, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(target: "rewrite", dir = %cache_dir.display(), error = %e, "cannot create rewrite cache dir");
        }
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            persona,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    async fn generate_impl(&self, req: &RewriteRequest) -> Option<Vec<String>> {
        let key = cache_key(&self.persona, req);

        // Cache hits are free, even past the limit.
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            tracing::debug!(target: "rewrite", %key, "rewrite cache hit");
            return Some(hit.variants);
        }

        {
            let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                tracing::warn!(target: "rewrite", limit = self.daily_limit_max, "daily rewrite limit reached");
                return None;
            }
        }

        let raw = self.inner.fetch(&self.persona, req).await?;
        let variants = parse_variants(&raw, req.count);
        if variants.is_empty() {
            return None;
        }

        if let Err(e) = write_cache_file(
            &self.cache_dir,
            &key,
            &CachedVariants {
                variants: variants.clone(),
            },
        ) {
            tracing::warn!(target: "rewrite", error = %e, "rewrite cache write failed");
        }
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Some(variants)
    }
}

impl<P: Provider> RewriteClient for CachingClient<P> {
    fn generate<'a>(
        &'a self,
        req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        Box::pin(self.generate_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedVariants {
    variants: Vec<String>,
}

/// Hex sha256 over persona, mode, count, and post text.
pub fn cache_key(persona: &Persona, req: &RewriteRequest) -> String {
    let count = req.count.to_string();
    let mut hasher = Sha256::new();
    for part in [
        persona.name.as_str(),
        persona.voice.as_str(),
        req.mode.as_str(),
        count.as_str(),
        req.author.as_str(),
        req.text.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedVariants> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str::<CachedVariants>(&s)
        .ok()
        .filter(|c| !c.variants.is_empty())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedVariants) -> io::Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&cache_path(dir, key), &json)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let json = serde_json::to_vec(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&counter_path(dir), &json)
}
