// src/api.rs
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::ai::{AiConfig, DEFAULT_AI_CONFIG_PATH};
use crate::config::ScanConfig;
use crate::history::ScanRecord;
use crate::rewrite::{build_client_from_config, DynRewriteClient, RewriteMode, RewriteRequest};
use crate::scan::{ScanReport, Scanner};
use crate::session::{RewriteSet, Session};

pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

const MAX_VARIANTS_PER_REQUEST: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    scanner: Arc<Scanner>,
    rewriter: DynRewriteClient,
    session: Arc<Session>,
    default_variants: usize,
}

impl AppState {
    pub fn new(scanner: Arc<Scanner>, rewriter: DynRewriteClient, default_variants: usize) -> Self {
        Self {
            scanner,
            rewriter,
            session: Arc::new(Session::new()),
            default_variants: default_variants.clamp(1, MAX_VARIANTS_PER_REQUEST),
        }
    }

    /// Build everything from `config/` files and environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let scan_cfg = ScanConfig::load_default()?;
        let scanner = Scanner::from_config(scan_cfg)?;

        let ai_path = std::env::var(ENV_AI_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AI_CONFIG_PATH));
        let ai_cfg = AiConfig::load_or_disabled(&ai_path);
        let rewriter = build_client_from_config(&ai_cfg);
        tracing::info!(target: "rewrite", provider = rewriter.provider_name(), "rewrite client ready");

        Ok(Self::new(Arc::new(scanner), rewriter, ai_cfg.variants))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/scan", post(run_scan))
        .route("/scan/current", get(current_scan))
        .route("/rewrite", post(rewrite))
        .route("/rewrites", get(list_rewrites))
        .route("/history", get(history))
        .route("/history/clear", post(clear_history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ------------------------------------------------------------
// Errors
// ------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    Unavailable(&'static str),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.to_string()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: msg })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

async fn run_scan(State(state): State<AppState>) -> Json<ScanReport> {
    let report = state.scanner.scan().await;
    state.session.set_current(report.clone());
    Json(report)
}

async fn current_scan(State(state): State<AppState>) -> Result<Json<ScanReport>, ApiError> {
    state
        .session
        .current()
        .map(Json)
        .ok_or(ApiError::NotFound("no scan in this session"))
}

#[derive(Debug, Deserialize)]
struct RewriteBody {
    post_id: String,
    #[serde(default = "default_mode")]
    mode: RewriteMode,
    count: Option<usize>,
}

fn default_mode() -> RewriteMode {
    RewriteMode::Rewrite
}

async fn rewrite(
    State(state): State<AppState>,
    Json(body): Json<RewriteBody>,
) -> Result<Json<RewriteSet>, ApiError> {
    let post = state
        .session
        .find_post(&body.post_id)
        .ok_or(ApiError::NotFound("post not in current scan"))?;

    let req = RewriteRequest {
        mode: body.mode,
        count: body
            .count
            .unwrap_or(state.default_variants)
            .clamp(1, MAX_VARIANTS_PER_REQUEST),
        text: post.text,
        author: post.author_handle,
    };

    let generated = state.rewriter.generate(&req).await;
    let outcome = if generated.is_some() { "ok" } else { "empty" };
    counter!("rewrite_requests_total", "mode" => req.mode.as_str(), "outcome" => outcome)
        .increment(1);

    let variants = generated.ok_or(ApiError::Unavailable("no variants could be generated"))?;
    tracing::info!(
        target: "rewrite",
        post = %crate::fingerprint(&req.text),
        mode = req.mode.as_str(),
        count = variants.len(),
        "rewrites generated"
    );

    let set = RewriteSet {
        post_id: body.post_id,
        mode: req.mode,
        provider: state.rewriter.provider_name().to_string(),
        variants,
        created_at: Utc::now(),
    };
    state.session.store_rewrites(set.clone());
    Ok(Json(set))
}

async fn list_rewrites(State(state): State<AppState>) -> Json<Vec<RewriteSet>> {
    Json(state.session.rewrites())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResp {
    runs: Vec<ScanRecord>,
    overexposed: std::collections::BTreeMap<String, u8>,
    shown_ids: usize,
}

async fn history(State(state): State<AppState>, Query(q): Query<HistoryQuery>) -> Json<HistoryResp> {
    let h = state.scanner.history();
    Json(HistoryResp {
        runs: h.snapshot_last_n(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)),
        overexposed: h.overexposure().0,
        shown_ids: h.shown_ids().len(),
    })
}

/// Clears shown ids, run history, the current report, and generated rewrites.
async fn clear_history(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.scanner.history().clear()?;
    state.session.clear();
    tracing::info!(target: "history", "history and session cleared");
    Ok(StatusCode::NO_CONTENT)
}
