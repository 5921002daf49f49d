//! debate-radar — Binary Entrypoint
//! Boots the Axum HTTP server: scan orchestration, rewrite generation, and
//! Prometheus metrics.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use debate_radar::{api, metrics::Metrics, AppState};

/// Compact logs by default, JSON when `LOG_FORMAT=json`.
/// Uses `try_init` so an already-installed subscriber (hosting runtime) wins.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debate_radar=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let metrics = Metrics::init()?;
    let state = AppState::from_env()?;
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
