// tests/rewrite_cache.rs
//
// Rewrite client wrapper: file cache, daily limit, and client selection.

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use debate_radar::config::AiConfig;
use debate_radar::rewrite::adapter::{CachingClient, Provider};
use debate_radar::rewrite::{build_client_from_config, Persona, RewriteClient, RewriteMode, RewriteRequest};

/// Counts remote calls and answers with a fixed numbered list.
#[derive(Clone, Default)]
struct CountingProvider {
    calls: Arc<AtomicUsize>,
    raw: &'static str,
}

impl Provider for CountingProvider {
    fn fetch<'a>(
        &'a self,
        _persona: &'a Persona,
        _req: &'a RewriteRequest,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let raw = self.raw.to_string();
        Box::pin(async move { Some(raw) })
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

fn req(text: &str) -> RewriteRequest {
    RewriteRequest {
        mode: RewriteMode::Rewrite,
        count: 2,
        text: text.into(),
        author: "fan".into(),
    }
}

#[tokio::test]
async fn cache_hit_skips_provider_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider {
        raw: "1. Bo Nix is fine, actually\n2. Relax, Bo Nix is year two",
        ..Default::default()
    };
    let calls = Arc::clone(&provider.calls);

    let c = CachingClient::new(provider.clone(), Persona::default(), dir.path().to_path_buf(), 5);
    let first = c.generate(&req("Bo Nix is overrated")).await.unwrap();
    let second = c.generate(&req("Bo Nix is overrated")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0], "Bo Nix is fine, actually");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.calls_today(), 1);

    // New client over the same directory: cache and counter persist.
    let c2 = CachingClient::new(provider, Persona::default(), dir.path().to_path_buf(), 5);
    assert_eq!(c2.calls_today(), 1);
    c2.generate(&req("Bo Nix is overrated")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn daily_limit_blocks_new_calls_but_not_cache_hits() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider {
        raw: "1. one\n2. two",
        ..Default::default()
    };
    let calls = Arc::clone(&provider.calls);
    let c = CachingClient::new(provider, Persona::default(), dir.path().to_path_buf(), 2);

    assert!(c.generate(&req("first")).await.is_some());
    assert!(c.generate(&req("second")).await.is_some());
    assert!(c.generate(&req("third")).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Cached text still answers.
    assert!(c.generate(&req("first")).await.is_some());
    assert_eq!(c.calls_today(), 2);
}

#[tokio::test]
async fn unusable_completion_is_none_and_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider {
        raw: "   \n\n",
        ..Default::default()
    };
    let c = CachingClient::new(provider, Persona::default(), dir.path().to_path_buf(), 5);
    assert!(c.generate(&req("anything")).await.is_none());
    assert_eq!(c.calls_today(), 0);
}

#[serial_test::serial]
#[test]
fn client_selection_follows_test_mode_and_enabled_flag() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AiConfig {
        cache_dir: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    };

    env::remove_var("AI_TEST_MODE");
    assert_eq!(build_client_from_config(&cfg).provider_name(), "disabled");

    env::set_var("AI_TEST_MODE", "mock");
    assert_eq!(build_client_from_config(&cfg).provider_name(), "mock");
    env::remove_var("AI_TEST_MODE");

    let unknown = AiConfig {
        enabled: true,
        provider: "carrier-pigeon".into(),
        ..cfg.clone()
    };
    assert_eq!(build_client_from_config(&unknown).provider_name(), "disabled");
}
