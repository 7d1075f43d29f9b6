//! Router integration tests: policy enforcement, alias resolution, embedding
//! cache behavior and the merged model listing, against in-memory fakes.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

use common::{catalog_fixture, MemoryCache, MockLifecycle, MockLlm};
use hub_gateway::adapters::ChatMessage;
use hub_gateway::router::{ChatParams, GatewayRouter, ModelStatus};
use hub_gateway::types::{GatewayError, PolicyError};

fn chat_params(model: Option<&str>) -> ChatParams {
    ChatParams {
        model: model.map(str::to_string),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
        }],
        temperature: None,
        max_tokens: None,
    }
}

struct Fixture {
    router: GatewayRouter,
    llm: Arc<MockLlm>,
    lifecycle: Arc<MockLifecycle>,
    cache: Arc<MemoryCache>,
}

fn fixture(dir: &TempDir, with_defaults: bool, llm: MockLlm) -> Fixture {
    let catalog = catalog_fixture(dir, with_defaults);
    let llm = Arc::new(llm);
    let lifecycle = Arc::new(MockLifecycle::new());
    let cache = Arc::new(MemoryCache::new());
    let router = GatewayRouter::new(
        catalog,
        lifecycle.clone(),
        llm.clone(),
        cache.clone(),
    );
    Fixture {
        router,
        llm,
        lifecycle,
        cache,
    }
}

#[tokio::test]
async fn default_model_resolves_through_the_alias_table() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());

    let result = fx
        .router
        .chat(&"anonymous".to_string(), chat_params(None))
        .await
        .unwrap();

    // logical contract-default -> physical llama3.2:3b for the ollama provider
    assert_eq!(result.model, "llama3.2:3b");
    assert_eq!(fx.llm.last_model.lock().as_deref(), Some("llama3.2:3b"));
    // the bound llm service was woken exactly once
    assert_eq!(
        *fx.lifecycle.ensure_calls.lock(),
        vec![vec!["ollama".to_string()]]
    );
}

#[tokio::test]
async fn unaliased_models_pass_through_unchanged() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());

    let result = fx
        .router
        .chat(&"anonymous".to_string(), chat_params(Some("mistral:7b")))
        .await
        .unwrap();
    assert_eq!(result.model, "mistral:7b");
}

#[tokio::test]
async fn policy_rejects_disallowed_model_before_any_backend_work() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());

    let err = fx
        .router
        .chat(&"contract-app".to_string(), chat_params(Some("llama3.2:3b")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Policy(PolicyError::ModelNotAllowed { app_id, model })
            if app_id == "contract-app" && model == "llama3.2:3b"
    ));
    // rejected before wake and before dispatch
    assert_eq!(fx.lifecycle.ensure_count(), 0);
    assert_eq!(fx.llm.chat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_model_without_default_is_a_policy_error() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, false, MockLlm::new());

    let err = fx
        .router
        .chat(&"anonymous".to_string(), chat_params(None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Policy(PolicyError::NoDefaultModel { .. })
    ));
}

#[tokio::test]
async fn embedding_cache_hit_skips_wake_and_backend() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());
    let texts = vec!["the quick brown fox".to_string()];

    let first = fx
        .router
        .embeddings(&"anonymous".to_string(), None, &texts)
        .await
        .unwrap();
    assert_eq!(fx.llm.embedding_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.cache.len(), 1);

    let second = fx
        .router
        .embeddings(&"anonymous".to_string(), None, &texts)
        .await
        .unwrap();

    // served from cache: no second backend call, no second wake
    assert_eq!(fx.llm.embedding_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.lifecycle.ensure_count(), 1);
    assert_eq!(second.data.len(), first.data.len());
    assert_eq!(second.model, first.model);
}

#[tokio::test]
async fn different_inputs_miss_the_cache() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());

    fx.router
        .embeddings(&"anonymous".to_string(), None, &["a".to_string()])
        .await
        .unwrap();
    fx.router
        .embeddings(&"anonymous".to_string(), None, &["b".to_string()])
        .await
        .unwrap();

    assert_eq!(fx.llm.embedding_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.cache.len(), 2);
}

#[tokio::test]
async fn model_listing_merges_live_and_declared_models() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::new());

    let models = fx.router.list_models().await;
    let find = |id: &str| models.iter().find(|m| m.id == id).unwrap();

    // alias whose physical model is loaded counts as running
    let aliased = find("contract-default");
    assert_eq!(aliased.status, ModelStatus::Running);
    assert_eq!(aliased.resolves_to.as_deref(), Some("llama3.2:3b"));

    assert_eq!(find("llama3.2:3b").status, ModelStatus::Running);
    // declared in a policy but not loaded
    assert_eq!(find("gpt-4").status, ModelStatus::Available);
}

#[tokio::test]
async fn model_listing_marks_declared_models_unavailable_when_backend_is_down() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(&dir, true, MockLlm::unreachable());

    let models = fx.router.list_models().await;
    assert!(!models.is_empty());
    assert!(models.iter().all(|m| m.status == ModelStatus::Unavailable));
}
