//! Shared fixtures for integration tests: a catalog builder over a temp
//! directory and in-memory fakes for the process controller, health prober,
//! LLM runtime and embedding cache.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use hub_gateway::adapters::{
    ChatChoice, ChatMessage, ChatRequest, LlmRuntime, UnifiedChatResult, UnifiedEmbeddingResult,
    Usage,
};
use hub_gateway::catalog::AssetCatalog;
use hub_gateway::lifecycle::process::ProcessController;
use hub_gateway::lifecycle::{HealthProber, LifecycleController};
use hub_gateway::router::EmbeddingCache;
use hub_gateway::types::{AdapterError, LifecycleError, ProcessError, ServiceName};

/// Write a catalog with two services (`ollama` depending on `redis`) and one
/// policy-restricted app, then load it.
pub fn catalog_fixture(dir: &TempDir, with_defaults: bool) -> Arc<AssetCatalog> {
    let defaults = if with_defaults {
        serde_json::json!({
            "default_model": "contract-default",
            "default_embedding": "nomic-embed-text",
            "temperature": 0.2
        })
    } else {
        serde_json::json!({})
    };
    let catalog = serde_json::json!({
        "version": 1,
        "assets": [
            {
                "asset_id": "redis",
                "class": "service",
                "interface": "cache-queue",
                "endpoints": {"api": "redis://localhost:6379"},
                "runtime": {"container": "hub-redis"}
            },
            {
                "asset_id": "ollama",
                "class": "service",
                "interface": "llm-runtime",
                "adapter_required": true,
                "endpoints": {"api": "http://localhost:11434"},
                "runtime": {"container": "hub-ollama", "depends_on": ["redis"]}
            },
            {
                "asset_id": "contract-app",
                "class": "app",
                "policy": {
                    "allowed_models": ["gpt-4"],
                    "default_model": "gpt-4"
                }
            }
        ],
        "bindings": {
            "llm-runtime": "ollama",
            "cache-queue": "redis"
        },
        "defaults": defaults,
        "startup_order": ["redis", "ollama"]
    });
    let aliases = serde_json::json!({
        "aliases": {
            "contract-default": {"ollama": "llama3.2:3b"}
        }
    });

    let catalog_path = dir.path().join("catalog.json");
    let alias_path = dir.path().join("aliases.json");
    std::fs::write(&catalog_path, catalog.to_string()).unwrap();
    std::fs::write(&alias_path, aliases.to_string()).unwrap();
    Arc::new(AssetCatalog::load(&catalog_path, &alias_path).unwrap())
}

pub fn fixture_paths(dir: &TempDir) -> (PathBuf, PathBuf) {
    (dir.path().join("catalog.json"), dir.path().join("aliases.json"))
}

/// In-memory process controller: tracks a running set and every start call
/// in order.
pub struct MockProcessController {
    running: Mutex<HashSet<String>>,
    starts: Mutex<Vec<String>>,
    fail_containers: HashSet<String>,
    /// When false, `start` succeeds but the container never reports running.
    confirm_on_start: bool,
}

impl MockProcessController {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashSet::new()),
            starts: Mutex::new(Vec::new()),
            fail_containers: HashSet::new(),
            confirm_on_start: true,
        }
    }

    pub fn failing(containers: &[&str]) -> Self {
        let mut controller = Self::new();
        controller.fail_containers = containers.iter().map(|c| c.to_string()).collect();
        controller
    }

    pub fn never_ready() -> Self {
        let mut controller = Self::new();
        controller.confirm_on_start = false;
        controller
    }

    pub fn start_calls(&self) -> Vec<String> {
        self.starts.lock().clone()
    }

    pub fn start_count(&self, container: &str) -> usize {
        self.starts.lock().iter().filter(|c| *c == container).count()
    }

    pub fn mark_running(&self, container: &str) {
        self.running.lock().insert(container.to_string());
    }
}

#[async_trait]
impl ProcessController for MockProcessController {
    async fn start(&self, container: &str) -> Result<(), ProcessError> {
        self.starts.lock().push(container.to_string());
        if self.fail_containers.contains(container) {
            return Err(ProcessError::CommandFailed {
                container: container.to_string(),
                reason: "exit status 1".to_string(),
            });
        }
        // widen the race window for concurrent-start tests
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.confirm_on_start {
            self.running.lock().insert(container.to_string());
        }
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<(), ProcessError> {
        self.running.lock().remove(container);
        Ok(())
    }

    async fn restart(&self, container: &str) -> Result<(), ProcessError> {
        self.stop(container).await?;
        self.start(container).await
    }

    async fn is_running(&self, container: &str) -> Result<bool, ProcessError> {
        Ok(self.running.lock().contains(container))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Prober that always answers "unhealthy"; the fixture assets declare no
/// health endpoints so it never fires.
pub struct NullProber;

#[async_trait]
impl HealthProber for NullProber {
    async fn probe(&self, _service: &ServiceName, _health_url: &str) -> bool {
        false
    }
}

/// Canned LLM runtime that counts backend calls.
pub struct MockLlm {
    pub chat_calls: AtomicUsize,
    pub embedding_calls: AtomicUsize,
    pub last_model: Mutex<Option<String>>,
    pub live_models: Result<Vec<String>, ()>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            chat_calls: AtomicUsize::new(0),
            embedding_calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
            live_models: Ok(vec!["llama3.2:3b".to_string()]),
        }
    }

    pub fn unreachable() -> Self {
        let mut llm = Self::new();
        llm.live_models = Err(());
        llm
    }
}

#[async_trait]
impl LlmRuntime for MockLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<UnifiedChatResult, AdapterError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(request.model.clone());
        Ok(UnifiedChatResult {
            id: "chatcmpl-test".to_string(),
            object: "chat.completion".to_string(),
            created: 1,
            model: request.model.clone(),
            provider: "ollama".to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: "ok".to_string(),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
            latency_ms: 1,
        })
    }

    async fn embeddings(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<UnifiedEmbeddingResult, AdapterError> {
        self.embedding_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(model.to_string());
        Ok(UnifiedEmbeddingResult {
            object: "list".to_string(),
            model: model.to_string(),
            provider: "ollama".to_string(),
            data: texts
                .iter()
                .enumerate()
                .map(|(index, _)| hub_gateway::adapters::EmbeddingData {
                    object: "embedding".to_string(),
                    index: index as u32,
                    embedding: vec![0.1, 0.2, 0.3],
                })
                .collect(),
            usage: Usage::default(),
            latency_ms: 1,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        match &self.live_models {
            Ok(models) => Ok(models.clone()),
            Err(()) => Err(AdapterError::Transport {
                message: "connection refused".to_string(),
            }),
        }
    }

    fn provider(&self) -> &str {
        "ollama"
    }
}

/// Lifecycle fake that records which services were requested.
pub struct MockLifecycle {
    pub ensure_calls: Mutex<Vec<Vec<ServiceName>>>,
}

impl MockLifecycle {
    pub fn new() -> Self {
        Self {
            ensure_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ensure_count(&self) -> usize {
        self.ensure_calls.lock().len()
    }
}

#[async_trait]
impl LifecycleController for MockLifecycle {
    async fn ensure_ready(&self, services: &[ServiceName]) -> Result<(), LifecycleError> {
        self.ensure_calls.lock().push(services.to_vec());
        Ok(())
    }

    async fn start_service(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        self.ensure_ready(std::slice::from_ref(service)).await
    }

    async fn stop_service(&self, _service: &ServiceName) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn restart_service(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        self.start_service(service).await
    }

    async fn keep_warm(
        &self,
        _service: &ServiceName,
        _window: Duration,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Plain in-memory embedding cache.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl EmbeddingCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    async fn put(&self, key: &str, value: &Value, _ttl: Duration) {
        self.entries.lock().insert(key.to_string(), value.clone());
    }
}
