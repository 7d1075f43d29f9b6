//! Request router
//!
//! The pipeline every inference request walks: policy enforcement, model
//! alias resolution, auto-wake of the bound backend (and its dependencies),
//! then dispatch through the LLM adapter. Embedding requests additionally
//! consult the embedding cache before touching the backend at all, so a
//! cache hit never wakes a sleeping runtime.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{CacheQueueAdapter, ChatMessage, ChatRequest, LlmRuntime, UnifiedChatResult, UnifiedEmbeddingResult};
use crate::catalog::AssetCatalog;
use crate::lifecycle::LifecycleController;
use crate::types::{
    AppId, CatalogError, GatewayError, GatewayResult, PolicyError, CAP_LLM_RUNTIME,
};

/// Cache seam for embedding results. Kept as a trait so the router does not
/// care whether Redis is reachable or even configured.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: &Value, ttl: Duration);
}

#[async_trait]
impl EmbeddingCache for CacheQueueAdapter {
    async fn get(&self, key: &str) -> Option<Value> {
        self.get_json(key).await
    }

    async fn put(&self, key: &str, value: &Value, ttl: Duration) {
        self.set_json(key, value, Some(ttl.as_secs())).await;
    }
}

/// Chat parameters as they arrive from the HTTP surface; the model is
/// optional because the app policy may supply a default.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Availability of one model as reported by `/v1/models`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Present in the backend's live listing.
    Running,
    /// Declared in the catalog or alias table but not currently loaded.
    Available,
    /// The backend could not be queried; declared models only.
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub provider: String,
    pub status: ModelStatus,
    /// Physical id the alias table maps this model to, when it differs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolves_to: Option<String>,
}

const DEFAULT_EMBEDDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The router proper.
pub struct GatewayRouter {
    catalog: Arc<AssetCatalog>,
    lifecycle: Arc<dyn LifecycleController>,
    llm: Arc<dyn LlmRuntime>,
    cache: Arc<dyn EmbeddingCache>,
    embedding_ttl: Duration,
}

impl GatewayRouter {
    pub fn new(
        catalog: Arc<AssetCatalog>,
        lifecycle: Arc<dyn LifecycleController>,
        llm: Arc<dyn LlmRuntime>,
        cache: Arc<dyn EmbeddingCache>,
    ) -> Self {
        Self {
            catalog,
            lifecycle,
            llm,
            cache,
            embedding_ttl: DEFAULT_EMBEDDING_TTL,
        }
    }

    pub fn with_embedding_ttl(mut self, ttl: Duration) -> Self {
        self.embedding_ttl = ttl;
        self
    }

    /// Policy check and alias resolution for a chat model. Returns the
    /// physical model id and the name of the service to wake.
    fn resolve_chat_model(
        &self,
        app_id: &AppId,
        requested: Option<&str>,
    ) -> GatewayResult<(String, String, Option<f32>)> {
        let snapshot = self.catalog.snapshot();
        let policy = snapshot.app_policy(app_id);

        let logical = match requested {
            Some(model) => model.to_string(),
            None => policy
                .default_model
                .clone()
                .ok_or_else(|| PolicyError::NoDefaultModel {
                    app_id: app_id.clone(),
                })?,
        };
        if !policy.allows_model(&logical) {
            return Err(PolicyError::ModelNotAllowed {
                app_id: app_id.clone(),
                model: logical,
            }
            .into());
        }

        let asset = snapshot
            .bound_asset(CAP_LLM_RUNTIME)
            .ok_or_else(|| CatalogError::BindingNotFound {
                capability: CAP_LLM_RUNTIME.to_string(),
            })?;
        let physical = snapshot
            .resolve_alias(&logical, self.llm.provider())
            .unwrap_or(logical);
        Ok((physical, asset.asset_id.clone(), policy.temperature))
    }

    fn resolve_embedding_model(
        &self,
        app_id: &AppId,
        requested: Option<&str>,
    ) -> GatewayResult<(String, String)> {
        let snapshot = self.catalog.snapshot();
        let policy = snapshot.app_policy(app_id);

        let logical = match requested {
            Some(model) => model.to_string(),
            None => policy
                .default_embedding
                .clone()
                .ok_or_else(|| PolicyError::NoDefaultModel {
                    app_id: app_id.clone(),
                })?,
        };
        if !policy.allows_embedding(&logical) {
            return Err(PolicyError::EmbeddingNotAllowed {
                app_id: app_id.clone(),
                model: logical,
            }
            .into());
        }

        let asset = snapshot
            .bound_asset(CAP_LLM_RUNTIME)
            .ok_or_else(|| CatalogError::BindingNotFound {
                capability: CAP_LLM_RUNTIME.to_string(),
            })?;
        let physical = snapshot
            .resolve_alias(&logical, self.llm.provider())
            .unwrap_or(logical);
        Ok((physical, asset.asset_id.clone()))
    }

    /// Chat completion: policy, alias, auto-wake, dispatch.
    pub async fn chat(
        &self,
        app_id: &AppId,
        params: ChatParams,
    ) -> GatewayResult<UnifiedChatResult> {
        let (model, service, default_temperature) =
            self.resolve_chat_model(app_id, params.model.as_deref())?;

        self.lifecycle.ensure_ready(&[service]).await?;

        let request = ChatRequest {
            model,
            messages: params.messages,
            temperature: params.temperature.or(default_temperature),
            max_tokens: params.max_tokens,
            stream: false,
        };
        let result = self.llm.chat(&request).await?;
        tracing::info!(
            app_id = %app_id,
            model = %result.model,
            latency_ms = result.latency_ms,
            "chat routed"
        );
        Ok(result)
    }

    /// Embeddings: cache first, then policy-gated backend dispatch.
    pub async fn embeddings(
        &self,
        app_id: &AppId,
        model: Option<&str>,
        texts: &[String],
    ) -> GatewayResult<UnifiedEmbeddingResult> {
        let (model, service) = self.resolve_embedding_model(app_id, model)?;

        let key = embedding_cache_key(app_id, self.llm.provider(), &model, texts);
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(result) = serde_json::from_value::<UnifiedEmbeddingResult>(cached) {
                tracing::debug!(app_id = %app_id, model = %model, "embedding cache hit");
                return Ok(result);
            }
        }

        self.lifecycle.ensure_ready(&[service]).await?;

        let result = self.llm.embeddings(&model, texts).await?;
        if let Ok(value) = serde_json::to_value(&result) {
            self.cache.put(&key, &value, self.embedding_ttl).await;
        }
        tracing::info!(
            app_id = %app_id,
            model = %model,
            inputs = texts.len(),
            latency_ms = result.latency_ms,
            "embeddings routed"
        );
        Ok(result)
    }

    /// Merged model listing: the backend's live models plus everything the
    /// catalog and alias table declare. Live models report `running`;
    /// declared-but-unloaded models report `available`; when the backend
    /// cannot be queried (typically asleep) declared models report
    /// `unavailable` rather than disappearing.
    pub async fn list_models(&self) -> Vec<ModelEntry> {
        let provider = self.llm.provider().to_string();
        let snapshot = self.catalog.snapshot();

        let mut entries: BTreeMap<String, ModelEntry> = BTreeMap::new();
        let live = self.llm.list_models().await;
        let declared_status = match &live {
            Ok(_) => ModelStatus::Available,
            Err(e) => {
                tracing::debug!(error = %e, "live model listing unavailable");
                ModelStatus::Unavailable
            }
        };

        for logical in snapshot.declared_models() {
            let resolves_to = snapshot.resolve_alias(&logical, &provider);
            entries.insert(
                logical.clone(),
                ModelEntry {
                    id: logical,
                    provider: provider.clone(),
                    status: declared_status,
                    resolves_to,
                },
            );
        }
        for logical in snapshot.aliases.aliases.keys() {
            let resolves_to = snapshot.resolve_alias(logical, &provider);
            entries.entry(logical.clone()).or_insert(ModelEntry {
                id: logical.clone(),
                provider: provider.clone(),
                status: declared_status,
                resolves_to,
            });
        }

        if let Ok(live_models) = live {
            for model in &live_models {
                entries
                    .entry(model.clone())
                    .and_modify(|entry| entry.status = ModelStatus::Running)
                    .or_insert(ModelEntry {
                        id: model.clone(),
                        provider: provider.clone(),
                        status: ModelStatus::Running,
                        resolves_to: None,
                    });
            }
            // an alias whose physical model is loaded counts as running too
            let live_set: std::collections::HashSet<&String> = live_models.iter().collect();
            for entry in entries.values_mut() {
                if let Some(physical) = &entry.resolves_to {
                    if live_set.contains(physical) {
                        entry.status = ModelStatus::Running;
                    }
                }
            }
        }

        entries.into_values().collect()
    }
}

/// Deterministic cache key over everything that influences the vector.
pub fn embedding_cache_key(app_id: &str, provider: &str, model: &str, texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_id.as_bytes());
    hasher.update([0]);
    hasher.update(provider.as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    for text in texts {
        hasher.update([0]);
        hasher.update(text.as_bytes());
    }
    format!("emb:{}", hex::encode(hasher.finalize()))
}

/// Map a gateway error to an HTTP status and a short machine-readable stage
/// code.
pub fn error_status(error: &GatewayError) -> (u16, &'static str) {
    match error {
        GatewayError::Policy(PolicyError::NoDefaultModel { .. }) => (400, "no_default_model"),
        GatewayError::Policy(_) => (403, "policy_rejected"),
        GatewayError::Catalog(CatalogError::BindingNotFound { .. }) => (503, "no_backend_bound"),
        GatewayError::Catalog(CatalogError::AssetNotFound { .. }) => (404, "asset_not_found"),
        GatewayError::Catalog(_) => (400, "catalog_invalid"),
        GatewayError::Lifecycle(error) => {
            use crate::types::LifecycleError::*;
            match error {
                DependencyStartFailed { .. } => (503, "dependency_start_failed"),
                TargetStartFailed { .. } => (503, "service_start_failed"),
                ReadinessTimeout { .. } => (503, "readiness_timeout"),
                UnknownService { .. } => (404, "unknown_service"),
                StopFailed { .. } => (500, "stop_failed"),
                ShuttingDown => (503, "shutting_down"),
            }
        }
        GatewayError::Adapter(error) => {
            use crate::types::AdapterError::*;
            match error {
                Upstream { status, .. } => (*status, "backend_error"),
                Transport { .. } => (503, "transport_error"),
                InvalidResponse { .. } => (502, "invalid_backend_response"),
                NotInitialized => (503, "adapter_not_initialized"),
            }
        }
        GatewayError::Process(_) => (503, "process_control_failed"),
        GatewayError::Internal(_) => (500, "internal_error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_sensitive_to_every_input() {
        let texts = vec!["hello".to_string(), "world".to_string()];
        let base = embedding_cache_key("app", "ollama", "nomic", &texts);
        assert_eq!(base, embedding_cache_key("app", "ollama", "nomic", &texts));
        assert!(base.starts_with("emb:"));

        assert_ne!(base, embedding_cache_key("other", "ollama", "nomic", &texts));
        assert_ne!(base, embedding_cache_key("app", "vllm", "nomic", &texts));
        assert_ne!(base, embedding_cache_key("app", "ollama", "mxbai", &texts));
        let reordered = vec!["world".to_string(), "hello".to_string()];
        assert_ne!(base, embedding_cache_key("app", "ollama", "nomic", &reordered));
        // separator keeps ["ab"] distinct from ["a", "b"]
        assert_ne!(
            embedding_cache_key("app", "p", "m", &["ab".to_string()]),
            embedding_cache_key("app", "p", "m", &["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn policy_rejections_map_to_4xx() {
        let err = GatewayError::from(PolicyError::ModelNotAllowed {
            app_id: "app".to_string(),
            model: "m".to_string(),
        });
        assert_eq!(error_status(&err), (403, "policy_rejected"));

        let err = GatewayError::from(PolicyError::NoDefaultModel {
            app_id: "app".to_string(),
        });
        assert_eq!(error_status(&err), (400, "no_default_model"));
    }

    #[test]
    fn upstream_errors_keep_their_status() {
        let err = GatewayError::from(crate::types::AdapterError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        });
        assert_eq!(error_status(&err), (429, "backend_error"));

        let err = GatewayError::from(crate::types::AdapterError::Transport {
            message: "connection refused".to_string(),
        });
        assert_eq!(error_status(&err), (503, "transport_error"));
    }

    #[test]
    fn lifecycle_failures_are_service_unavailable() {
        let err = GatewayError::from(crate::types::LifecycleError::DependencyStartFailed {
            target: "ollama".to_string(),
            dependency: "redis".to_string(),
            reason: "boom".to_string(),
        });
        assert_eq!(error_status(&err), (503, "dependency_start_failed"));

        let err = GatewayError::from(crate::types::LifecycleError::ReadinessTimeout {
            service: "ollama".to_string(),
            waited_secs: 60,
        });
        assert_eq!(error_status(&err), (503, "readiness_timeout"));
    }
}
