//! Local AI infrastructure gateway
//!
//! One process that fronts a set of heavyweight local backends (LLM runtime,
//! vector store, cache) and manages their lifecycle: requests wake the
//! services they need, dependency order is honored, and an idle monitor puts
//! unused services back to sleep. The HTTP surface is OpenAI-compatible for
//! inference plus an admin API for lifecycle and catalog control.

pub mod adapters;
pub mod api;
pub mod catalog;
pub mod config;
pub mod lifecycle;
pub mod registry;
pub mod router;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use adapters::{CacheQueueAdapter, LlmRuntimeAdapter, Protocol, VectorStoreAdapter};
use api::{AppState, GatewayApiServer, HttpApiConfig};
use catalog::AssetCatalog;
use config::GatewayConfig;
use lifecycle::process::detect_controller;
use lifecycle::{HttpHealthProber, IdleSettings, LifecycleConfig, ServiceLifecycle};
use registry::ServiceRegistry;
use router::GatewayRouter;
use types::{GatewayResult, CAP_CACHE_QUEUE, CAP_LLM_RUNTIME, CAP_VECTOR_STORE};

/// The assembled gateway: catalog, registry, lifecycle controller, adapters
/// and router, wired together from one [`GatewayConfig`].
pub struct Gateway {
    config: GatewayConfig,
    catalog: Arc<AssetCatalog>,
    registry: Arc<ServiceRegistry>,
    lifecycle: Arc<ServiceLifecycle>,
    router: Arc<GatewayRouter>,
    vector: Arc<VectorStoreAdapter>,
    cache: CacheQueueAdapter,
    started_at: Instant,
}

impl Gateway {
    /// Build every component and start the idle monitor. Catalog problems
    /// are fatal here; unreachable backends are not, they stay asleep until
    /// first use.
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let catalog = Arc::new(AssetCatalog::load(
            &config.persistence.catalog_path,
            &config.persistence.alias_path,
        )?);

        let snapshot = catalog.snapshot();
        let service_names = snapshot.service_names();
        let registry = Arc::new(ServiceRegistry::new(service_names.iter(), |name| {
            snapshot.aliases.services.get(name).cloned()
        }));

        let controller = detect_controller(
            config.backends.docker_api_url.as_deref(),
            config.readiness_timeout(),
        )
        .await?;
        let prober = Arc::new(HttpHealthProber::new(config.probe_timeout()));

        let lifecycle = ServiceLifecycle::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            controller,
            prober,
            LifecycleConfig {
                readiness_timeout: config.readiness_timeout(),
                poll_interval: Duration::from_millis(config.probes.poll_interval_ms),
                max_poll_interval: Duration::from_millis(config.probes.max_poll_interval_ms),
                idle: IdleSettings {
                    enabled: config.idle.enabled,
                    check_interval: Duration::from_secs(config.idle.check_interval_secs),
                    timeout_minutes: config.idle.timeout_minutes,
                },
            },
        );
        lifecycle.spawn_idle_monitor();

        let llm = match snapshot.bound_asset(CAP_LLM_RUNTIME) {
            Some(asset) => LlmRuntimeAdapter::from_asset(
                asset,
                &config.backends.llm_base_url,
                config.backend_timeout(),
            ),
            // no binding declared yet; assume the default local runtime
            None => LlmRuntimeAdapter::new(
                &config.backends.llm_base_url,
                Protocol::Translated,
                "ollama",
                config.backend_timeout(),
            ),
        }
        .with_keep_alive_minutes(config.idle.model_keep_alive_minutes);

        let cache_url = snapshot
            .bound_asset(CAP_CACHE_QUEUE)
            .and_then(|asset| asset.endpoint("api"))
            .unwrap_or(&config.backends.cache_url)
            .to_string();
        let cache = CacheQueueAdapter::connect(cache_url).await;

        let vector_url = snapshot
            .bound_asset(CAP_VECTOR_STORE)
            .and_then(|asset| asset.endpoint("api"))
            .unwrap_or(&config.backends.vector_url)
            .to_string();
        let vector = Arc::new(VectorStoreAdapter::connect(vector_url));
        drop(snapshot);

        let router = Arc::new(GatewayRouter::new(
            Arc::clone(&catalog),
            lifecycle.clone() as Arc<dyn lifecycle::LifecycleController>,
            Arc::new(llm),
            Arc::new(cache.clone()),
        ));

        tracing::info!(
            services = service_names.len(),
            "gateway assembled"
        );

        Ok(Self {
            config,
            catalog,
            registry,
            lifecycle,
            router,
            vector,
            cache,
            started_at: Instant::now(),
        })
    }

    pub fn catalog(&self) -> &Arc<AssetCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<ServiceLifecycle> {
        &self.lifecycle
    }

    pub fn router(&self) -> &Arc<GatewayRouter> {
        &self.router
    }

    pub fn vector_store(&self) -> &Arc<VectorStoreAdapter> {
        &self.vector
    }

    pub fn cache(&self) -> &CacheQueueAdapter {
        &self.cache
    }

    /// Serve the HTTP API until the process exits.
    pub async fn serve(&self) -> GatewayResult<()> {
        let server = GatewayApiServer::new(
            HttpApiConfig {
                bind_address: self.config.server.host.clone(),
                port: self.config.server.port,
                enable_cors: self.config.server.enable_cors,
                enable_tracing: self.config.server.enable_tracing,
            },
            AppState {
                router: Arc::clone(&self.router),
                lifecycle: Arc::clone(&self.lifecycle),
                registry: Arc::clone(&self.registry),
                catalog: Arc::clone(&self.catalog),
                started_at: self.started_at,
            },
        );
        server.start().await
    }

    /// Stop background tasks. The HTTP server stops when the process does.
    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
    }
}
