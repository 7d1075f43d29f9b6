//! HTTP server wiring for the gateway API

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::routes;
use crate::catalog::AssetCatalog;
use crate::lifecycle::ServiceLifecycle;
use crate::registry::ServiceRegistry;
use crate::router::GatewayRouter;
use crate::types::GatewayError;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_tracing: bool,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8700,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<GatewayRouter>,
    pub lifecycle: Arc<ServiceLifecycle>,
    pub registry: Arc<ServiceRegistry>,
    pub catalog: Arc<AssetCatalog>,
    pub started_at: Instant,
}

/// The gateway's HTTP server.
pub struct GatewayApiServer {
    config: HttpApiConfig,
    state: AppState,
}

impl GatewayApiServer {
    pub fn new(config: HttpApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until the process is shut down.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            GatewayError::Internal(format!("failed to bind to {}: {}", addr, e))
        })?;

        tracing::info!(addr = %addr, "gateway api listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| GatewayError::Internal(format!("server error: {}", e)))
    }

    fn create_router(&self) -> Router {
        let mut router = Router::new()
            .route("/v1/chat/completions", post(routes::chat_completions))
            .route("/v1/embeddings", post(routes::embeddings))
            .route("/v1/models", get(routes::list_models))
            .route("/v1/admin/services/status", get(routes::services_status))
            .route(
                "/v1/admin/services/:name/idle-sleep",
                post(routes::service_action),
            )
            .route(
                "/v1/admin/services/:name/suspend",
                post(routes::suspend_service),
            )
            .route(
                "/v1/admin/services/:name/keep-warm",
                post(routes::keep_warm),
            )
            .route(
                "/v1/admin/services/:name/auto-sleep",
                put(routes::auto_sleep),
            )
            .route(
                "/v1/admin/services/:name/inspect",
                get(routes::inspect_service),
            )
            .route("/v1/admin/health", get(routes::admin_health))
            .route(
                "/v1/admin/settings",
                get(routes::get_settings).put(routes::put_settings),
            )
            .route("/v1/admin/catalog/reload", post(routes::reload_catalog))
            .with_state(self.state.clone());

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }
        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }
}
