//! HTTP API route handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use std::time::Duration;
use sysinfo::System;

use super::server::AppState;
use super::types::{
    AdminHealthResponse, AutoSleepRequest, ChatCompletionRequest, EmbeddingsRequest,
    ErrorResponse, InspectResponse, KeepWarmRequest, ModelsResponse, ReloadResponse,
    ServiceActionQuery, ServiceActionResponse, SettingsBody, SettingsUpdate,
};
use crate::adapters::{UnifiedChatResult, UnifiedEmbeddingResult};
use crate::catalog::ServiceOverrides;
use crate::lifecycle::{IdleSettings, LifecycleController};
use crate::registry::{ActualState, DesiredState, ServiceStatus};
use crate::router::{error_status, ChatParams};
use crate::types::GatewayError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(error: GatewayError) -> ApiError {
    let (status, code) = error_status(&error);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "bad_request".to_string(),
            details: None,
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
            code: "unknown_service".to_string(),
            details: None,
        }),
    )
}

/// App id resolution: `x-app-id` header, then the OpenAI `user` field, then
/// anonymous (which gets the catalog-wide default policy).
fn resolve_app_id(headers: &HeaderMap, user: Option<&str>) -> String {
    headers
        .get("x-app-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| user.map(str::to_string))
        .unwrap_or_else(|| "anonymous".to_string())
}

// ── OpenAI-compatible surface ──────────────────────────────────────────

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<UnifiedChatResult>, ApiError> {
    if request.stream == Some(true) {
        return Err(bad_request("streaming responses are not supported"));
    }
    if request.messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }
    let app_id = resolve_app_id(&headers, request.user.as_deref());
    let params = ChatParams {
        model: request.model,
        messages: request.messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    };
    state
        .router
        .chat(&app_id, params)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn embeddings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Json<UnifiedEmbeddingResult>, ApiError> {
    let app_id = resolve_app_id(&headers, request.user.as_deref());
    let texts = request.input.into_vec();
    if texts.is_empty() {
        return Err(bad_request("input must not be empty"));
    }
    state
        .router
        .embeddings(&app_id, request.model.as_deref(), &texts)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state.router.list_models().await;
    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}

// ── Admin surface ──────────────────────────────────────────────────────

pub async fn services_status(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    Json(state.registry.snapshot())
}

pub async fn service_action(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<ServiceActionQuery>,
) -> Result<Json<ServiceActionResponse>, ApiError> {
    let result = match query.action.as_str() {
        "start" => state.lifecycle.start_service(&service).await,
        "stop" => state.lifecycle.stop_service(&service).await,
        "restart" => state.lifecycle.restart_service(&service).await,
        other => return Err(bad_request(format!("unknown action '{}'", other))),
    };
    result.map_err(|e| reject(e.into()))?;
    Ok(Json(ServiceActionResponse {
        service,
        action: query.action,
        status: "ok".to_string(),
    }))
}

pub async fn suspend_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceActionResponse>, ApiError> {
    state
        .lifecycle
        .stop_service(&service)
        .await
        .map_err(|e| reject(e.into()))?;
    Ok(Json(ServiceActionResponse {
        service,
        action: "suspend".to_string(),
        status: "ok".to_string(),
    }))
}

fn keep_warm_window(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

pub async fn keep_warm(
    State(state): State<AppState>,
    Path(service): Path<String>,
    request: Option<Json<KeepWarmRequest>>,
) -> Result<Json<ServiceActionResponse>, ApiError> {
    let minutes = request.and_then(|Json(r)| r.minutes).unwrap_or(30);
    state
        .lifecycle
        .keep_warm(&service, keep_warm_window(minutes))
        .await
        .map_err(|e| reject(e.into()))?;
    Ok(Json(ServiceActionResponse {
        service,
        action: format!("keep-warm:{}m", minutes),
        status: "ok".to_string(),
    }))
}

pub async fn auto_sleep(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(request): Json<AutoSleepRequest>,
) -> Result<Json<ServiceStatus>, ApiError> {
    if !state.registry.contains(&service) {
        return Err(not_found(format!("unknown service '{}'", service)));
    }
    state
        .registry
        .set_idle_sleep(&service, request.enabled, request.timeout_minutes);
    state
        .catalog
        .save_service_overrides(
            &service,
            ServiceOverrides {
                idle_sleep_enabled: request.enabled,
                idle_timeout_minutes: request.timeout_minutes,
            },
        )
        .await
        .map_err(|e| reject(e.into()))?;
    state
        .registry
        .status(&service)
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown service '{}'", service)))
}

pub async fn inspect_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<InspectResponse>, ApiError> {
    let snapshot = state.catalog.snapshot();
    if !snapshot.graph.contains(&service) {
        return Err(not_found(format!("unknown service '{}'", service)));
    }
    let capabilities: Vec<String> = snapshot
        .document
        .bindings
        .iter()
        .filter(|(_, asset_id)| **asset_id == service)
        .map(|(capability, _)| capability.clone())
        .collect();
    Ok(Json(InspectResponse {
        dependencies: snapshot.graph.dependencies_of(&service).to_vec(),
        consumers: snapshot.graph.consumers_of(&service),
        capabilities,
        status: state.registry.status(&service),
        service,
    }))
}

/// CPU and memory snapshot. CPU usage needs two samples a short interval
/// apart; a single refresh reports a meaningless since-boot figure.
async fn system_snapshot() -> super::types::SystemSnapshot {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu();
    super::types::SystemSnapshot {
        cpu_percent: system.global_cpu_info().cpu_usage(),
        memory_used_mb: system.used_memory() / (1024 * 1024),
        memory_total_mb: system.total_memory() / (1024 * 1024),
    }
}

pub async fn admin_health(State(state): State<AppState>) -> Json<AdminHealthResponse> {
    let services = state.registry.snapshot();

    let system = system_snapshot().await;
    let memory_total_mb = system.memory_total_mb;
    let memory_used_mb = system.memory_used_mb;
    let cpu_percent = system.cpu_percent;

    let degraded = services
        .iter()
        .any(|s| s.desired == DesiredState::On && s.actual != ActualState::Running);
    let memory_pressure =
        memory_total_mb > 0 && memory_used_mb * 100 / memory_total_mb > 90;
    let status = if degraded {
        "degraded"
    } else if memory_pressure || cpu_percent > 90.0 {
        "warning"
    } else {
        "healthy"
    };

    Json(AdminHealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
        system,
    })
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsBody> {
    let settings = state.lifecycle.idle_settings();
    Json(SettingsBody {
        idle_sleep_enabled: settings.enabled,
        idle_timeout_minutes: settings.timeout_minutes,
        idle_check_interval_secs: settings.check_interval.as_secs(),
    })
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SettingsBody> {
    let current = state.lifecycle.idle_settings();
    let settings = IdleSettings {
        enabled: update.idle_sleep_enabled.unwrap_or(current.enabled),
        timeout_minutes: update
            .idle_timeout_minutes
            .unwrap_or(current.timeout_minutes),
        check_interval: update
            .idle_check_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(current.check_interval),
    };
    state.lifecycle.set_idle_settings(settings);
    Json(SettingsBody {
        idle_sleep_enabled: settings.enabled,
        idle_timeout_minutes: settings.timeout_minutes,
        idle_check_interval_secs: settings.check_interval.as_secs(),
    })
}

pub async fn reload_catalog(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let version = state
        .catalog
        .reload()
        .await
        .map_err(|e| reject(e.into()))?;
    Ok(Json(ReloadResponse { version }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_prefers_header_over_user_field() {
        let mut headers = HeaderMap::new();
        headers.insert("x-app-id", "contract-app".parse().unwrap());
        assert_eq!(resolve_app_id(&headers, Some("someone")), "contract-app");
        assert_eq!(resolve_app_id(&HeaderMap::new(), Some("someone")), "someone");
        assert_eq!(resolve_app_id(&HeaderMap::new(), None), "anonymous");
    }

    #[test]
    fn keep_warm_window_saturates_on_absurd_input() {
        assert_eq!(keep_warm_window(30), Duration::from_secs(1800));
        assert_eq!(keep_warm_window(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn cpu_snapshot_reports_a_bounded_percentage() {
        let snapshot = system_snapshot().await;
        assert!(snapshot.cpu_percent.is_finite());
        assert!(snapshot.cpu_percent >= 0.0);
        assert!(snapshot.memory_total_mb >= snapshot.memory_used_mb);
    }
}
