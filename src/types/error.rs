//! Error types for the gateway
//!
//! Every subsystem owns its own error enum; the top-level [`GatewayError`]
//! rolls them up so the HTTP layer can make one consistent status decision.

use thiserror::Error;

use super::{AppId, Capability, ServiceName};

/// Main gateway error type
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Process control error: {0}")]
    Process(#[from] ProcessError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Asset catalog errors. Load-time failures are fatal: a malformed catalog
/// must never silently degrade to "no backends".
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse catalog: {reason}")]
    Parse { reason: String },

    #[error("Invalid catalog: {reason}")]
    Invalid { reason: String },

    #[error("Duplicate asset id: {asset_id}")]
    DuplicateAsset { asset_id: String },

    #[error("Asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    #[error("No asset bound for capability: {capability}")]
    BindingNotFound { capability: Capability },

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    #[error("Dependency cycle detected involving service '{service}'")]
    CycleDetected { service: ServiceName },
}

/// Policy violations. Always a 4xx rejection, never a silent substitution.
#[derive(Error, Debug, Clone)]
pub enum PolicyError {
    #[error("Model '{model}' is not allowed for app '{app_id}'")]
    ModelNotAllowed { app_id: AppId, model: String },

    #[error("Embedding model '{model}' is not allowed for app '{app_id}'")]
    EmbeddingNotAllowed { app_id: AppId, model: String },

    #[error("No model requested and no default model configured for app '{app_id}'")]
    NoDefaultModel { app_id: AppId },
}

/// Service lifecycle errors. The variants are deliberately distinguishable so
/// callers can tell a dependency failure from a target failure from a probe
/// that never turned healthy.
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    #[error("Failed to start dependency '{dependency}' of '{target}': {reason}")]
    DependencyStartFailed {
        target: ServiceName,
        dependency: ServiceName,
        reason: String,
    },

    #[error("Failed to start service '{service}': {reason}")]
    TargetStartFailed { service: ServiceName, reason: String },

    #[error("Service '{service}' did not become ready within {waited_secs}s")]
    ReadinessTimeout {
        service: ServiceName,
        waited_secs: u64,
    },

    #[error("Unknown service: {service}")]
    UnknownService { service: ServiceName },

    #[error("Failed to stop service '{service}': {reason}")]
    StopFailed { service: ServiceName, reason: String },

    #[error("Lifecycle controller is shutting down")]
    ShuttingDown,
}

/// Process controller errors (container start/stop/inspect).
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Command failed for container '{container}': {reason}")]
    CommandFailed { container: String, reason: String },

    #[error("Command timed out for container '{container}' after {seconds}s")]
    Timeout { container: String, seconds: u64 },

    #[error("No usable process controller: {reason}")]
    ControllerUnavailable { reason: String },
}

/// Adapter errors, tagged so the router can map them to HTTP statuses.
/// `Upstream` carries the backend's own status and body; `Transport` is a
/// network-level failure and must never be conflated with it.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("Backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Backend response could not be interpreted: {reason}")]
    InvalidResponse { reason: String },

    #[error("Adapter is not initialized")]
    NotInitialized,
}

/// Result alias used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;
