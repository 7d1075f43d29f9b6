//! Catalog document types: assets, policies, bindings and model aliases

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Capability, ServiceName};

/// Class of a declared asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// A managed backend service (container-controlled, health-probed).
    Service,
    /// A policy-governed calling application.
    App,
}

/// Process-control metadata for service assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Container name used for start/stop commands. Defaults to the asset id.
    #[serde(default)]
    pub container: Option<String>,
    /// Services that must be running before this one starts.
    #[serde(default)]
    pub depends_on: Vec<ServiceName>,
}

/// Per-app policy: which models the app may use and its defaults.
/// An empty allow list means the app is unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppPolicy {
    pub allowed_models: Vec<String>,
    pub allowed_embeddings: Vec<String>,
    pub default_model: Option<String>,
    pub default_embedding: Option<String>,
    pub temperature: Option<f32>,
}

impl AppPolicy {
    /// Fill unset fields from the catalog-wide defaults.
    pub fn merged_with(mut self, defaults: &AppPolicy) -> AppPolicy {
        if self.allowed_models.is_empty() {
            self.allowed_models = defaults.allowed_models.clone();
        }
        if self.allowed_embeddings.is_empty() {
            self.allowed_embeddings = defaults.allowed_embeddings.clone();
        }
        if self.default_model.is_none() {
            self.default_model = defaults.default_model.clone();
        }
        if self.default_embedding.is_none() {
            self.default_embedding = defaults.default_embedding.clone();
        }
        if self.temperature.is_none() {
            self.temperature = defaults.temperature;
        }
        self
    }

    /// Whether `model` passes this policy's chat allow list.
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }

    /// Whether `model` passes this policy's embedding allow list.
    pub fn allows_embedding(&self, model: &str) -> bool {
        self.allowed_embeddings.is_empty() || self.allowed_embeddings.iter().any(|m| m == model)
    }
}

/// A declared backend or application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub class: AssetClass,
    /// Capability this asset implements (services only).
    #[serde(default)]
    pub interface: Option<Capability>,
    /// Named URL map, e.g. `{"api": "...", "health": "..."}`.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Whether calling this backend requires protocol translation.
    #[serde(default)]
    pub adapter_required: bool,
    /// App policy (apps only).
    #[serde(default)]
    pub policy: Option<AppPolicy>,
    #[serde(default)]
    pub runtime: Option<RuntimeSpec>,
}

impl Asset {
    /// Container name used for process control.
    pub fn container_name(&self) -> String {
        self.runtime
            .as_ref()
            .and_then(|r| r.container.clone())
            .unwrap_or_else(|| self.asset_id.clone())
    }

    /// Declared dependencies (empty for apps and standalone services).
    pub fn depends_on(&self) -> &[ServiceName] {
        self.runtime
            .as_ref()
            .map(|r| r.depends_on.as_slice())
            .unwrap_or(&[])
    }

    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.endpoints.get(name).map(|s| s.as_str())
    }
}

/// The persisted catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDocument {
    /// Monotonic document version, bumped on every administrative mutation.
    pub version: u64,
    pub assets: Vec<Asset>,
    /// Capability name → asset id. Exactly one asset per capability.
    pub bindings: HashMap<Capability, String>,
    /// Catalog-wide policy defaults, used for unknown apps and as fallback.
    pub defaults: AppPolicy,
    /// Total startup order; must cover every service and be consistent with
    /// all declared dependencies.
    pub startup_order: Vec<ServiceName>,
}

/// The persisted alias/registry document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasDocument {
    /// Logical model name → provider → physical model id.
    pub aliases: HashMap<String, HashMap<String, String>>,
    /// Persisted per-service idle-sleep overrides.
    pub services: HashMap<ServiceName, ServiceOverrides>,
}

/// Per-service registry overrides that survive restarts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverrides {
    pub idle_sleep_enabled: Option<bool>,
    pub idle_timeout_minutes: Option<u64>,
}
