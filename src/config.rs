//! Gateway configuration
//!
//! Loaded from a TOML file with environment-variable overrides for the
//! settings operators most commonly tune per deployment (backend URLs and
//! idle-sleep behavior).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::CatalogError;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub backends: BackendConfig,
    pub idle: IdleSleepConfig,
    pub probes: ProbeConfig,
    pub persistence: PersistenceConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

/// Fallback base URLs for the bound backends. Asset endpoints declared in
/// the catalog take precedence; these apply when an asset omits one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub llm_base_url: String,
    pub vector_url: String,
    pub cache_url: String,
    /// Docker Engine API address; empty means "use the docker CLI".
    pub docker_api_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434".to_string(),
            vector_url: "http://localhost:6334".to_string(),
            cache_url: "redis://localhost:6379".to_string(),
            docker_api_url: None,
        }
    }
}

/// Idle-sleep behavior. All fields are live-tunable via the admin settings
/// endpoint; this struct is only the startup snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleSleepConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub timeout_minutes: u64,
    /// How long a model stays loaded in the runtime after a request.
    pub model_keep_alive_minutes: u64,
}

impl Default for IdleSleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 600,
            timeout_minutes: 30,
            model_keep_alive_minutes: 10,
        }
    }
}

/// Health probe and readiness polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout for a single health probe request.
    pub probe_timeout_secs: u64,
    /// Overall budget for one service to become ready after a start command.
    pub readiness_timeout_secs: u64,
    /// Initial poll interval; doubles up to `max_poll_interval_ms`.
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    /// Timeout for backend API calls made by the adapters.
    pub backend_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 3,
            readiness_timeout_secs: 60,
            poll_interval_ms: 500,
            max_poll_interval_ms: 5_000,
            backend_timeout_secs: 300,
        }
    }
}

/// Paths of the persisted catalog and alias/registry documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub catalog_path: PathBuf,
    pub alias_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("catalog.json"),
            alias_path: PathBuf::from("aliases.json"),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    /// An explicitly given path must exist and parse; only running without a
    /// path falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| CatalogError::Io {
                    path: p.display().to_string(),
                    message: e.to_string(),
                })?;
                toml::from_str(&raw).map_err(|e| CatalogError::Parse {
                    reason: format!("config file {}: {}", p.display(), e),
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `HUB_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("HUB_LLM_BASE_URL") {
            self.backends.llm_base_url = v;
        }
        if let Ok(v) = env::var("HUB_VECTOR_URL") {
            self.backends.vector_url = v;
        }
        if let Ok(v) = env::var("HUB_CACHE_URL") {
            self.backends.cache_url = v;
        }
        if let Ok(v) = env::var("HUB_DOCKER_API_URL") {
            self.backends.docker_api_url = Some(v);
        }
        if let Ok(v) = env::var("HUB_IDLE_SLEEP_ENABLED") {
            if let Ok(parsed) = v.parse::<bool>() {
                self.idle.enabled = parsed;
            }
        }
        if let Ok(v) = env::var("HUB_IDLE_TIMEOUT_MINUTES") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.idle.timeout_minutes = parsed;
            }
        }
        if let Ok(v) = env::var("HUB_IDLE_CHECK_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.idle.check_interval_secs = parsed;
            }
        }
        if let Ok(v) = env::var("HUB_MODEL_KEEP_ALIVE_MINUTES") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.idle.model_keep_alive_minutes = parsed;
            }
        }
        if let Ok(v) = env::var("HUB_CATALOG_PATH") {
            self.persistence.catalog_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("HUB_ALIAS_PATH") {
            self.persistence.alias_path = PathBuf::from(v);
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probes.probe_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.probes.readiness_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.probes.backend_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = GatewayConfig::default();
        assert!(config.idle.enabled);
        assert_eq!(config.server.port, 8700);
        assert!(config.probes.readiness_timeout_secs > 0);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [server]
            port = 9000

            [idle]
            timeout_minutes = 5
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.idle.timeout_minutes, 5);
        // untouched sections keep defaults
        assert_eq!(config.backends.cache_url, "redis://localhost:6379");
    }

    #[test]
    fn no_config_path_falls_back_to_defaults() {
        let config = GatewayConfig::load(None).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn explicit_missing_config_path_is_fatal() {
        let result = GatewayConfig::load(Some(Path::new("/nonexistent/gateway.toml")));
        assert!(matches!(result, Err(CatalogError::Io { .. })));
    }
}
