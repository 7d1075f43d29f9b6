//! HTTP API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::ChatMessage;
use crate::registry::ServiceStatus;
use crate::router::ModelEntry;

/// Standard error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// OpenAI-compatible chat completion request. `model` is optional; the app
/// policy supplies a default when it is omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    /// OpenAI's caller identifier; used as the app id when no `x-app-id`
    /// header is present.
    #[serde(default)]
    pub user: Option<String>,
}

/// OpenAI-compatible embeddings request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub user: Option<String>,
}

/// OpenAI accepts a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingInput::Single(text) => vec![text],
            EmbeddingInput::Batch(texts) => texts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceActionQuery {
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepWarmRequest {
    #[serde(default)]
    pub minutes: Option<u64>,
}

/// Per-service auto-sleep override. `null` fields clear the override and
/// fall back to the global settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSleepRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceActionResponse {
    pub service: String,
    pub action: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResponse {
    pub service: String,
    pub dependencies: Vec<String>,
    pub consumers: Vec<String>,
    pub capabilities: Vec<String>,
    pub status: Option<ServiceStatus>,
}

/// Global idle-sleep settings, readable and tunable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsBody {
    pub idle_sleep_enabled: bool,
    pub idle_timeout_minutes: u64,
    pub idle_check_interval_secs: u64,
}

/// Partial settings update; omitted fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub idle_sleep_enabled: Option<bool>,
    #[serde(default)]
    pub idle_timeout_minutes: Option<u64>,
    #[serde(default)]
    pub idle_check_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub services: Vec<ServiceStatus>,
    pub system: SystemSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadResponse {
    pub version: u64,
}
