//! LLM runtime adapter
//!
//! Binds to the single asset fulfilling the `llm-runtime` capability and
//! exposes one provider-agnostic contract. The protocol strategy is fixed at
//! construction: a backend that speaks the OpenAI dialect is passed through
//! (tagged with provenance), a backend with a native dialect is translated
//! and its responses synthesized into the same unified shape, so callers
//! never branch on provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::catalog::Asset;
use crate::types::AdapterError;

/// One chat message in OpenAI shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Normalized chat request handed to the adapter by the router.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// Token accounting; zeroed when the backend reports no counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Unified chat result. Serializes to an OpenAI-compatible body plus the
/// `provider` provenance tag and the adapter-measured latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedChatResult {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub provider: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub object: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

/// Unified embeddings result, same shape discipline as chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEmbeddingResult {
    pub object: String,
    pub model: String,
    pub provider: String,
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Protocol strategy, decided once from the asset's `adapter_required` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Backend speaks the OpenAI dialect; payloads pass through.
    Native,
    /// Backend speaks its own dialect; requests and responses are translated.
    Translated,
}

/// Provider-agnostic LLM runtime contract.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<UnifiedChatResult, AdapterError>;

    async fn embeddings(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<UnifiedEmbeddingResult, AdapterError>;

    /// Live model listing from the backend (tags / process list).
    async fn list_models(&self) -> Result<Vec<String>, AdapterError>;

    /// Provider id used for alias resolution and provenance tagging.
    fn provider(&self) -> &str;
}

/// Adapter bound to one concrete LLM runtime backend.
pub struct LlmRuntimeAdapter {
    client: reqwest::Client,
    base_url: String,
    protocol: Protocol,
    provider: String,
    /// How long the backend should keep a model loaded after a request
    /// (translated dialect only).
    keep_alive_minutes: Option<u64>,
}

impl LlmRuntimeAdapter {
    pub fn new(
        base_url: impl Into<String>,
        protocol: Protocol,
        provider: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            protocol,
            provider: provider.into(),
            keep_alive_minutes: None,
        }
    }

    pub fn with_keep_alive_minutes(mut self, minutes: u64) -> Self {
        self.keep_alive_minutes = Some(minutes);
        self
    }

    /// Bind to the asset fulfilling `llm-runtime`, falling back to the
    /// configured base URL when the asset omits an `api` endpoint.
    pub fn from_asset(asset: &Asset, fallback_url: &str, timeout: Duration) -> Self {
        let base_url = asset.endpoint("api").unwrap_or(fallback_url);
        let protocol = if asset.adapter_required {
            Protocol::Translated
        } else {
            Protocol::Native
        };
        Self::new(base_url, protocol, asset.asset_id.clone(), timeout)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::Transport {
                message: format!("POST {}: {}", url, e),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| AdapterError::InvalidResponse {
            reason: format!("unparseable response from {}: {}", url, e),
        })
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| AdapterError::Transport {
                    message: format!("GET {}: {}", url, e),
                })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| AdapterError::InvalidResponse {
            reason: format!("unparseable response from {}: {}", url, e),
        })
    }
}

#[async_trait]
impl LlmRuntime for LlmRuntimeAdapter {
    async fn chat(&self, request: &ChatRequest) -> Result<UnifiedChatResult, AdapterError> {
        let start = Instant::now();
        let result = match self.protocol {
            Protocol::Native => {
                let body = serde_json::json!({
                    "model": request.model,
                    "messages": request.messages,
                    "temperature": request.temperature,
                    "max_tokens": request.max_tokens,
                    "stream": false,
                });
                let raw = self.post_json("/v1/chat/completions", &body).await?;
                passthrough_chat(&self.provider, raw)
            }
            Protocol::Translated => {
                let mut options = serde_json::Map::new();
                if let Some(temperature) = request.temperature {
                    options.insert("temperature".into(), temperature.into());
                }
                if let Some(max_tokens) = request.max_tokens {
                    options.insert("num_predict".into(), max_tokens.into());
                }
                let mut body = serde_json::json!({
                    "model": request.model,
                    "messages": request.messages,
                    "stream": false,
                    "options": options,
                });
                if let Some(minutes) = self.keep_alive_minutes {
                    body["keep_alive"] = serde_json::json!(format!("{}m", minutes));
                }
                let raw = self.post_json("/api/chat", &body).await?;
                translate_chat(&request.model, &self.provider, &raw)
            }
        };
        let mut unified = result?;
        unified.latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            provider = %self.provider,
            model = %unified.model,
            latency_ms = unified.latency_ms,
            total_tokens = unified.usage.total_tokens,
            "chat completion"
        );
        Ok(unified)
    }

    async fn embeddings(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<UnifiedEmbeddingResult, AdapterError> {
        let start = Instant::now();
        let result = match self.protocol {
            Protocol::Native => {
                let body = serde_json::json!({ "model": model, "input": texts });
                let raw = self.post_json("/v1/embeddings", &body).await?;
                passthrough_embeddings(&self.provider, raw)
            }
            Protocol::Translated => {
                let mut body = serde_json::json!({ "model": model, "input": texts });
                if let Some(minutes) = self.keep_alive_minutes {
                    body["keep_alive"] = serde_json::json!(format!("{}m", minutes));
                }
                let raw = self.post_json("/api/embed", &body).await?;
                translate_embeddings(model, &self.provider, &raw)
            }
        };
        let mut unified = result?;
        unified.latency_ms = start.elapsed().as_millis() as u64;
        Ok(unified)
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        match self.protocol {
            Protocol::Native => {
                let raw = self.get_json("/v1/models").await?;
                Ok(raw
                    .pointer("/data")
                    .and_then(|d| d.as_array())
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|e| e.get("id").and_then(|v| v.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default())
            }
            Protocol::Translated => {
                let raw = self.get_json("/api/tags").await?;
                Ok(raw
                    .pointer("/models")
                    .and_then(|d| d.as_array())
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|e| e.get("name").and_then(|v| v.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default())
            }
        }
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Synthesize a deterministic-format completion id for translated backends.
fn synthesize_id(model: &str, created: i64) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(format!("{}:{}", model, created));
    format!("chatcmpl-{}", &hex::encode(digest)[..16])
}

/// Pass an OpenAI-dialect chat response through, tagging provenance only.
fn passthrough_chat(
    provider: &str,
    mut raw: serde_json::Value,
) -> Result<UnifiedChatResult, AdapterError> {
    if let Some(object) = raw.as_object_mut() {
        object.insert("provider".into(), provider.into());
    }
    serde_json::from_value(raw).map_err(|e| AdapterError::InvalidResponse {
        reason: format!("backend chat response missing required fields: {}", e),
    })
}

/// Synthesize an OpenAI-compatible result from a native (Ollama-dialect)
/// chat response. Token counts come from the backend's own counters when
/// present, 0 otherwise.
pub fn translate_chat(
    model: &str,
    provider: &str,
    raw: &serde_json::Value,
) -> Result<UnifiedChatResult, AdapterError> {
    let content = raw
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .or_else(|| raw.pointer("/response").and_then(|v| v.as_str()))
        .ok_or_else(|| AdapterError::InvalidResponse {
            reason: "backend chat response carries no message content".to_string(),
        })?;
    let prompt_tokens = raw
        .pointer("/prompt_eval_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let completion_tokens = raw
        .pointer("/eval_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let created = unix_now();

    Ok(UnifiedChatResult {
        id: synthesize_id(model, created),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        provider: provider.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            finish_reason: Some(
                raw.pointer("/done_reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("stop")
                    .to_string(),
            ),
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
        latency_ms: 0,
    })
}

fn passthrough_embeddings(
    provider: &str,
    mut raw: serde_json::Value,
) -> Result<UnifiedEmbeddingResult, AdapterError> {
    if let Some(object) = raw.as_object_mut() {
        object.insert("provider".into(), provider.into());
    }
    serde_json::from_value(raw).map_err(|e| AdapterError::InvalidResponse {
        reason: format!("backend embedding response missing required fields: {}", e),
    })
}

/// Synthesize an OpenAI-compatible embeddings result from a native response.
pub fn translate_embeddings(
    model: &str,
    provider: &str,
    raw: &serde_json::Value,
) -> Result<UnifiedEmbeddingResult, AdapterError> {
    let vectors = raw
        .pointer("/embeddings")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AdapterError::InvalidResponse {
            reason: "backend embedding response carries no embeddings array".to_string(),
        })?;
    let data = vectors
        .iter()
        .enumerate()
        .map(|(index, vector)| EmbeddingData {
            object: "embedding".to_string(),
            index: index as u32,
            embedding: vector
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .map(|v| v as f32)
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();
    let prompt_tokens = raw
        .pointer("/prompt_eval_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    Ok(UnifiedEmbeddingResult {
        object: "list".to_string(),
        model: model.to_string(),
        provider: provider.to_string(),
        data,
        usage: Usage {
            prompt_tokens,
            completion_tokens: 0,
            total_tokens: prompt_tokens,
        },
        latency_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama_chat_response() -> serde_json::Value {
        serde_json::json!({
            "model": "llama3.2:3b",
            "created_at": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "hello there"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 7
        })
    }

    fn openai_chat_response() -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-abc123",
            "object": "chat.completion",
            "created": 1735689600,
            "model": "llama3.2:3b",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })
    }

    #[test]
    fn translated_and_passthrough_paths_share_one_shape() {
        let translated = translate_chat("llama3.2:3b", "ollama", &ollama_chat_response()).unwrap();
        let passthrough = passthrough_chat("vllm", openai_chat_response()).unwrap();

        for result in [&translated, &passthrough] {
            assert_eq!(result.object, "chat.completion");
            assert_eq!(result.choices.len(), 1);
            assert_eq!(result.choices[0].message.role, "assistant");
            assert_eq!(result.choices[0].message.content, "hello there");
            assert_eq!(result.usage.total_tokens, 19);
            assert!(!result.id.is_empty());
            assert!(result.created > 0);
        }
        assert_eq!(translated.provider, "ollama");
        assert_eq!(passthrough.provider, "vllm");
    }

    #[test]
    fn translated_chat_defaults_missing_counters_to_zero() {
        let raw = serde_json::json!({
            "message": {"role": "assistant", "content": "ok"}
        });
        let result = translate_chat("m", "ollama", &raw).unwrap();
        assert_eq!(result.usage.total_tokens, 0);
        assert_eq!(result.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn translated_chat_without_content_is_invalid() {
        let raw = serde_json::json!({"done": true});
        let result = translate_chat("m", "ollama", &raw);
        assert!(matches!(result, Err(AdapterError::InvalidResponse { .. })));
    }

    #[test]
    fn translates_embeddings_with_indices() {
        let raw = serde_json::json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]],
            "prompt_eval_count": 9
        });
        let result = translate_embeddings("nomic-embed-text", "ollama", &raw).unwrap();
        assert_eq!(result.object, "list");
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.data[1].index, 1);
        assert_eq!(result.data[1].embedding, vec![0.3, 0.4]);
        assert_eq!(result.usage.prompt_tokens, 9);
    }

    #[test]
    fn protocol_is_derived_from_adapter_required() {
        let asset: Asset = serde_json::from_value(serde_json::json!({
            "asset_id": "ollama",
            "class": "service",
            "adapter_required": true,
            "endpoints": {"api": "http://localhost:11434/"}
        }))
        .unwrap();
        let adapter =
            LlmRuntimeAdapter::from_asset(&asset, "http://fallback", Duration::from_secs(5));
        assert_eq!(adapter.protocol, Protocol::Translated);
        assert_eq!(adapter.base_url, "http://localhost:11434");
        assert_eq!(adapter.provider(), "ollama");
    }
}
