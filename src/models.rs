//! Decoded payloads for the native route, chat completions and legacy
//! completions families, plus the model catalogue and service status

use crate::types::{Message, Role, ToolCallDelta, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// Routing details the native route reports about its decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// Cost of the call in US dollars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// End-to-end latency measured by the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Model that actually served the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_model: Option<String>,
    /// Provider that actually served the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_provider: Option<String>,
    /// Service tier used upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
}

impl RoutingMetadata {
    /// Whether the router reported nothing at all
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Object type
    #[serde(default = "chat_completion_object")]
    pub object: String,
    /// Unix timestamp of creation
    #[serde(default)]
    pub created: i64,
    /// Model reported by the service
    pub model: String,
    /// Choices in order
    pub choices: Vec<ChatChoice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Backend configuration fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

fn chat_completion_object() -> String {
    "chat.completion".to_string()
}

impl ChatCompletion {
    /// Text of the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.text())
    }

    /// Creation time
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }
}

/// Choice in a chat completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Generated message
    pub message: Message,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Log probabilities, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// Native route response: a chat completion plus routing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCompletion {
    /// OpenAI-compatible part of the payload
    #[serde(flatten)]
    pub completion: ChatCompletion,
    /// Routing decision details
    #[serde(flatten)]
    pub routing: RoutingMetadata,
}

impl RouteCompletion {
    /// Model that served the request
    pub fn routed_model(&self) -> Option<&str> {
        self.routing.routed_model.as_deref()
    }

    /// Cost in US dollars
    pub fn cost_usd(&self) -> Option<f64> {
        self.routing.cost_usd
    }
}

impl Deref for RouteCompletion {
    type Target = ChatCompletion;

    fn deref(&self) -> &Self::Target {
        &self.completion
    }
}

/// Streaming chat completion chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Object type
    #[serde(default = "chat_chunk_object")]
    pub object: String,
    /// Unix timestamp of creation
    #[serde(default)]
    pub created: i64,
    /// Model reported by the service
    #[serde(default)]
    pub model: String,
    /// Incremental choices
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage (typically on the last chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Backend configuration fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

fn chat_chunk_object() -> String {
    "chat.completion.chunk".to_string()
}

impl ChatCompletionChunk {
    /// Content fragment of the first choice
    pub fn delta_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }

    /// Whether any choice carries a finish reason
    pub fn is_finished(&self) -> bool {
        self.choices.iter().any(|c| c.finish_reason.is_some())
    }
}

/// Choice in a stream chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Incremental message fragment
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Finish reason (last chunk of the choice)
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role (only in first chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool call fragments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    /// Refusal fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

/// Native route stream chunk; routing metadata usually rides on the last one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChunk {
    /// OpenAI-compatible part of the chunk
    #[serde(flatten)]
    pub chunk: ChatCompletionChunk,
    /// Routing decision details, when present
    #[serde(flatten)]
    pub routing: RoutingMetadata,
}

impl Deref for RouteChunk {
    type Target = ChatCompletionChunk;

    fn deref(&self) -> &Self::Target {
        &self.chunk
    }
}

/// Legacy completion result, kept in the provider's raw shape
///
/// Read it by key: `completion["choices"][0]["text"]`.
pub type TextCompletion = serde_json::Value;

/// Streaming legacy completion chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCompletionChunk {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Object type
    #[serde(default = "text_completion_object")]
    pub object: String,
    /// Unix timestamp of creation
    #[serde(default)]
    pub created: i64,
    /// Model reported by the service
    #[serde(default)]
    pub model: String,
    /// Incremental choices
    #[serde(default)]
    pub choices: Vec<TextChunkChoice>,
    /// Usage (typically on the last chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn text_completion_object() -> String {
    "text_completion".to_string()
}

impl TextCompletionChunk {
    /// Text fragment of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.text.as_str())
    }

    /// Whether any choice carries a finish reason
    pub fn is_finished(&self) -> bool {
        self.choices.iter().any(|c| c.finish_reason.is_some())
    }
}

/// Choice in a legacy completion chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunkChoice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Text fragment
    #[serde(default)]
    pub text: String,
    /// Finish reason (last chunk of the choice)
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Log probabilities, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// A model the service can route to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModelRecord")]
pub struct Model {
    /// Model identifier
    pub id: String,
    /// Display name, the id when the service gives none
    pub name: String,
    /// Provider serving the model, `unknown` when not reported
    pub provider: String,
    /// Advertised capabilities
    pub capabilities: Vec<String>,
    /// Context window in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    /// Output token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    /// Input price per 1k tokens in US dollars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_cost_per_1k: Option<f64>,
    /// Output price per 1k tokens in US dollars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cost_per_1k: Option<f64>,
}

#[derive(Deserialize)]
struct ModelRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    context_window: Option<u64>,
    #[serde(default)]
    max_output_tokens: Option<u64>,
    #[serde(default)]
    input_cost_per_1k: Option<f64>,
    #[serde(default)]
    output_cost_per_1k: Option<f64>,
}

impl From<ModelRecord> for Model {
    fn from(record: ModelRecord) -> Self {
        Self {
            name: record.name.unwrap_or_else(|| record.id.clone()),
            provider: record
                .provider
                .or(record.owned_by)
                .unwrap_or_else(|| "unknown".to_string()),
            id: record.id,
            capabilities: record.capabilities,
            context_window: record.context_window,
            max_output_tokens: record.max_output_tokens,
            input_cost_per_1k: record.input_cost_per_1k,
            output_cost_per_1k: record.output_cost_per_1k,
        }
    }
}

/// Model listing in either the OpenAI `data` shape or the native `models` shape
#[derive(Debug, Deserialize)]
pub(crate) struct ModelListing {
    #[serde(default)]
    data: Option<Vec<Model>>,
    #[serde(default)]
    models: Vec<Model>,
}

impl ModelListing {
    pub(crate) fn into_models(self) -> Vec<Model> {
        self.data.unwrap_or(self.models)
    }
}

/// Cost per 1k tokens, keyed by model
pub type ModelCosts = BTreeMap<String, f64>;

/// Health report of the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status, typically `healthy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Everything else the service reports
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    /// Whether the service reports itself healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_deref(), Some("healthy" | "ok"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_completion_from_json() {
        let data = json!({
            "id": "chat-123",
            "object": "chat.completion",
            "created": 1234567890,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Test response"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30},
            "cost_usd": 0.001,
            "latency_ms": 250
        });

        let completion: ChatCompletion = serde_json::from_value(data.clone()).unwrap();
        assert_eq!(completion.id, "chat-123");
        assert_eq!(completion.content(), Some("Test response"));
        assert_eq!(completion.usage.unwrap().total_tokens, 30);
        assert_eq!(
            completion.created_at().unwrap().timestamp(),
            1234567890
        );

        let routed: RouteCompletion = serde_json::from_value(data).unwrap();
        assert_eq!(routed.cost_usd(), Some(0.001));
        assert_eq!(routed.routing.latency_ms, Some(250.0));
        assert_eq!(routed.content(), Some("Test response"));
    }

    #[test]
    fn test_route_completion_without_metadata() {
        let routed: RouteCompletion = serde_json::from_value(json!({
            "model": "auto",
            "choices": []
        }))
        .unwrap();
        assert!(routed.routing.is_empty());
        assert_eq!(routed.object, "chat.completion");
    }

    #[test]
    fn test_chunk_defaults() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"content": "Hel"}}]
        }))
        .unwrap();
        assert_eq!(chunk.delta_content(), Some("Hel"));
        assert!(!chunk.is_finished());
        assert_eq!(chunk.object, "chat.completion.chunk");
    }

    #[test]
    fn test_model_listing_openai_shape() {
        let listing: ModelListing = serde_json::from_value(json!({
            "object": "list",
            "data": [
                {"id": "gpt-4o-mini", "object": "model", "owned_by": "openai"},
                {"id": "local-llama", "object": "model"}
            ]
        }))
        .unwrap();
        let models = listing.into_models();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gpt-4o-mini");
        assert_eq!(models[0].provider, "openai");
        assert_eq!(models[1].provider, "unknown");
        assert!(models[1].capabilities.is_empty());
    }

    #[test]
    fn test_model_listing_native_shape() {
        let listing: ModelListing = serde_json::from_value(json!({
            "models": [{
                "id": "claude-3-5-haiku",
                "name": "Claude 3.5 Haiku",
                "provider": "anthropic",
                "capabilities": ["chat", "tools"],
                "context_window": 200000,
                "input_cost_per_1k": 0.0008
            }]
        }))
        .unwrap();
        let models = listing.into_models();

        assert_eq!(models[0].name, "Claude 3.5 Haiku");
        assert_eq!(models[0].context_window, Some(200000));
        assert_eq!(models[0].input_cost_per_1k, Some(0.0008));
        assert_eq!(models[0].max_output_tokens, None);

        let empty: ModelListing = serde_json::from_value(json!({})).unwrap();
        assert!(empty.into_models().is_empty());
    }

    #[test]
    fn test_malformed_model_entry_is_rejected() {
        let result = serde_json::from_value::<ModelListing>(json!({"data": [{"owned_by": "openai"}]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_health_status() {
        let health: HealthStatus =
            serde_json::from_value(json!({"status": "healthy", "version": "1.2.0"})).unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.details["version"], "1.2.0");

        let health: HealthStatus = serde_json::from_value(json!({"status": "degraded"})).unwrap();
        assert!(!health.is_healthy());
    }
}
