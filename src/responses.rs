//! Responses API payloads and streaming events

use crate::error::{Error, Result};
use crate::types::ToolCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Response identifier, used for continuation
    pub id: String,
    /// Object type
    #[serde(default = "response_object")]
    pub object: String,
    /// Unix timestamp of creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Model reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `queued`, `in_progress`, `completed`, `failed`, `cancelled`, `incomplete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Output items in order
    #[serde(default)]
    pub output: Vec<OutputItem>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    /// Instructions the response was generated with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Response this one continues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Error details for failed responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Why the response is incomplete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<Value>,
    /// Aggregated output text, when the service provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
}

fn response_object() -> String {
    "response".to_string()
}

impl Response {
    /// Aggregated output text
    ///
    /// Uses the service's `output_text` when present, otherwise joins the
    /// `output_text` parts of every message item.
    pub fn text(&self) -> String {
        if let Some(text) = &self.output_text {
            return text.clone();
        }
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|part| part.content_type == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    /// Function calls requested by the model
    pub fn function_calls(&self) -> impl Iterator<Item = &OutputItem> {
        self.output
            .iter()
            .filter(|item| item.item_type == "function_call")
    }

    /// Creation time
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

/// Output item of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Item type (`message`, `function_call`, `reasoning`, ...)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender role for message items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Item status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Content parts for message items
    #[serde(default)]
    pub content: Vec<OutputContent>,
    /// Tool calls attached to the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Call identifier for function call items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function call items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON arguments for function call items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content part of an output item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContent {
    /// Part type (`output_text`, `refusal`, ...)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text for text parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Refusal message for refusal parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Citations and similar annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Value>>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token usage for a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
    /// Input breakdown (cached tokens, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens_details: Option<Value>,
    /// Output breakdown (reasoning tokens, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens_details: Option<Value>,
}

/// Result of deleting a stored response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDeleted {
    /// Deleted response identifier
    pub id: String,
    /// Object type
    #[serde(default = "response_deleted_object")]
    pub object: String,
    /// Whether the deletion happened
    pub deleted: bool,
}

fn response_deleted_object() -> String {
    "response.deleted".to_string()
}

/// Page of input items of a stored response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItemsList {
    /// Object type
    #[serde(default = "list_object")]
    pub object: String,
    /// Input items as stored by the service
    pub data: Vec<Value>,
    /// First item identifier on this page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_id: Option<String>,
    /// Last item identifier on this page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
    /// Whether more pages follow
    #[serde(default)]
    pub has_more: bool,
}

fn list_object() -> String {
    "list".to_string()
}

/// Pagination for [`InputItemsList`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputItemsQuery {
    /// Return items after this identifier
    pub after: Option<String>,
    /// Return items before this identifier
    pub before: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// `asc` or `desc`
    pub order: Option<String>,
}

impl InputItemsQuery {
    /// Start after `id`
    pub fn with_after(mut self, id: impl Into<String>) -> Self {
        self.after = Some(id.into());
        self
    }

    /// Stop before `id`
    pub fn with_before(mut self, id: impl Into<String>) -> Self {
        self.before = Some(id.into());
        self
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort order
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub(crate) fn apply(&self, url: &mut url::Url) {
        let limit = self.limit.map(|l| l.to_string());
        let pairs = [
            ("after", self.after.as_deref()),
            ("before", self.before.as_deref()),
            ("limit", limit.as_deref()),
            ("order", self.order.as_deref()),
        ];
        if pairs.iter().all(|(_, v)| v.is_none()) {
            return;
        }
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }
    }
}

/// Incremental output carried by a `response.delta` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseDelta {
    /// Partial output items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<OutputItem>>,
}

/// Streaming event of the Responses API, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    /// The response was created
    #[serde(rename = "response.created")]
    Created {
        /// Response snapshot
        response: Response,
    },
    /// Generation is under way
    #[serde(rename = "response.in_progress")]
    InProgress {
        /// Response snapshot
        response: Response,
    },
    /// Incremental output items
    #[serde(rename = "response.delta")]
    Delta {
        /// The increment
        #[serde(default)]
        delta: ResponseDelta,
    },
    /// A new output item started
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// The item
        item: OutputItem,
    },
    /// An output item finished
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// The item
        item: OutputItem,
    },
    /// A content part started
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// Position in the item content
        #[serde(default)]
        content_index: u32,
        /// The part
        part: OutputContent,
    },
    /// A content part finished
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// Position in the item content
        #[serde(default)]
        content_index: u32,
        /// The part
        part: OutputContent,
    },
    /// Text fragment
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// Position in the item content
        #[serde(default)]
        content_index: u32,
        /// The fragment
        delta: String,
    },
    /// Text part complete
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// Position in the item content
        #[serde(default)]
        content_index: u32,
        /// Full text
        text: String,
    },
    /// Function call arguments fragment
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// The fragment
        delta: String,
    },
    /// Function call arguments complete
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Owning item
        #[serde(default)]
        item_id: String,
        /// Position in the output
        #[serde(default)]
        output_index: u32,
        /// Full arguments
        arguments: String,
    },
    /// The response completed
    #[serde(rename = "response.completed")]
    Completed {
        /// Final response
        response: Response,
    },
    /// The response failed
    #[serde(rename = "response.failed")]
    Failed {
        /// Final response
        response: Response,
    },
    /// The response stopped early
    #[serde(rename = "response.incomplete")]
    Incomplete {
        /// Final response
        response: Response,
    },
    /// End of the response envelope
    #[serde(rename = "response.done")]
    Done {
        /// Final response, when attached
        #[serde(default)]
        response: Option<Response>,
    },
    /// Error reported inside the stream
    #[serde(rename = "error")]
    Error {
        /// Error code, a string or a number depending on the upstream
        #[serde(default)]
        code: Option<Value>,
        /// Error message
        #[serde(default)]
        message: String,
        /// Offending parameter
        #[serde(default)]
        param: Option<String>,
    },
    /// Any event type this SDK does not model
    #[serde(skip)]
    Other {
        /// The `type` discriminator
        event_type: String,
        /// Full event payload
        data: Value,
    },
}

const KNOWN_EVENT_TYPES: &[&str] = &[
    "response.created",
    "response.in_progress",
    "response.delta",
    "response.output_item.added",
    "response.output_item.done",
    "response.content_part.added",
    "response.content_part.done",
    "response.output_text.delta",
    "response.output_text.done",
    "response.function_call_arguments.delta",
    "response.function_call_arguments.done",
    "response.completed",
    "response.failed",
    "response.incomplete",
    "response.done",
    "error",
];

impl ResponseStreamEvent {
    /// Decode one event payload
    ///
    /// Unknown `type`s become [`ResponseStreamEvent::Other`]; a known type
    /// with a malformed payload is an invalid-response error.
    pub fn from_value(value: Value) -> Result<Self> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::invalid_response("stream event without a `type`", Some(value.to_string()))
            })?
            .to_string();

        if !KNOWN_EVENT_TYPES.contains(&event_type.as_str()) {
            return Ok(Self::Other {
                event_type,
                data: value,
            });
        }

        let raw = value.to_string();
        serde_json::from_value(value).map_err(|e| {
            Error::invalid_response(format!("malformed `{event_type}` event: {e}"), Some(raw))
        })
    }

    /// The `type` discriminator of this event
    pub fn event_type(&self) -> &str {
        match self {
            Self::Created { .. } => "response.created",
            Self::InProgress { .. } => "response.in_progress",
            Self::Delta { .. } => "response.delta",
            Self::OutputItemAdded { .. } => "response.output_item.added",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::ContentPartAdded { .. } => "response.content_part.added",
            Self::ContentPartDone { .. } => "response.content_part.done",
            Self::OutputTextDelta { .. } => "response.output_text.delta",
            Self::OutputTextDone { .. } => "response.output_text.done",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::Completed { .. } => "response.completed",
            Self::Failed { .. } => "response.failed",
            Self::Incomplete { .. } => "response.incomplete",
            Self::Done { .. } => "response.done",
            Self::Error { .. } => "error",
            Self::Other { event_type, .. } => event_type,
        }
    }

    /// Whether this event ends the response
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Failed { .. }
                | Self::Incomplete { .. }
                | Self::Done { .. }
                | Self::Error { .. }
        )
    }

    /// Text carried by this event, if any
    pub fn text_delta(&self) -> Option<String> {
        match self {
            Self::OutputTextDelta { delta, .. } => Some(delta.clone()),
            Self::Delta { delta } => {
                let text: String = delta
                    .output
                    .iter()
                    .flatten()
                    .flat_map(|item| item.content.iter())
                    .filter_map(|part| part.text.as_deref())
                    .collect();
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        }
    }
}
