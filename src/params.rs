//! Unified request parameters
//!
//! One [`RequestParams`] value describes a call to any endpoint family; the
//! translators in [`crate::endpoint`] decide which fields each family accepts.

use crate::types::{
    KeyMode, Message, ResponseFormat, Role, RoutingMode, Stop, Tool, ToolChoice,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model name that lets the router pick
pub const AUTO_MODEL: &str = "auto";

/// Prompt for the legacy completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// Single prompt
    Text(String),
    /// Several prompts completed in one call
    Batch(Vec<String>),
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Input for the Responses API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    /// Simple text input
    Text(String),
    /// Structured input items
    Items(Vec<InputItem>),
}

impl From<&str> for ResponseInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ResponseInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<InputItem>> for ResponseInput {
    fn from(items: Vec<InputItem>) -> Self {
        Self::Items(items)
    }
}

/// Input item for the Responses API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// A conversational message
    Message {
        /// Sender role
        role: Role,
        /// Message content
        content: InputContent,
    },
    /// Reference to an item of a stored response
    ItemReference {
        /// Item identifier
        id: String,
    },
    /// A function call made by the model in an earlier turn
    FunctionCall {
        /// Call identifier
        call_id: String,
        /// Function name
        name: String,
        /// JSON arguments
        arguments: String,
    },
    /// Result of a function call
    FunctionCallOutput {
        /// Call identifier the output answers
        call_id: String,
        /// Tool output
        output: String,
    },
}

impl InputItem {
    /// Message item with a plain text body
    pub fn message(role: Role, text: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: InputContent::Text(text.into()),
        }
    }

    /// Function call output item
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Content of a Responses API input message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    /// Plain text
    Text(String),
    /// Typed content parts
    Parts(Vec<InputContentPart>),
}

/// Typed content part of an input message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentPart {
    /// User supplied text
    InputText {
        /// The text
        text: String,
    },
    /// Text previously produced by the model
    OutputText {
        /// The text
        text: String,
    },
    /// Image input
    InputImage {
        /// URL or data URI
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        /// Uploaded file reference
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        /// Requested fidelity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// File input
    InputFile {
        /// Uploaded file reference
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        /// Inline file data
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
        /// File name for inline data
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

/// Unified parameter set for every endpoint family
///
/// Built per call; the client never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    /// Model identifier, or `auto`
    pub model: String,
    /// Conversation (native route, chat completions, responses)
    pub messages: Vec<Message>,
    /// Prompt (legacy completions)
    pub prompt: Option<Prompt>,
    /// Input (responses)
    pub input: Option<ResponseInput>,
    /// System-level instructions (responses)
    pub instructions: Option<String>,
    /// Preferred models in priority order
    pub model_preferences: Option<Vec<String>>,
    /// Routing strategy hint
    pub mode: Option<RoutingMode>,
    /// Provider credential handling (native route only)
    pub key_mode: Option<KeyMode>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling
    pub top_p: Option<f32>,
    /// Frequency penalty
    pub frequency_penalty: Option<f32>,
    /// Presence penalty
    pub presence_penalty: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Stop>,
    /// Number of choices
    pub n: Option<u32>,
    /// Return log probabilities
    pub logprobs: Option<bool>,
    /// Echo the prompt (legacy completions)
    pub echo: Option<bool>,
    /// Suffix after the completion (legacy completions)
    pub suffix: Option<String>,
    /// End-user identifier
    pub user: Option<String>,
    /// Sampling seed
    pub seed: Option<i64>,
    /// Tools available to the model
    pub tools: Option<Vec<Tool>>,
    /// Tool choice behavior
    pub tool_choice: Option<ToolChoice>,
    /// Output format
    pub response_format: Option<ResponseFormat>,
    /// Continue from a stored response (responses)
    pub previous_response_id: Option<String>,
    /// Store the response server-side (responses)
    pub store: Option<bool>,
    /// Free-form metadata (responses)
    pub metadata: Option<Map<String, Value>>,
    /// Whether the caller intends to stream
    pub stream: bool,
    /// Extra wire fields passed through verbatim
    pub extra: Map<String, Value>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            model: AUTO_MODEL.to_string(),
            messages: Vec::new(),
            prompt: None,
            input: None,
            instructions: None,
            model_preferences: None,
            mode: None,
            key_mode: None,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
            stop: None,
            n: None,
            logprobs: None,
            echo: None,
            suffix: None,
            user: None,
            seed: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            previous_response_id: None,
            store: None,
            metadata: None,
            stream: false,
            extra: Map::new(),
        }
    }
}

impl RequestParams {
    /// Parameters for a conversation
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Parameters for a legacy text completion
    pub fn from_prompt(prompt: impl Into<Prompt>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Parameters for a Responses API call
    pub fn from_input(input: impl Into<ResponseInput>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Append a message
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the instructions
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Set the model preference ordering
    pub fn with_model_preferences<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_preferences = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Set the routing mode
    pub fn with_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the key mode
    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = Some(key_mode);
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set top-p
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the frequency penalty
    pub fn with_frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    /// Set the presence penalty
    pub fn with_presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set stop sequences
    pub fn with_stop(mut self, stop: impl Into<Stop>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    /// Set the number of choices
    pub fn with_n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    /// Set the end-user identifier
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the tools
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the tool choice
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Set the output format
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Continue from a stored response
    pub fn with_previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    /// Store the response server-side
    pub fn with_store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Mark the call as streaming
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Pass an extra wire field through verbatim
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_to_auto_model() {
        let params = RequestParams::new(vec![Message::user("hi")]);
        assert_eq!(params.model, "auto");
        assert!(!params.stream);
        assert!(params.key_mode.is_none());
    }

    #[test]
    fn test_builder_preserves_message_order() {
        let params = RequestParams::default()
            .with_message(Message::developer("be brief"))
            .with_message(Message::user("hello"))
            .with_model_preferences(["gpt-4o", "claude-3-5-sonnet"]);
        assert_eq!(params.messages[0].role, Role::Developer);
        assert_eq!(params.messages[1].role, Role::User);
        assert_eq!(
            params.model_preferences.unwrap(),
            vec!["gpt-4o".to_string(), "claude-3-5-sonnet".to_string()]
        );
    }

    #[test]
    fn test_input_item_wire_shape() {
        let item = InputItem::Message {
            role: Role::User,
            content: InputContent::Parts(vec![InputContentPart::InputText {
                text: "What's the weather like today?".into(),
            }]),
        };
        assert_eq!(
            serde_json::to_value(item).unwrap(),
            json!({
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": "What's the weather like today?"}]
            })
        );
    }
}
