//! Endpoint families: request translation and payload decoding
//!
//! Every family is a zero-sized marker implementing [`EndpointFamily`]. The
//! async and blocking clients are generic over it, so a family's wire format
//! is written exactly once.

use crate::error::{Error, Result};
use crate::error_map::map_status;
use crate::models::{ChatCompletion, ChatCompletionChunk, RouteChunk, RouteCompletion, TextCompletion, TextCompletionChunk};
use crate::params::{InputContent, InputContentPart, InputItem, RequestParams, ResponseInput};
use crate::responses::{Response, ResponseStreamEvent};
use crate::types::{ContentPart, Message, MessageContent, ResponseFormat, Role};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Native routing endpoint
pub const ROUTE_PATH: &str = "/route";
/// OpenAI-compatible chat completions endpoint
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
/// OpenAI-compatible legacy completions endpoint
pub const COMPLETIONS_PATH: &str = "/v1/completions";
/// Responses API collection
pub const RESPONSES_PATH: &str = "/responses";
/// Public key discovery for provider key encryption
pub const PUBLIC_KEY_PATH: &str = "/.well-known/tr-public-key";
/// Model catalogue
pub const MODELS_PATH: &str = "/v1/models";
/// Per-model cost table
pub const COSTS_PATH: &str = "/costs";
/// Service health
pub const HEALTH_PATH: &str = "/health";

/// Wire format of one endpoint family
pub trait EndpointFamily: Send + Sync + 'static {
    /// Decoded non-streaming payload
    type Response: Send + 'static;
    /// Decoded stream event
    type Event: Send + 'static;

    /// Family name used in logs and error messages
    const NAME: &'static str;
    /// Request path
    const PATH: &'static str;
    /// Whether the family accepts `key_mode`
    const ACCEPTS_KEY_MODE: bool = false;

    /// Build the JSON body for `params`
    fn translate(params: &RequestParams, stream: bool) -> Result<Value>;

    /// Decode a complete response body
    fn decode(body: &str) -> Result<Self::Response>;

    /// Decode the data of one stream frame
    fn decode_event(data: &str) -> Result<Self::Event>;

    /// The response is complete once this event is seen; the connection may
    /// close afterwards without error
    fn finishes(event: &Self::Event) -> bool;

    /// No further events follow this one
    fn terminates(_event: &Self::Event) -> bool {
        false
    }
}

/// `POST /route`: native routing with routing metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRoute;

/// `POST /v1/chat/completions`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletions;

/// `POST /v1/completions`
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCompletions;

/// `POST /responses`
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesApi;

impl EndpointFamily for NativeRoute {
    type Response = RouteCompletion;
    type Event = RouteChunk;

    const NAME: &'static str = "route";
    const PATH: &'static str = ROUTE_PATH;
    const ACCEPTS_KEY_MODE: bool = true;

    fn translate(params: &RequestParams, stream: bool) -> Result<Value> {
        let mut body = chat_body::<Self>(params, stream)?;
        body.put("key_mode", &params.key_mode)?;
        body.finish(&params.extra)
    }

    fn decode(body: &str) -> Result<Self::Response> {
        decode_typed(body)
    }

    fn decode_event(data: &str) -> Result<Self::Event> {
        decode_chunk(data)
    }

    fn finishes(event: &Self::Event) -> bool {
        event.is_finished()
    }
}

impl EndpointFamily for ChatCompletions {
    type Response = ChatCompletion;
    type Event = ChatCompletionChunk;

    const NAME: &'static str = "chat.completions";
    const PATH: &'static str = CHAT_COMPLETIONS_PATH;

    fn translate(params: &RequestParams, stream: bool) -> Result<Value> {
        chat_body::<Self>(params, stream)?.finish(&params.extra)
    }

    fn decode(body: &str) -> Result<Self::Response> {
        decode_typed(body)
    }

    fn decode_event(data: &str) -> Result<Self::Event> {
        decode_chunk(data)
    }

    fn finishes(event: &Self::Event) -> bool {
        event.is_finished()
    }
}

impl EndpointFamily for LegacyCompletions {
    type Response = TextCompletion;
    type Event = TextCompletionChunk;

    const NAME: &'static str = "completions";
    const PATH: &'static str = COMPLETIONS_PATH;

    fn translate(params: &RequestParams, stream: bool) -> Result<Value> {
        let mut unsupported = common_unsupported(params);
        unsupported.extend([
            ("messages", !params.messages.is_empty()),
            ("input", params.input.is_some()),
            ("instructions", params.instructions.is_some()),
            ("tools", params.tools.is_some()),
            ("tool_choice", params.tool_choice.is_some()),
            ("response_format", params.response_format.is_some()),
            ("logprobs", params.logprobs.is_some()),
            ("previous_response_id", params.previous_response_id.is_some()),
            ("store", params.store.is_some()),
            ("metadata", params.metadata.is_some()),
        ]);
        reject_unsupported::<Self>(&unsupported)?;

        let prompt = params
            .prompt
            .as_ref()
            .ok_or_else(|| Error::invalid_request("`prompt` is required for completions"))?;

        let mut body = WireBody::new(params)?;
        body.put("prompt", &Some(prompt))?;
        body.set("stream", Value::Bool(stream));
        body.put("max_tokens", &params.max_tokens)?;
        body.put("temperature", &params.temperature)?;
        body.put("top_p", &params.top_p)?;
        body.put("frequency_penalty", &params.frequency_penalty)?;
        body.put("presence_penalty", &params.presence_penalty)?;
        body.put("stop", &params.stop)?;
        body.put("n", &params.n)?;
        body.put("echo", &params.echo)?;
        body.put("suffix", &params.suffix)?;
        body.put("user", &params.user)?;
        body.put("seed", &params.seed)?;
        body.put("model_preferences", &params.model_preferences)?;
        body.put("mode", &params.mode)?;
        body.finish(&params.extra)
    }

    fn decode(body: &str) -> Result<Self::Response> {
        let value = parse_json(body)?;
        let choices = value
            .get("choices")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid_payload("completion without a `choices` array", body))?;
        if choices
            .iter()
            .any(|choice| !choice.get("text").map(Value::is_string).unwrap_or(false))
        {
            return Err(invalid_payload("completion choice without a `text` string", body));
        }
        Ok(value)
    }

    fn decode_event(data: &str) -> Result<Self::Event> {
        decode_chunk(data)
    }

    fn finishes(event: &Self::Event) -> bool {
        event.is_finished()
    }
}

impl EndpointFamily for ResponsesApi {
    type Response = Response;
    type Event = ResponseStreamEvent;

    const NAME: &'static str = "responses";
    const PATH: &'static str = RESPONSES_PATH;

    fn translate(params: &RequestParams, stream: bool) -> Result<Value> {
        let mut unsupported = common_unsupported(params);
        unsupported.extend([
            ("prompt", params.prompt.is_some()),
            ("stop", params.stop.is_some()),
            ("n", params.n.is_some()),
            ("logprobs", params.logprobs.is_some()),
            ("echo", params.echo.is_some()),
            ("suffix", params.suffix.is_some()),
            ("seed", params.seed.is_some()),
            ("frequency_penalty", params.frequency_penalty.is_some()),
            ("presence_penalty", params.presence_penalty.is_some()),
        ]);
        reject_unsupported::<Self>(&unsupported)?;

        let input = match (&params.input, params.messages.is_empty()) {
            (Some(_), false) => {
                return Err(Error::invalid_request(
                    "give either `input` or `messages` to the responses endpoint, not both",
                ))
            }
            (Some(input), true) => input.clone(),
            (None, false) => ResponseInput::Items(messages_to_input(&params.messages)),
            (None, true) => {
                return Err(Error::invalid_request(
                    "`input` is required for the responses endpoint",
                ))
            }
        };
        if matches!(&input, ResponseInput::Items(items) if items.is_empty()) {
            return Err(Error::invalid_request("`input` must not be empty"));
        }

        let mut body = WireBody::new(params)?;
        body.put("input", &Some(input))?;
        body.set("stream", Value::Bool(stream));
        body.put("instructions", &params.instructions)?;
        body.put("max_output_tokens", &params.max_tokens)?;
        body.put("temperature", &params.temperature)?;
        body.put("top_p", &params.top_p)?;
        body.put("tools", &params.tools)?;
        body.put("tool_choice", &params.tool_choice)?;
        if let Some(format) = &params.response_format {
            body.set("text", json!({ "format": text_format(format) }));
        }
        body.put("previous_response_id", &params.previous_response_id)?;
        body.put("store", &params.store)?;
        body.put("metadata", &params.metadata)?;
        body.put("user", &params.user)?;
        body.put("model_preferences", &params.model_preferences)?;
        body.put("mode", &params.mode)?;
        body.finish(&params.extra)
    }

    fn decode(body: &str) -> Result<Self::Response> {
        decode_typed(body)
    }

    fn decode_event(data: &str) -> Result<Self::Event> {
        let value = parse_json(data)?;
        if value.get("type").and_then(Value::as_str) == Some("error") {
            let error = value.get("error").unwrap_or(&value);
            return Err(in_stream_error(error, data));
        }
        ResponseStreamEvent::from_value(value)
    }

    fn finishes(event: &Self::Event) -> bool {
        event.is_terminal()
    }

    fn terminates(event: &Self::Event) -> bool {
        event.is_terminal()
    }
}

/// JSON object under construction
struct WireBody {
    map: Map<String, Value>,
}

impl WireBody {
    /// Start a body with the validated model
    fn new(params: &RequestParams) -> Result<Self> {
        let model = params.model.trim();
        if model.is_empty() {
            return Err(Error::invalid_request("`model` is required (use \"auto\" to let the router pick)"));
        }
        let mut map = Map::new();
        map.insert("model".to_string(), Value::String(model.to_string()));
        Ok(Self { map })
    }

    fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    fn put<T: Serialize>(&mut self, key: &str, value: &Option<T>) -> Result<()> {
        if let Some(value) = value {
            let value = serde_json::to_value(value).map_err(|e| {
                Error::invalid_request(format!("cannot serialize `{key}`: {e}"))
            })?;
            self.set(key, value);
        }
        Ok(())
    }

    /// Merge pass-through fields; they may not shadow translated ones
    fn finish(mut self, extra: &Map<String, Value>) -> Result<Value> {
        for (key, value) in extra {
            if key == "key_mode" {
                return Err(Error::invalid_request(
                    "`key_mode` must be set through RequestParams::key_mode",
                ));
            }
            if self.map.contains_key(key) {
                return Err(Error::invalid_request(format!(
                    "extra field `{key}` collides with a translated parameter"
                )));
            }
            self.map.insert(key.clone(), value.clone());
        }
        Ok(Value::Object(self.map))
    }
}

/// `key_mode` only means something to the native route
fn common_unsupported(params: &RequestParams) -> Vec<(&'static str, bool)> {
    vec![("key_mode", params.key_mode.is_some())]
}

fn reject_unsupported<F: EndpointFamily>(fields: &[(&'static str, bool)]) -> Result<()> {
    let present: Vec<&str> = fields
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect();
    if present.is_empty() {
        return Ok(());
    }
    Err(Error::invalid_request(format!(
        "{} not supported by the {} endpoint ({})",
        present
            .iter()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", "),
        F::NAME,
        F::PATH
    )))
}

/// Body shared by the native route and chat completions
fn chat_body<F: EndpointFamily>(params: &RequestParams, stream: bool) -> Result<WireBody> {
    let mut unsupported = vec![
        ("prompt", params.prompt.is_some()),
        ("input", params.input.is_some()),
        ("instructions", params.instructions.is_some()),
        ("echo", params.echo.is_some()),
        ("suffix", params.suffix.is_some()),
        ("previous_response_id", params.previous_response_id.is_some()),
        ("store", params.store.is_some()),
        ("metadata", params.metadata.is_some()),
    ];
    if !F::ACCEPTS_KEY_MODE {
        unsupported.extend(common_unsupported(params));
    }
    reject_unsupported::<F>(&unsupported)?;

    if params.messages.is_empty() {
        return Err(Error::invalid_request(format!(
            "`messages` is required for the {} endpoint",
            F::NAME
        )));
    }

    let mut body = WireBody::new(params)?;
    body.put("messages", &Some(&params.messages))?;
    body.set("stream", Value::Bool(stream));
    body.put("temperature", &params.temperature)?;
    body.put("top_p", &params.top_p)?;
    body.put("frequency_penalty", &params.frequency_penalty)?;
    body.put("presence_penalty", &params.presence_penalty)?;
    body.put("max_tokens", &params.max_tokens)?;
    body.put("stop", &params.stop)?;
    body.put("n", &params.n)?;
    body.put("logprobs", &params.logprobs)?;
    body.put("user", &params.user)?;
    body.put("seed", &params.seed)?;
    body.put("tools", &params.tools)?;
    body.put("tool_choice", &params.tool_choice)?;
    body.put("response_format", &params.response_format)?;
    body.put("model_preferences", &params.model_preferences)?;
    body.put("mode", &params.mode)?;
    Ok(body)
}

/// Chat messages as Responses API input items, order preserved
fn messages_to_input(messages: &[Message]) -> Vec<InputItem> {
    let mut items = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == Role::Tool {
            if let Some(call_id) = &message.tool_call_id {
                items.push(InputItem::function_output(
                    call_id.clone(),
                    message.text().unwrap_or_default(),
                ));
                continue;
            }
        }

        if let Some(content) = &message.content {
            items.push(InputItem::Message {
                role: message.role,
                content: input_content(message.role, content),
            });
        }

        for call in message.tool_calls.iter().flatten() {
            items.push(InputItem::FunctionCall {
                call_id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            });
        }
    }
    items
}

fn input_content(role: Role, content: &MessageContent) -> InputContent {
    match content {
        MessageContent::Text(text) => InputContent::Text(text.clone()),
        MessageContent::Parts(parts) => InputContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } if role == Role::Assistant => {
                        InputContentPart::OutputText { text: text.clone() }
                    }
                    ContentPart::Text { text } => InputContentPart::InputText { text: text.clone() },
                    ContentPart::ImageUrl { image_url } => InputContentPart::InputImage {
                        image_url: Some(image_url.url.clone()),
                        file_id: None,
                        detail: image_url.detail.clone(),
                    },
                })
                .collect(),
        ),
    }
}

/// `response_format` expressed as a Responses API `text.format`
fn text_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema { json_schema } => {
            let mut value = json!({
                "type": "json_schema",
                "name": json_schema.name,
                "schema": json_schema.schema,
            });
            if let Some(description) = &json_schema.description {
                value["description"] = json!(description);
            }
            if let Some(strict) = json_schema.strict {
                value["strict"] = json!(strict);
            }
            value
        }
    }
}

fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| invalid_payload(&format!("payload is not valid JSON: {e}"), body))
}

fn invalid_payload(message: &str, body: &str) -> Error {
    Error::invalid_response(message, Some(body.to_string()))
}

fn decode_typed<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value = parse_json(body)?;
    if !value.is_object() {
        return Err(invalid_payload("payload is not a JSON object", body));
    }
    serde_json::from_value(value)
        .map_err(|e| invalid_payload(&format!("unexpected payload shape: {e}"), body))
}

/// Chat-style chunk, or the error object some upstreams send mid-stream
fn decode_chunk<T: DeserializeOwned>(data: &str) -> Result<T> {
    let value = parse_json(data)?;
    if let Some(error) = value.get("error") {
        if value.get("choices").is_none() {
            return Err(in_stream_error(error, data));
        }
    }
    serde_json::from_value(value)
        .map_err(|e| invalid_payload(&format!("unexpected chunk shape: {e}"), data))
}

fn in_stream_error(error: &Value, raw: &str) -> Error {
    let status = ["status", "code"]
        .iter()
        .filter_map(|key| error.get(*key).and_then(Value::as_u64))
        .find_map(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|code| code.is_client_error() || code.is_server_error());

    match status {
        Some(status) => map_status(status, &HeaderMap::new(), raw),
        None => Error::Api {
            message: error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .unwrap_or("error reported inside the stream")
                .to_string(),
            status: StatusCode::OK.as_u16(),
            body: Some(raw.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{KeyMode, RoutingMode, Tool, ToolCall, FunctionCall, ToolChoice};

    fn two_messages() -> RequestParams {
        RequestParams::new(vec![
            Message::developer("You are terse."),
            Message::user("Summarise Rust in one line."),
        ])
    }

    #[test]
    fn test_route_body_carries_routing_fields() {
        let params = two_messages()
            .with_mode(RoutingMode::Cost)
            .with_model_preferences(["gpt-4o-mini"])
            .with_key_mode(KeyMode::Mixed)
            .with_temperature(0.2);
        let body = NativeRoute::translate(&params, false).unwrap();

        assert_eq!(body["model"], "auto");
        assert_eq!(body["mode"], "cost");
        assert_eq!(body["key_mode"], "mixed");
        assert_eq!(body["model_preferences"][0], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "developer");
        assert_eq!(body["messages"][1]["content"], "Summarise Rust in one line.");
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_key_mode_rejected_on_openai_compatible_endpoints() {
        let params = two_messages().with_key_mode(KeyMode::Stored);
        let err = ChatCompletions::translate(&params, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("key_mode"));

        let params = RequestParams::from_prompt("Say this is a test").with_key_mode(KeyMode::Inline);
        assert!(LegacyCompletions::translate(&params, false).is_err());

        let params = RequestParams::from_input("hi").with_key_mode(KeyMode::Auto);
        assert!(ResponsesApi::translate(&params, false).is_err());
    }

    #[test]
    fn test_key_mode_cannot_sneak_in_through_extra() {
        let params = two_messages().with_extra("key_mode", json!("inline"));
        assert!(ChatCompletions::translate(&params, false).is_err());
    }

    #[test]
    fn test_required_fields() {
        let err = ChatCompletions::translate(&RequestParams::default(), false).unwrap_err();
        assert!(err.to_string().contains("messages"));

        let err = LegacyCompletions::translate(&RequestParams::default(), false).unwrap_err();
        assert!(err.to_string().contains("prompt"));

        let err = ResponsesApi::translate(&RequestParams::default(), false).unwrap_err();
        assert!(err.to_string().contains("input"));

        let params = two_messages().with_model("  ");
        let err = NativeRoute::translate(&params, false).unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_unsupported_fields_fail_fast() {
        let params = two_messages().with_previous_response_id("resp_1");
        let err = ChatCompletions::translate(&params, false).unwrap_err();
        assert!(err.to_string().contains("previous_response_id"));

        let params = RequestParams::from_prompt("x").with_tools(vec![Tool::function(
            "f",
            "d",
            json!({"type": "object"}),
        )]);
        let err = LegacyCompletions::translate(&params, false).unwrap_err();
        assert!(err.to_string().contains("`tools`"));

        let params = RequestParams::from_input("x").with_stop("END");
        assert!(ResponsesApi::translate(&params, false).is_err());
    }

    #[test]
    fn test_extra_fields_pass_through_without_shadowing() {
        let params = two_messages().with_extra("parallel_tool_calls", json!(false));
        let body = ChatCompletions::translate(&params, true).unwrap();
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["stream"], true);

        let params = two_messages().with_extra("model", json!("gpt-4"));
        assert!(ChatCompletions::translate(&params, false).is_err());
    }

    #[test]
    fn test_legacy_body() {
        let params = RequestParams::from_prompt("Say this is a test")
            .with_max_tokens(7)
            .with_temperature(0.0);
        let body = LegacyCompletions::translate(&params, false).unwrap();
        assert_eq!(body["prompt"], "Say this is a test");
        assert_eq!(body["max_tokens"], 7);
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn test_responses_body_renames_fields() {
        let params = RequestParams::from_input("Tell me a story")
            .with_model("gpt-4.1")
            .with_instructions("Answer in haiku.")
            .with_max_tokens(200)
            .with_previous_response_id("resp_prev")
            .with_store(true)
            .with_tool_choice(ToolChoice::auto())
            .with_response_format(ResponseFormat::JsonObject);
        let body = ResponsesApi::translate(&params, false).unwrap();
        assert_eq!(body["input"], "Tell me a story");
        assert_eq!(body["instructions"], "Answer in haiku.");
        assert_eq!(body["max_output_tokens"], 200);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["previous_response_id"], "resp_prev");
        assert_eq!(body["store"], true);
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_responses_converts_messages_to_items() {
        let mut assistant = Message::assistant("Let me check.");
        assistant.tool_calls = Some(vec![ToolCall {
            id: "call_1".into(),
            tool_type: "function".into(),
            function: FunctionCall {
                name: "get_weather".into(),
                arguments: "{}".into(),
            },
        }]);
        let params = RequestParams::new(vec![
            Message::user("Weather in SF?"),
            assistant,
            Message::tool("sunny", "call_1"),
        ]);
        let body = ResponsesApi::translate(&params, false).unwrap();
        let input = body["input"].as_array().unwrap();
        assert_eq!(input.len(), 4);
        assert_eq!(input[0]["type"], "message");
        assert_eq!(input[0]["content"], "Weather in SF?");
        assert_eq!(input[1]["role"], "assistant");
        assert_eq!(input[2]["type"], "function_call");
        assert_eq!(input[3]["type"], "function_call_output");
        assert_eq!(input[3]["output"], "sunny");

        let params = RequestParams::from_input("x").with_message(Message::user("y"));
        assert!(ResponsesApi::translate(&params, false).is_err());
    }

    #[test]
    fn test_decode_route_vs_chat() {
        let body = r#"{
            "id": "route-1", "object": "chat.completion", "created": 1, "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Rust is fast."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16},
            "cost_usd": 0.00002, "latency_ms": 412.5, "routed_model": "gpt-4o-mini", "routed_provider": "openai"
        }"#;
        let routed = NativeRoute::decode(body).unwrap();
        assert_eq!(routed.content(), Some("Rust is fast."));
        assert_eq!(routed.routed_model(), Some("gpt-4o-mini"));
        assert_eq!(routed.routing.routed_provider.as_deref(), Some("openai"));

        let chat = ChatCompletions::decode(body).unwrap();
        assert_eq!(chat.model, "gpt-4o-mini");
        assert_eq!(chat.usage.unwrap().total_tokens, 16);
    }

    #[test]
    fn test_decode_malformed_is_invalid_response() {
        let err = ChatCompletions::decode(r#"{"model": "x"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);

        let err = ChatCompletions::decode("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert_eq!(err.body(), Some("not json"));

        let err = LegacyCompletions::decode(r#"{"choices": [{"message": {}}]}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_decode_legacy_raw_structure() {
        let value = LegacyCompletions::decode(
            r#"{"id": "cmpl-1", "object": "text_completion", "model": "gpt-3.5-turbo-instruct",
                "choices": [{"text": "This is a test.", "index": 0, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert_eq!(value["choices"][0]["text"], "This is a test.");
    }

    #[test]
    fn test_chunk_error_payload_surfaces() {
        let err = ChatCompletions::decode_event(r#"{"error": {"message": "upstream overloaded", "code": 503}}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalServer);

        let err = ChatCompletions::decode_event(r#"{"error": {"message": "boom"}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_finish_and_terminate_signals() {
        let chunk = ChatCompletions::decode_event(
            r#"{"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert!(ChatCompletions::finishes(&chunk));
        assert!(!ChatCompletions::terminates(&chunk));

        let event = ResponsesApi::decode_event(r#"{"type": "response.completed", "response": {"id": "resp_1"}}"#)
            .unwrap();
        assert!(ResponsesApi::finishes(&event));
        assert!(ResponsesApi::terminates(&event));
    }

    #[test]
    fn test_responses_error_event_is_an_error() {
        let err = ResponsesApi::decode_event(
            r#"{"type": "error", "code": "server_error", "message": "model crashed", "param": null}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.to_string().contains("model crashed"));

        let err = ResponsesApi::decode_event(r#"{"type": "error", "code": 429, "message": "slow down"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);

        let err = ResponsesApi::decode_event(
            r#"{"type": "error", "error": {"message": "quota gone", "status": 500}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalServer);
    }
}
