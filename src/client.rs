//! Async TokenRouter client
//!
//! One method per endpoint. Every call gets a fresh `X-Request-Id`; the
//! request phase is retried according to the configured [`RetryPolicy`],
//! streams are never retried once open.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use crate::config::{ClientConfig, USER_AGENT};
use crate::crypto::{parse_public_key, public_key_from_body, KeyBundleCache, PROVIDER_KEYS_HEADER};
use crate::endpoint::{
    ChatCompletions, EndpointFamily, LegacyCompletions, NativeRoute, ResponsesApi, COSTS_PATH,
    HEALTH_PATH, MODELS_PATH, PUBLIC_KEY_PATH, RESPONSES_PATH,
};
use crate::error::{Error, Result};
use crate::error_map::{map_status, map_transport};
use crate::models::{
    ChatCompletion, HealthStatus, Model, ModelCosts, ModelListing, RouteCompletion, TextCompletion,
};
use crate::params::RequestParams;
use crate::provider_keys::PROVIDER_ENV_VARS;
use crate::responses::{InputItemsList, InputItemsQuery, Response, ResponseDeleted};
use crate::stream::EventStream;
use crate::types::KeyMode;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT as USER_AGENT_HEADER};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Header carrying the per-call request identifier
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Async client for the TokenRouter API
///
/// Cheap to clone; clones share the connection pool and the provider key
/// cache.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    keys: Arc<KeyBundleCache>,
}

impl Client {
    /// Create a client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config: Arc::new(config),
            keys: Arc::new(KeyBundleCache::new()),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Native routing call; the result carries routing metadata
    pub async fn route(&self, params: &RequestParams) -> Result<RouteCompletion> {
        self.send::<NativeRoute>(params).await
    }

    /// Streaming native routing call
    pub async fn route_stream(&self, params: &RequestParams) -> Result<EventStream<NativeRoute>> {
        self.stream::<NativeRoute>(params).await
    }

    /// OpenAI-compatible chat completion
    pub async fn chat_completion(&self, params: &RequestParams) -> Result<ChatCompletion> {
        self.send::<ChatCompletions>(params).await
    }

    /// Streaming OpenAI-compatible chat completion
    pub async fn chat_completion_stream(
        &self,
        params: &RequestParams,
    ) -> Result<EventStream<ChatCompletions>> {
        self.stream::<ChatCompletions>(params).await
    }

    /// Legacy text completion, returned in the provider's raw shape
    pub async fn completion(&self, params: &RequestParams) -> Result<TextCompletion> {
        self.send::<LegacyCompletions>(params).await
    }

    /// Streaming legacy text completion
    pub async fn completion_stream(
        &self,
        params: &RequestParams,
    ) -> Result<EventStream<LegacyCompletions>> {
        self.stream::<LegacyCompletions>(params).await
    }

    /// Create a response through the Responses API
    pub async fn create_response(&self, params: &RequestParams) -> Result<Response> {
        self.send::<ResponsesApi>(params).await
    }

    /// Create a response and stream its events
    pub async fn create_response_stream(
        &self,
        params: &RequestParams,
    ) -> Result<EventStream<ResponsesApi>> {
        self.stream::<ResponsesApi>(params).await
    }

    /// Fetch a stored response
    pub async fn retrieve_response(&self, id: &str) -> Result<Response> {
        let url = response_url(&self.config, id, None)?;
        self.call_json(Method::GET, url, "responses.retrieve").await
    }

    /// Delete a stored response
    pub async fn delete_response(&self, id: &str) -> Result<ResponseDeleted> {
        let url = response_url(&self.config, id, None)?;
        self.call_json(Method::DELETE, url, "responses.delete").await
    }

    /// Cancel an in-flight background response
    pub async fn cancel_response(&self, id: &str) -> Result<Response> {
        let url = response_url(&self.config, id, Some("cancel"))?;
        self.call_json(Method::POST, url, "responses.cancel").await
    }

    /// List the input items of a stored response
    pub async fn list_input_items(
        &self,
        id: &str,
        query: &InputItemsQuery,
    ) -> Result<InputItemsList> {
        let mut url = response_url(&self.config, id, Some("input_items"))?;
        query.apply(&mut url);
        self.call_json(Method::GET, url, "responses.input_items").await
    }

    /// Models the service can route to
    pub async fn list_models(&self) -> Result<Vec<Model>> {
        let url = self.config.endpoint_url(MODELS_PATH)?;
        let listing: ModelListing = self.call_json(Method::GET, url, "models.list").await?;
        Ok(listing.into_models())
    }

    /// Cost per 1k tokens for each model
    pub async fn get_costs(&self) -> Result<ModelCosts> {
        let url = self.config.endpoint_url(COSTS_PATH)?;
        self.call_json(Method::GET, url, "costs").await
    }

    /// Service health
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let url = self.config.endpoint_url(HEALTH_PATH)?;
        self.call_json(Method::GET, url, "health").await
    }

    /// Non-streaming call to any endpoint family
    pub async fn send<F: EndpointFamily>(&self, params: &RequestParams) -> Result<F::Response> {
        let call = prepare::<F>(&self.config, params, false)?;
        let headers = self.call_headers(&call).await?;
        let url = self.config.endpoint_url(F::PATH)?;

        let response = self
            .execute(Method::POST, url, Some(&call.body), headers, &call.request_id, F::NAME, true)
            .await?;
        let body = response.text().await.map_err(map_transport)?;
        debug!(family = F::NAME, request_id = %call.request_id, bytes = body.len(), "response received");
        F::decode(&body)
    }

    /// Streaming call to any endpoint family
    ///
    /// Retries stop once the server accepted the request. The configured
    /// timeout bounds the connect and each read, not the whole stream.
    pub async fn stream<F: EndpointFamily>(&self, params: &RequestParams) -> Result<EventStream<F>> {
        let call = prepare::<F>(&self.config, params, true)?;
        let headers = self.call_headers(&call).await?;
        let url = self.config.endpoint_url(F::PATH)?;

        let response = self
            .execute(Method::POST, url, Some(&call.body), headers, &call.request_id, F::NAME, false)
            .await?;
        debug!(family = F::NAME, request_id = %call.request_id, "stream opened");

        let bytes = response.bytes_stream().map_err(map_transport);
        Ok(EventStream::from_bytes(bytes).with_request_id(call.request_id))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        operation: &'static str,
    ) -> Result<T> {
        let request_id = Uuid::new_v4().to_string();
        let response = self
            .execute(method, url, None, HeaderMap::new(), &request_id, operation, true)
            .await?;
        let body = response.text().await.map_err(map_transport)?;
        decode_body(&body)
    }

    async fn call_headers(&self, call: &PreparedCall) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if call.send_provider_keys {
            let bundle = self.provider_keys_header(&call.request_id).await?;
            headers.insert(PROVIDER_KEYS_HEADER, sensitive_value(&bundle)?);
        }
        Ok(headers)
    }

    async fn provider_keys_header(&self, request_id: &str) -> Result<SecretString> {
        if let Some(header) = self.keys.header() {
            return Ok(header);
        }
        let public_key = match self.keys.public_key() {
            Some(key) => key,
            None => {
                let pem = self.fetch_public_key(request_id).await?;
                let key = parse_public_key(&pem).map_err(public_key_failure)?;
                self.keys.store_public_key(key)
            }
        };
        self.keys.header_for(&self.config.provider_keys, &public_key)
    }

    async fn fetch_public_key(&self, request_id: &str) -> Result<String> {
        let url = self.config.endpoint_url(PUBLIC_KEY_PATH)?;
        let fetched = async {
            let response = self
                .execute(Method::GET, url, None, HeaderMap::new(), request_id, "public-key", true)
                .await?;
            response.text().await.map_err(map_transport)
        }
        .await;

        let body = fetched.map_err(public_key_failure)?;
        debug!(request_id, "public key fetched");
        public_key_from_body(&body).map_err(public_key_failure)
    }

    /// Send a request, retrying the request phase
    ///
    /// With `bounded`, the configured timeout is also a deadline for the
    /// whole exchange, body included.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        headers: HeaderMap,
        request_id: &str,
        operation: &'static str,
        bounded: bool,
    ) -> Result<reqwest::Response> {
        let policy = &self.config.retry;
        let mut retries = 0;

        loop {
            debug!(operation, %method, %url, request_id, attempt = retries + 1, "sending request");

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .header(REQUEST_ID_HEADER, request_id);
            if bounded {
                request = request.timeout(self.config.timeout);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let err = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => status_error(response).await,
                Err(err) => map_transport(err),
            };

            if !policy.should_retry(&err, retries) {
                debug!(operation, request_id, error = %err, "request failed");
                return Err(err);
            }

            let delay = policy.delay_for(retries, &err);
            warn!(
                operation,
                request_id,
                retry = retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .finish()
    }
}

async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    map_status(status, &headers, &body)
}

/// A validated call ready to be sent
pub(crate) struct PreparedCall {
    pub(crate) body: Value,
    pub(crate) send_provider_keys: bool,
    pub(crate) request_id: String,
}

/// Translate `params` for `F` and settle provider key handling
///
/// Everything here happens before any network traffic.
pub(crate) fn prepare<F: EndpointFamily>(
    config: &ClientConfig,
    params: &RequestParams,
    streaming: bool,
) -> Result<PreparedCall> {
    if params.stream && !streaming {
        return Err(Error::invalid_request(format!(
            "`stream` is set; use the streaming method for the {} endpoint",
            F::NAME
        )));
    }

    let mut params = Cow::Borrowed(params);
    if F::ACCEPTS_KEY_MODE && params.key_mode.is_none() {
        if let Some(mode) = config.default_key_mode {
            params.to_mut().key_mode = Some(mode);
        }
    }

    let body = F::translate(&params, streaming)?;

    let send_provider_keys = match params.key_mode {
        Some(mode) if mode.uses_local_keys() => {
            if mode == KeyMode::Inline && config.provider_keys.is_empty() {
                let vars: Vec<&str> = PROVIDER_ENV_VARS.iter().map(|(_, var)| *var).collect();
                return Err(Error::invalid_request(format!(
                    "key_mode \"inline\" needs at least one provider key; none were found ({})",
                    vars.join(", ")
                )));
            }
            !config.provider_keys.is_empty()
        }
        _ => false,
    };

    Ok(PreparedCall {
        body,
        send_provider_keys,
        request_id: Uuid::new_v4().to_string(),
    })
}

/// Headers sent with every request
pub(crate) fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
        .map_err(|_| Error::config("API key contains characters not allowed in a header"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));

    for (name, value) in &config.default_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::config(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::config(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

pub(crate) fn sensitive_value(secret: &SecretString) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(secret.expose_secret())
        .map_err(|_| Error::encryption("encrypted provider key bundle is not a valid header"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// `/responses/{id}` or `/responses/{id}/{action}`
pub(crate) fn response_url(config: &ClientConfig, id: &str, action: Option<&str>) -> Result<Url> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::invalid_request("response id must not be empty"));
    }
    let mut url = config.endpoint_url(RESPONSES_PATH)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::config("base URL cannot carry a path"))?;
        segments.push(id);
        if let Some(action) = action {
            segments.push(action);
        }
    }
    Ok(url)
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        Error::invalid_response(format!("unexpected payload shape: {e}"), Some(body.to_string()))
    })
}

/// Public key discovery problems are connection failures
pub(crate) fn public_key_failure(err: Error) -> Error {
    Error::connection(format!("public key discovery failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider_keys::ProviderKeys;
    use crate::types::Message;

    fn config() -> ClientConfig {
        ClientConfig::new("tr-test").unwrap()
    }

    fn params() -> RequestParams {
        RequestParams::new(vec![Message::user("hi")])
    }

    #[test]
    fn test_prepare_rejects_stream_flag_on_plain_call() {
        let err = prepare::<ChatCompletions>(&config(), &params().with_stream(true), false)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let call = prepare::<ChatCompletions>(&config(), &params().with_stream(true), true).unwrap();
        assert_eq!(call.body["stream"], true);
    }

    #[test]
    fn test_prepare_key_modes() {
        let with_keys = config().with_provider_keys(ProviderKeys::new().with_key("openai", "sk"));

        let call = prepare::<NativeRoute>(&config(), &params(), false).unwrap();
        assert!(!call.send_provider_keys);

        let call = prepare::<NativeRoute>(&with_keys, &params().with_key_mode(KeyMode::Stored), false).unwrap();
        assert!(!call.send_provider_keys);
        assert_eq!(call.body["key_mode"], "stored");

        let err = prepare::<NativeRoute>(&config(), &params().with_key_mode(KeyMode::Inline), false)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let call = prepare::<NativeRoute>(&with_keys, &params().with_key_mode(KeyMode::Inline), false).unwrap();
        assert!(call.send_provider_keys);

        let call = prepare::<NativeRoute>(&config(), &params().with_key_mode(KeyMode::Auto), false).unwrap();
        assert!(!call.send_provider_keys);
        let call = prepare::<NativeRoute>(&with_keys, &params().with_key_mode(KeyMode::Mixed), false).unwrap();
        assert!(call.send_provider_keys);
    }

    #[test]
    fn test_default_key_mode_only_applies_to_route() {
        let config = config()
            .with_default_key_mode(KeyMode::Mixed)
            .with_provider_keys(ProviderKeys::new().with_key("anthropic", "sk-ant"));

        let call = prepare::<NativeRoute>(&config, &params(), false).unwrap();
        assert_eq!(call.body["key_mode"], "mixed");
        assert!(call.send_provider_keys);

        let call = prepare::<ChatCompletions>(&config, &params(), false).unwrap();
        assert!(call.body.get("key_mode").is_none());
        assert!(!call.send_provider_keys);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = prepare::<ChatCompletions>(&config(), &params(), false).unwrap();
        let b = prepare::<ChatCompletions>(&config(), &params(), false).unwrap();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_response_url_escapes_id() {
        let url = response_url(&config(), "resp_1", Some("input_items")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/responses/resp_1/input_items");

        let url = response_url(&config(), "a/b", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/responses/a%2Fb");

        assert!(response_url(&config(), " ", None).is_err());
    }

    #[test]
    fn test_default_headers() {
        let headers = default_headers(&config().with_header("X-Team", "ml")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tr-test");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers["x-team"], "ml");

        let err = default_headers(&config().with_header("bad header", "x")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
