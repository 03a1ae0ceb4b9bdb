//! Blocking TokenRouter client
//!
//! Mirrors [`crate::Client`] on top of `reqwest::blocking`. Translation,
//! decoding, error mapping and stream decoding are shared with the async
//! client; only the transport differs. Do not use it from inside an async
//! runtime.

use crate::client::{
    decode_body, default_headers, prepare, public_key_failure, response_url, sensitive_value,
    PreparedCall, REQUEST_ID_HEADER,
};
use crate::config::ClientConfig;
use crate::crypto::{parse_public_key, public_key_from_body, KeyBundleCache, PROVIDER_KEYS_HEADER};
use crate::endpoint::{
    ChatCompletions, EndpointFamily, LegacyCompletions, NativeRoute, ResponsesApi, COSTS_PATH,
    HEALTH_PATH, MODELS_PATH, PUBLIC_KEY_PATH,
};
use crate::error::{Error, Result};
use crate::error_map::{map_status, map_transport};
use crate::models::{
    ChatCompletion, HealthStatus, Model, ModelCosts, ModelListing, RouteCompletion, TextCompletion,
};
use crate::params::RequestParams;
use crate::responses::{InputItemsList, InputItemsQuery, Response, ResponseDeleted};
use crate::stream::{sse_frames, SseFrames, Step, StreamDecoder};
use bytes::Bytes;
use futures::executor::{block_on_stream, BlockingStream};
use reqwest::header::HeaderMap;
use reqwest::Method;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

const READ_CHUNK: usize = 8 * 1024;

/// Blocking client for the TokenRouter API
#[derive(Clone)]
pub struct Client {
    http: reqwest::blocking::Client,
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
        // The blocking timeout applies to the connect, the response head and
        // each body read, so long streams stay open while data keeps coming.
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
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
    pub fn route(&self, params: &RequestParams) -> Result<RouteCompletion> {
        self.send::<NativeRoute>(params)
    }

    /// Streaming native routing call
    pub fn route_stream(&self, params: &RequestParams) -> Result<BlockingEventStream<NativeRoute>> {
        self.stream::<NativeRoute>(params)
    }

    /// OpenAI-compatible chat completion
    pub fn chat_completion(&self, params: &RequestParams) -> Result<ChatCompletion> {
        self.send::<ChatCompletions>(params)
    }

    /// Streaming OpenAI-compatible chat completion
    pub fn chat_completion_stream(
        &self,
        params: &RequestParams,
    ) -> Result<BlockingEventStream<ChatCompletions>> {
        self.stream::<ChatCompletions>(params)
    }

    /// Legacy text completion, returned in the provider's raw shape
    pub fn completion(&self, params: &RequestParams) -> Result<TextCompletion> {
        self.send::<LegacyCompletions>(params)
    }

    /// Streaming legacy text completion
    pub fn completion_stream(
        &self,
        params: &RequestParams,
    ) -> Result<BlockingEventStream<LegacyCompletions>> {
        self.stream::<LegacyCompletions>(params)
    }

    /// Create a response through the Responses API
    pub fn create_response(&self, params: &RequestParams) -> Result<Response> {
        self.send::<ResponsesApi>(params)
    }

    /// Create a response and stream its events
    pub fn create_response_stream(
        &self,
        params: &RequestParams,
    ) -> Result<BlockingEventStream<ResponsesApi>> {
        self.stream::<ResponsesApi>(params)
    }

    /// Fetch a stored response
    pub fn retrieve_response(&self, id: &str) -> Result<Response> {
        let url = response_url(&self.config, id, None)?;
        self.call_json(Method::GET, url, "responses.retrieve")
    }

    /// Delete a stored response
    pub fn delete_response(&self, id: &str) -> Result<ResponseDeleted> {
        let url = response_url(&self.config, id, None)?;
        self.call_json(Method::DELETE, url, "responses.delete")
    }

    /// Cancel an in-flight background response
    pub fn cancel_response(&self, id: &str) -> Result<Response> {
        let url = response_url(&self.config, id, Some("cancel"))?;
        self.call_json(Method::POST, url, "responses.cancel")
    }

    /// List the input items of a stored response
    pub fn list_input_items(&self, id: &str, query: &InputItemsQuery) -> Result<InputItemsList> {
        let mut url = response_url(&self.config, id, Some("input_items"))?;
        query.apply(&mut url);
        self.call_json(Method::GET, url, "responses.input_items")
    }

    /// Models the service can route to
    pub fn list_models(&self) -> Result<Vec<Model>> {
        let url = self.config.endpoint_url(MODELS_PATH)?;
        let listing: ModelListing = self.call_json(Method::GET, url, "models.list")?;
        Ok(listing.into_models())
    }

    /// Cost per 1k tokens for each model
    pub fn get_costs(&self) -> Result<ModelCosts> {
        let url = self.config.endpoint_url(COSTS_PATH)?;
        self.call_json(Method::GET, url, "costs")
    }

    /// Service health
    pub fn health_check(&self) -> Result<HealthStatus> {
        let url = self.config.endpoint_url(HEALTH_PATH)?;
        self.call_json(Method::GET, url, "health")
    }

    /// Non-streaming call to any endpoint family
    pub fn send<F: EndpointFamily>(&self, params: &RequestParams) -> Result<F::Response> {
        let call = prepare::<F>(&self.config, params, false)?;
        let headers = self.call_headers(&call)?;
        let url = self.config.endpoint_url(F::PATH)?;

        let response = self.execute(Method::POST, url, Some(&call.body), headers, &call.request_id, F::NAME)?;
        let body = response.text().map_err(map_transport)?;
        debug!(family = F::NAME, request_id = %call.request_id, bytes = body.len(), "response received");
        F::decode(&body)
    }

    /// Streaming call to any endpoint family
    pub fn stream<F: EndpointFamily>(&self, params: &RequestParams) -> Result<BlockingEventStream<F>> {
        let call = prepare::<F>(&self.config, params, true)?;
        let headers = self.call_headers(&call)?;
        let url = self.config.endpoint_url(F::PATH)?;

        let response = self.execute(Method::POST, url, Some(&call.body), headers, &call.request_id, F::NAME)?;
        debug!(family = F::NAME, request_id = %call.request_id, "stream opened");
        Ok(BlockingEventStream::from_reader(response, call.request_id))
    }

    fn call_json<T: DeserializeOwned>(&self, method: Method, url: Url, operation: &'static str) -> Result<T> {
        let request_id = Uuid::new_v4().to_string();
        let response = self.execute(method, url, None, HeaderMap::new(), &request_id, operation)?;
        let body = response.text().map_err(map_transport)?;
        decode_body(&body)
    }

    fn call_headers(&self, call: &PreparedCall) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if call.send_provider_keys {
            let bundle = self.provider_keys_header(&call.request_id)?;
            headers.insert(PROVIDER_KEYS_HEADER, sensitive_value(&bundle)?);
        }
        Ok(headers)
    }

    fn provider_keys_header(&self, request_id: &str) -> Result<SecretString> {
        if let Some(header) = self.keys.header() {
            return Ok(header);
        }
        let public_key = match self.keys.public_key() {
            Some(key) => key,
            None => {
                let pem = self.fetch_public_key(request_id)?;
                let key = parse_public_key(&pem).map_err(public_key_failure)?;
                self.keys.store_public_key(key)
            }
        };
        self.keys.header_for(&self.config.provider_keys, &public_key)
    }

    fn fetch_public_key(&self, request_id: &str) -> Result<String> {
        let url = self.config.endpoint_url(PUBLIC_KEY_PATH)?;
        let body = self
            .execute(Method::GET, url, None, HeaderMap::new(), request_id, "public-key")
            .and_then(|response| response.text().map_err(map_transport))
            .map_err(public_key_failure)?;
        debug!(request_id, "public key fetched");
        public_key_from_body(&body).map_err(public_key_failure)
    }

    fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        headers: HeaderMap,
        request_id: &str,
        operation: &'static str,
    ) -> Result<reqwest::blocking::Response> {
        let policy = &self.config.retry;
        let mut retries = 0;

        loop {
            debug!(operation, %method, %url, request_id, attempt = retries + 1, "sending request");

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .header(REQUEST_ID_HEADER, request_id);
            if let Some(body) = body {
                request = request.json(body);
            }

            let err = match request.send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => status_error(response),
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
            std::thread::sleep(delay);
            retries += 1;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("blocking::Client")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .finish()
    }
}

fn status_error(response: reqwest::blocking::Response) -> Error {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().unwrap_or_default();
    map_status(status, &headers, &body)
}

/// Typed events of one streaming response, read on the calling thread
///
/// One-shot like [`crate::EventStream`]; dropping it closes the connection.
pub struct BlockingEventStream<F: EndpointFamily> {
    frames: Option<BlockingStream<SseFrames>>,
    decoder: StreamDecoder<F>,
    request_id: String,
}

impl<F: EndpointFamily> BlockingEventStream<F> {
    /// Decode SSE read from `reader`
    pub fn from_reader<R>(reader: R, request_id: impl Into<String>) -> Self
    where
        R: Read + Send + 'static,
    {
        let chunks = futures::stream::iter(ReadChunks {
            reader: Some(reader),
        });
        Self {
            frames: Some(block_on_stream(sse_frames(chunks))),
            decoder: StreamDecoder::new(),
            request_id: request_id.into(),
        }
    }

    /// Close the connection; later calls to `next` yield `None`
    pub fn close(&mut self) {
        self.decoder.terminate();
        if self.frames.take().is_some() {
            debug!(
                family = F::NAME,
                request_id = %self.request_id,
                events = self.decoder.delivered(),
                "stream closed"
            );
        }
    }

    /// Request identifier sent with the call
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl<F: EndpointFamily> Iterator for BlockingEventStream<F> {
    type Item = Result<F::Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.decoder.is_terminated() {
                self.close();
                return None;
            }
            let frames = self.frames.as_mut()?;
            let frame = frames.next();

            match self.decoder.step(frame) {
                Step::Yield(item) => return Some(item),
                Step::Skip => continue,
                Step::End => {
                    self.close();
                    return None;
                }
            }
        }
    }
}

impl<F: EndpointFamily> std::iter::FusedIterator for BlockingEventStream<F> {}

impl<F: EndpointFamily> std::fmt::Debug for BlockingEventStream<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingEventStream")
            .field("family", &F::NAME)
            .field("request_id", &self.request_id)
            .field("open", &self.frames.is_some())
            .finish()
    }
}

/// Body chunks pulled from a blocking reader
struct ReadChunks<R> {
    reader: Option<R>,
}

impl<R: Read> Iterator for ReadChunks<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(Bytes::from(buf)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reader = None;
                    let err = if e.kind() == std::io::ErrorKind::TimedOut {
                        Error::Timeout(format!("stream read timed out: {e}"))
                    } else {
                        Error::connection(format!("stream read failed: {e}"))
                    };
                    return Some(Err(err));
                }
            }
        }
    }
}
