//! Server-sent event streams
//!
//! SSE framing is handled by `eventsource-stream`; [`StreamDecoder`] turns
//! frames into typed events for one [`EndpointFamily`] and tracks whether the
//! response completed. The async [`EventStream`] and the blocking iterator in
//! [`crate::blocking`] both drive the same decoder.

use crate::endpoint::EndpointFamily;
use crate::error::{Error, Result};
use bytes::Bytes;
use eventsource_stream::{Event as SseEvent, EventStreamError, Eventsource};
use futures::stream::{FusedStream, Stream};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

/// End-of-stream marker used by OpenAI-style streams
pub const DONE_MARKER: &str = "[DONE]";

pub(crate) type SseFrame = std::result::Result<SseEvent, EventStreamError<Error>>;
pub(crate) type SseFrames = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// Frame an SSE byte stream
pub(crate) fn sse_frames<S>(bytes: S) -> SseFrames
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    Box::pin(bytes.eventsource())
}

/// Outcome of feeding one frame to the decoder
pub(crate) enum Step<T> {
    /// Hand this item to the caller
    Yield(Result<T>),
    /// Nothing to deliver; read the next frame
    Skip,
    /// The stream is over
    End,
}

/// Per-response decoding state
pub(crate) struct StreamDecoder<F> {
    /// No further frames will be read
    terminated: bool,
    /// The response reached a finish signal; EOF is no longer an error
    finished: bool,
    delivered: usize,
    _family: PhantomData<fn() -> F>,
}

impl<F: EndpointFamily> StreamDecoder<F> {
    pub(crate) fn new() -> Self {
        Self {
            terminated: false,
            finished: false,
            delivered: 0,
            _family: PhantomData,
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) fn terminate(&mut self) {
        self.terminated = true;
    }

    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }

    /// Feed the next frame, `None` meaning the transport reached EOF
    pub(crate) fn step(&mut self, frame: Option<SseFrame>) -> Step<F::Event> {
        if self.terminated {
            return Step::End;
        }
        match frame {
            None => {
                self.terminated = true;
                if self.finished {
                    Step::End
                } else {
                    Step::Yield(Err(Error::connection(format!(
                        "{} stream closed after {} events without a finish signal",
                        F::NAME,
                        self.delivered
                    ))))
                }
            }
            Some(Err(EventStreamError::Transport(err))) => {
                self.terminated = true;
                if self.finished {
                    debug!(family = F::NAME, error = %err, "transport error after finish, ending stream");
                    Step::End
                } else {
                    Step::Yield(Err(err))
                }
            }
            Some(Err(err)) => {
                self.terminated = true;
                Step::Yield(Err(Error::invalid_response(
                    format!("malformed event stream: {err}"),
                    None,
                )))
            }
            Some(Ok(event)) => self.on_event(&event),
        }
    }

    fn on_event(&mut self, event: &SseEvent) -> Step<F::Event> {
        let data = event.data.trim();
        if data.is_empty() {
            return Step::Skip;
        }
        if data == DONE_MARKER {
            self.finished = true;
            self.terminated = true;
            return Step::End;
        }

        match F::decode_event(data) {
            Ok(decoded) => {
                if F::finishes(&decoded) {
                    self.finished = true;
                }
                if F::terminates(&decoded) {
                    self.terminated = true;
                }
                self.delivered += 1;
                Step::Yield(Ok(decoded))
            }
            Err(err) => {
                self.terminated = true;
                Step::Yield(Err(err))
            }
        }
    }
}

/// Typed events of one streaming response
///
/// The stream is one-shot: after the last event, an error, [`close`] or
/// cancellation it yields `None` forever. Dropping it closes the connection.
///
/// [`close`]: EventStream::close
pub struct EventStream<F: EndpointFamily> {
    frames: Option<SseFrames>,
    decoder: StreamDecoder<F>,
    cancel: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    request_id: String,
}

impl<F: EndpointFamily> EventStream<F> {
    /// Decode an SSE byte stream
    pub fn from_bytes<S>(bytes: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            frames: Some(sse_frames(bytes)),
            decoder: StreamDecoder::new(),
            cancel: None,
            request_id: String::new(),
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Stop the stream as soon as `token` is cancelled
    ///
    /// A pending read is abandoned and the connection closed.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Close the connection; later polls yield `None`
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

impl<F: EndpointFamily> Stream for EventStream<F> {
    type Item = Result<F::Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.decoder.is_terminated() {
                this.close();
                return Poll::Ready(None);
            }

            if let Some(cancel) = this.cancel.as_mut() {
                if cancel.as_mut().poll(cx).is_ready() {
                    debug!(family = F::NAME, request_id = %this.request_id, "stream cancelled");
                    this.close();
                    return Poll::Ready(None);
                }
            }

            let Some(frames) = this.frames.as_mut() else {
                return Poll::Ready(None);
            };
            let frame = ready!(frames.as_mut().poll_next(cx));

            match this.decoder.step(frame) {
                Step::Yield(item) => return Poll::Ready(Some(item)),
                Step::Skip => continue,
                Step::End => {
                    this.close();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<F: EndpointFamily> FusedStream for EventStream<F> {
    fn is_terminated(&self) -> bool {
        self.frames.is_none()
    }
}

impl<F: EndpointFamily> std::fmt::Debug for EventStream<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("family", &F::NAME)
            .field("request_id", &self.request_id)
            .field("open", &self.frames.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ChatCompletions, LegacyCompletions, NativeRoute, ResponsesApi};
    use crate::error::ErrorKind;
    use futures::stream::{self, StreamExt};
    use std::time::Duration;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let owned: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(owned)
    }

    fn chat_frame(content: &str, finish: Option<&str>) -> String {
        let chunk = serde_json::json!({
            "id": "c1",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": finish}]
        });
        format!("data: {chunk}\n\n")
    }

    #[tokio::test]
    async fn test_events_in_order_across_chunk_boundaries() {
        let body = [
            chat_frame("Hel", None),
            chat_frame("lo", None),
            chat_frame("!", Some("stop")),
            "data: [DONE]\n\n".to_string(),
        ]
        .concat();
        let (a, b) = body.split_at(37);
        let (b, c) = b.split_at(50);

        let mut events = EventStream::<ChatCompletions>::from_bytes(chunks(&[a, b, c]));
        let mut text = String::new();
        while let Some(chunk) = events.next().await {
            text.push_str(chunk.unwrap().delta_content().unwrap_or_default());
        }
        assert_eq!(text, "Hello!");

        assert!(events.is_terminated());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_comments_and_blank_data_skipped() {
        let body = format!(": keep-alive\n\ndata: \n\n{}data: [DONE]\n\n", chat_frame("x", Some("stop")));
        let events: Vec<_> = EventStream::<NativeRoute>::from_bytes(chunks(&[&body]))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_drop_mid_response_is_connection_error() {
        let body = [chat_frame("par", None), chat_frame("tial", None)].concat();
        let events: Vec<_> = EventStream::<ChatCompletions>::from_bytes(chunks(&[&body]))
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap().delta_content(), Some("par"));
        assert_eq!(events[1].as_ref().unwrap().delta_content(), Some("tial"));
        let err = events[2].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_once() {
        let first = chat_frame("a", None);
        let parts: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from(first)),
            Err(Error::connection("connection reset by peer")),
            Ok(Bytes::from(chat_frame("never", None))),
        ];
        let mut events = EventStream::<ChatCompletions>::from_bytes(stream::iter(parts));

        assert!(events.next().await.unwrap().is_ok());
        let err = events.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_eof_after_finish_reason_is_clean() {
        let body = chat_frame("done", Some("length"));
        let events: Vec<_> = EventStream::<ChatCompletions>::from_bytes(chunks(&[&body]))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_legacy_text_chunks() {
        let body = concat!(
            "data: {\"choices\": [{\"text\": \"This is\", \"index\": 0, \"finish_reason\": null}]}\n\n",
            "data: {\"choices\": [{\"text\": \" a test.\", \"index\": 0, \"finish_reason\": \"stop\"}]}\n\n",
            "data: [DONE]\n\n"
        );
        let text: String = EventStream::<LegacyCompletions>::from_bytes(chunks(&[body]))
            .map(|chunk| chunk.unwrap().text().unwrap_or_default().to_string())
            .collect()
            .await;
        assert_eq!(text, "This is a test.");
    }

    #[tokio::test]
    async fn test_responses_terminal_event_stops_reading() {
        let body = concat!(
            "event: response.created\n",
            "data: {\"type\": \"response.created\", \"response\": {\"id\": \"resp_1\", \"status\": \"in_progress\"}}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"type\": \"response.output_text.delta\", \"item_id\": \"msg_1\", \"output_index\": 0, \"content_index\": 0, \"delta\": \"Hi\"}\n\n",
            "event: response.completed\n",
            "data: {\"type\": \"response.completed\", \"response\": {\"id\": \"resp_1\", \"status\": \"completed\"}}\n\n",
            "data: {\"type\": \"response.created\", \"response\": {\"id\": \"resp_2\"}}\n\n"
        );
        let events: Vec<_> = EventStream::<ResponsesApi>::from_bytes(chunks(&[body]))
            .collect()
            .await;
        let types: Vec<String> = events
            .iter()
            .map(|e| e.as_ref().unwrap().event_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["response.created", "response.output_text.delta", "response.completed"]
        );
        assert_eq!(events[1].as_ref().unwrap().text_delta().as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_responses_error_event_ends_stream_with_error() {
        let body = concat!(
            "event: response.output_text.delta\n",
            "data: {\"type\": \"response.output_text.delta\", \"item_id\": \"m\", \"output_index\": 0, \"content_index\": 0, \"delta\": \"Hi\"}\n\n",
            "event: error\n",
            "data: {\"type\": \"error\", \"code\": \"server_error\", \"message\": \"model crashed\"}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"type\": \"response.output_text.delta\", \"item_id\": \"m\", \"output_index\": 0, \"content_index\": 0, \"delta\": \"late\"}\n\n"
        );
        let events: Vec<_> = EventStream::<ResponsesApi>::from_bytes(chunks(&[body]))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().text_delta().as_deref(), Some("Hi"));
        let err = events[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }

    #[tokio::test]
    async fn test_malformed_event_is_invalid_response() {
        let body = "data: {not json}\n\n";
        let events: Vec<_> = EventStream::<ChatCompletions>::from_bytes(chunks(&[body]))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap_err().kind(),
            ErrorKind::InvalidResponse
        );
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_pending_read() {
        let first = chat_frame("a", None);
        let body = stream::iter(vec![Ok(Bytes::from(first))]).chain(stream::pending());
        let token = CancellationToken::new();
        let mut events =
            EventStream::<ChatCompletions>::from_bytes(body).with_cancellation(token.clone());

        assert!(events.next().await.unwrap().is_ok());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(events.is_terminated());
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let body = [chat_frame("a", None), chat_frame("b", Some("stop"))].concat();
        let mut events = EventStream::<ChatCompletions>::from_bytes(chunks(&[&body]));
        assert!(events.next().await.is_some());
        events.close();
        assert!(events.next().await.is_none());
    }
}
