//! Blocking client behaviour against a mock TokenRouter server

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;
use tokenrouter::blocking::Client;
use tokenrouter::{ClientConfig, ErrorKind, KeyMode, Message, RequestParams, RetryPolicy};
use url::Url;

fn config_for(server: &ServerGuard) -> ClientConfig {
    ClientConfig::new("tr-test")
        .unwrap()
        .with_base_url(Url::parse(&server.url()).unwrap())
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_retries(1)
                .with_initial_delay(Duration::from_millis(10))
                .with_jitter(false),
        )
}

fn question() -> RequestParams {
    RequestParams::new(vec![Message::user("Name a Rust mascot.")])
}

#[test]
fn test_blocking_route() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/route")
        .match_header("authorization", "Bearer tr-test")
        .match_header("x-request-id", Matcher::Regex("^[0-9a-f-]{36}$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "route-1",
                "model": "mistral-small",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Ferris"}, "finish_reason": "stop"}],
                "routed_model": "mistral-small",
                "routed_provider": "mistral",
                "latency_ms": 120
            })
            .to_string(),
        )
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let routed = client.route(&question()).unwrap();

    assert_eq!(routed.content(), Some("Ferris"));
    assert_eq!(routed.routing.routed_provider.as_deref(), Some("mistral"));
    mock.assert();
}

#[test]
fn test_blocking_retries_server_error() {
    let mut server = Server::new();
    let failing = server
        .mock("POST", "/v1/chat/completions")
        .with_status(502)
        .with_body("bad gateway")
        .expect(1)
        .create();
    let ok = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(
            r#"{"id": "c1", "model": "gpt-4o-mini", "choices": [{"index": 0, "message": {"role": "assistant", "content": "Ferris"}, "finish_reason": "stop"}]}"#,
        )
        .expect(1)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let chat = client.chat_completion(&question()).unwrap();
    assert_eq!(chat.content(), Some("Ferris"));

    failing.assert();
    ok.assert();
}

#[test]
fn test_blocking_retries_exhausted() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body(r#"{"detail": "boom"}"#)
        .expect(2)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let err = client.chat_completion(&question()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalServer);
    assert_eq!(err.status(), Some(500));
    mock.assert();
}

#[test]
fn test_blocking_key_mode_on_chat_rejected() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let err = client
        .chat_completion(&question().with_key_mode(KeyMode::Inline))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    mock.assert();
}

#[test]
fn test_blocking_legacy_stream() {
    let body = concat!(
        "data: {\"id\": \"cmpl-1\", \"choices\": [{\"index\": 0, \"text\": \"Fer\"}]}\n\n",
        "data: {\"id\": \"cmpl-1\", \"choices\": [{\"index\": 0, \"text\": \"ris\", \"finish_reason\": \"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/v1/completions")
        .match_body(Matcher::PartialJson(json!({"prompt": "Mascot:", "stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let mut stream = client
        .completion_stream(&RequestParams::from_prompt("Mascot:"))
        .unwrap();
    assert_eq!(stream.request_id().len(), 36);

    let text: String = stream
        .by_ref()
        .map(|chunk| chunk.unwrap().text().unwrap_or_default().to_string())
        .collect();
    assert_eq!(text, "Ferris");
    assert!(stream.next().is_none());
}

#[test]
fn test_blocking_stream_error_status() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/route")
        .with_status(401)
        .with_body(r#"{"detail": "Invalid API key"}"#)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let err = client.route_stream(&question()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[test]
fn test_blocking_delete_response() {
    let mut server = Server::new();
    let mock = server
        .mock("DELETE", "/responses/resp_42")
        .with_status(200)
        .with_body(r#"{"id": "resp_42", "object": "response.deleted", "deleted": true}"#)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let deleted = client.delete_response("resp_42").unwrap();
    assert_eq!(deleted.id, "resp_42");
    assert!(deleted.deleted);
    mock.assert();
}

#[test]
fn test_blocking_stream_outlives_timeout_while_data_flows() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(|w| {
            for i in 0..5 {
                let finish = if i == 4 { json!("stop") } else { json!(null) };
                let chunk = json!({
                    "choices": [{"index": 0, "delta": {"content": format!("t{i} ")}, "finish_reason": finish}]
                });
                w.write_all(format!("data: {chunk}\n\n").as_bytes())?;
                w.flush()?;
                std::thread::sleep(Duration::from_millis(400));
            }
            w.write_all(b"data: [DONE]\n\n")
        })
        .create();

    let config = config_for(&server).with_timeout(Duration::from_secs(1));
    let client = Client::new(config).unwrap();
    let text: String = client
        .chat_completion_stream(&question())
        .unwrap()
        .map(|chunk| chunk.unwrap().delta_content().unwrap_or_default().to_string())
        .collect();
    assert_eq!(text, "t0 t1 t2 t3 t4 ");
}

#[test]
fn test_blocking_list_models() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body(r#"{"data": [{"id": "deepseek-chat", "object": "model", "owned_by": "deepseek"}]}"#)
        .create();

    let client = Client::new(config_for(&server)).unwrap();
    let models = client.list_models().unwrap();

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "deepseek-chat");
    assert_eq!(models[0].provider, "deepseek");
    mock.assert();
}

#[test]
fn test_blocking_health_check() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/health")
        .with_status(503)
        .with_body(r#"{"detail": "database unreachable"}"#)
        .create();

    let config = config_for(&server).with_max_retries(0);
    let client = Client::new(config).unwrap();
    let err = client.health_check().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalServer);
    assert!(err.to_string().contains("database unreachable"));
}
