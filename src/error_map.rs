//! Mapping of HTTP failures onto [`Error`]
//!
//! Shared by the async and blocking clients so both classify failures the
//! same way.

use crate::error::Error;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

/// Classify a non-success HTTP answer
///
/// `Retry-After` from the headers takes precedence over a `retry_after`
/// field in the body.
pub fn map_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Error {
    let json: Option<Value> = serde_json::from_str(body).ok();
    let message = extract_message(json.as_ref(), body, status);
    let raw = if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    };
    let code = status.as_u16();

    match code {
        401 => Error::Authentication {
            message,
            status: Some(code),
            body: raw,
        },
        403 if message.to_lowercase().contains("quota") => Error::QuotaExceeded {
            message,
            status: code,
            body: raw,
        },
        403 => Error::Authentication {
            message,
            status: Some(code),
            body: raw,
        },
        429 => {
            let retry_after =
                retry_after_from_headers(headers).or_else(|| json.as_ref().and_then(retry_after_from_body));
            Error::RateLimit {
                message,
                retry_after,
                body: raw,
            }
        }
        400 | 422 => Error::InvalidRequest {
            message,
            status: Some(code),
            body: raw,
        },
        500..=599 => Error::InternalServer {
            message,
            status: code,
            body: raw,
        },
        _ => Error::Api {
            message,
            status: code,
            body: raw,
        },
    }
}

/// Classify a failure raised by reqwest itself
pub fn map_transport(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("Request timed out: {err}"))
    } else if err.is_builder() {
        Error::invalid_request(format!("Could not build request: {err}"))
    } else if err.is_decode() {
        Error::invalid_response(format!("Could not decode response: {err}"), None)
    } else {
        Error::connection(format!("Connection failed: {err}"))
    }
}

fn extract_message(json: Option<&Value>, body: &str, status: StatusCode) -> String {
    if let Some(json) = json {
        if let Some(detail) = json.get("detail") {
            if let Some(text) = detail_message(detail) {
                return text;
            }
        }
        match json.get("error") {
            Some(Value::String(text)) => return text.clone(),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(text)) = obj.get("message") {
                    return text.clone();
                }
            }
            _ => {}
        }
        if let Some(Value::String(text)) = json.get("message") {
            return text.clone();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

/// `detail` is either a plain string or a list of validation failures
fn detail_message(detail: &Value) -> Option<String> {
    match detail {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg").and_then(Value::as_str)?;
                    let loc = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .map(|loc| {
                            loc.iter()
                                .map(|p| match p {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        })
                        .filter(|loc| !loc.is_empty());
                    Some(match loc {
                        Some(loc) => format!("{loc}: {msg}"),
                        None => msg.to_string(),
                    })
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(obj) => obj
            .get("message")
            .or_else(|| obj.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn retry_after_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_seconds)
}

fn retry_after_from_body(json: &Value) -> Option<u64> {
    [
        json.get("retry_after"),
        json.get("error").and_then(|e| e.get("retry_after")),
        json.get("detail").and_then(|d| d.get("retry_after")),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.ceil() as u64)),
        Value::String(s) => parse_seconds(s),
        _ => None,
    })
}

/// Seconds as sent by the server; fractions round up, dates are ignored
fn parse_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.ceil() as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use reqwest::header::HeaderValue;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_401_is_authentication() {
        let err = map_status(
            StatusCode::UNAUTHORIZED,
            &HeaderMap::new(),
            r#"{"detail": "Invalid API key"}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("Invalid API key"));
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_403_quota() {
        let err = map_status(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            r#"{"detail": "Monthly quota exhausted"}"#,
        );
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let err = map_status(StatusCode::FORBIDDEN, &HeaderMap::new(), "");
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(err.to_string().contains("HTTP 403"));
    }

    #[test]
    fn test_429_retry_after_header() {
        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("5"),
            r#"{"detail": "Rate limit exceeded"}"#,
        );
        assert_eq!(err.retry_after(), Some(5));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_429_without_retry_after_is_unset() {
        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            r#"{"detail": "Rate limit exceeded"}"#,
        );
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_429_header_wins_over_body() {
        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("7"),
            r#"{"error": {"message": "slow down", "retry_after": 30}}"#,
        );
        assert_eq!(err.retry_after(), Some(7));

        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            r#"{"error": {"message": "slow down", "retry_after": 30}}"#,
        );
        assert_eq!(err.retry_after(), Some(30));

        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            r#"{"retry_after": "2.5"}"#,
        );
        assert_eq!(err.retry_after(), Some(3));
    }

    #[test]
    fn test_422_validation_detail() {
        let body = r#"{"detail": [{"loc": ["body", "messages"], "msg": "field required", "type": "missing"}]}"#;
        let err = map_status(StatusCode::UNPROCESSABLE_ENTITY, &HeaderMap::new(), body);
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("body.messages: field required"));
        assert_eq!(err.body(), Some(body));
    }

    #[test]
    fn test_openai_style_error_message() {
        let err = map_status(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#,
        );
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn test_5xx_is_internal_and_retryable() {
        let err = map_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "upstream down");
        assert_eq!(err.kind(), ErrorKind::InternalServer);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_unknown_status_keeps_raw_body() {
        let err = map_status(StatusCode::IM_A_TEAPOT, &HeaderMap::new(), "<html>teapot</html>");
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.status(), Some(418));
        assert_eq!(err.body(), Some("<html>teapot</html>"));
        assert!(!err.is_retryable());
    }
}
