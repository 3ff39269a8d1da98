//! Request-logging middleware.
//!
//! Assigns each request a correlation id, measures its duration, extracts
//! the tool/thread/ticket ids from the query string or the (buffered)
//! JSON body, and hands a [`RequestLog`] line to the sink. Also feeds the
//! recorder's request and failure counters, so those stay accurate even
//! when request persistence is disabled.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sink::LogRecord;
use crate::state::AppState;

/// Request bodies here are small JSON documents; anything beyond this is
/// not worth buffering for id extraction.
const BODY_LIMIT: usize = 64 * 1024;

/// One line in the `requests` jsonl stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub status_code: u16,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

pub async fn request_logger(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = state.clock.now();
    let timestamp = state.clock.now_utc();
    let request_id = Uuid::new_v4();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    // Buffer the body so ids can be read from it, then rebuild the request.
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .unwrap_or_default();
    let body_json: Option<serde_json::Value> = serde_json::from_slice(&bytes).ok();

    let tool_id = extract_id(query.as_deref(), body_json.as_ref(), "tool_id");
    let thread_id = extract_id(query.as_deref(), body_json.as_ref(), "thread_id");
    let ticket_id = extract_id(query.as_deref(), body_json.as_ref(), "ticket_id");

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let status = response.status();
    let duration = state
        .clock
        .now()
        .saturating_duration_since(started);

    state.recorder.record_request();
    if status.is_client_error() || status.is_server_error() {
        state.recorder.record_failure();
    }

    tracing::debug!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "request"
    );

    state.sink.send(LogRecord::Request(RequestLog {
        timestamp,
        request_id,
        method,
        path,
        tool_id,
        thread_id,
        ticket_id,
        status_code: status.as_u16(),
        duration_ms: duration.as_millis() as u64,
        client_ip,
    }));

    response
}

/// Looks `key` up in the query string first, then in the JSON body.
fn extract_id(query: Option<&str>, body: Option<&serde_json::Value>, key: &str) -> Option<String> {
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k == key && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    body.and_then(|json| json.get(key))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_query_before_body() {
        let body = serde_json::json!({"tool_id": "from-body"});
        assert_eq!(
            extract_id(Some("tool_id=from-query"), Some(&body), "tool_id"),
            Some("from-query".to_string())
        );
        assert_eq!(
            extract_id(None, Some(&body), "tool_id"),
            Some("from-body".to_string())
        );
        assert_eq!(extract_id(None, None, "tool_id"), None);
    }
}
