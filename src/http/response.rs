//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Remove hop-by-hop headers in both directions
//! - Map relay errors to HTTP status codes
//!
//! # Design Decisions
//! - Backend connect failures are 502, backend timeouts 504
//! - Error bodies are short plain text; details go to the log

use axum::http::header::{CONNECTION, SEC_WEBSOCKET_VERSION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// WebSocket protocol version this proxy speaks.
pub const SUPPORTED_WEBSOCKET_VERSION: &str = "13";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no proxy mounted at {0}")]
    NotMounted(String),

    #[error("invalid backend target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream did not respond in time")]
    UpstreamTimeout,

    #[error("failed to read upstream body: {0}")]
    ReadBody(String),

    #[error("backend websocket connect to {target} failed: {reason}")]
    WebSocketConnect { target: String, reason: String },

    #[error("backend websocket connect to {target} timed out")]
    WebSocketTimeout { target: String },

    #[error("unsupported websocket version {0}")]
    UnsupportedVersion(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotMounted(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidTarget { .. }
            | ProxyError::Upstream(_)
            | ProxyError::ReadBody(_)
            | ProxyError::WebSocketConnect { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout | ProxyError::WebSocketTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProxyError::UnsupportedVersion(_) => StatusCode::UPGRADE_REQUIRED,
        }
    }

    /// Label for the connect failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::WebSocketTimeout { .. } | ProxyError::UpstreamTimeout => "timeout",
            ProxyError::InvalidTarget { .. } => "invalid_target",
            _ => "error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::NotMounted(_) => "Not Found",
            ProxyError::UpstreamTimeout | ProxyError::WebSocketTimeout { .. } => {
                "Upstream timed out"
            }
            ProxyError::UnsupportedVersion(_) => "Unsupported WebSocket version",
            _ => "Upstream request failed",
        };
        let mut response = (status, body).into_response();
        if let ProxyError::UnsupportedVersion(_) = self {
            response.headers_mut().insert(
                SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static(SUPPORTED_WEBSOCKET_VERSION),
            );
        }
        response
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_and_connection_listed() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-session-hint", HeaderValue::from_static("a"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        headers.insert("cookie", HeaderValue::from_static("sid=1"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 2);
        assert!(headers.contains_key("content-type"));
        assert!(headers.contains_key("cookie"));
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(ProxyError::NotMounted("/x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::UpstreamTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ProxyError::WebSocketTimeout { target: "ws://a".into() }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::WebSocketConnect {
                target: "ws://a".into(),
                reason: "refused".into()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn version_rejection_advertises_supported_version() {
        let response = ProxyError::UnsupportedVersion("8".into()).into_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(response.headers()[SEC_WEBSOCKET_VERSION], "13");
    }
}
