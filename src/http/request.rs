//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) at the edge
//! - Strip the mount prefix to obtain the path info
//! - Build the backend HTTP and WebSocket targets
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Original URI preserved for logging; the target is built from path info

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::BackendTarget;
use crate::routing::RouteRule;

/// Header carrying the request ID to the backend and back to the client.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(id))
    }
}

/// An inbound request seen relative to the proxy's mount point.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub original_uri: Uri,
    /// Request path below the mount prefix. Empty when the request names
    /// the mount point itself.
    pub path_info: String,
    pub mount_prefix: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyRequest {
    /// Split `request` at `mount_prefix`. Returns `None` for requests
    /// outside the mount prefix.
    pub fn from_request(request: Request<Body>, mount_prefix: &str) -> Option<Self> {
        let path_info = strip_mount_prefix(request.uri().path(), mount_prefix)?.to_string();
        let (parts, body) = request.into_parts();
        Some(Self {
            method: parts.method,
            original_uri: parts.uri,
            path_info,
            mount_prefix: mount_prefix.to_string(),
            headers: parts.headers,
            body,
        })
    }

    pub fn query(&self) -> Option<&str> {
        self.original_uri.query()
    }

    /// Path info plus the query string, if any.
    pub fn path_and_query(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{}", self.path_info, query),
            None => self.path_info.clone(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }

    /// Backend URL for plain HTTP. The rule applies to the whole URL, base
    /// included.
    pub fn http_target(&self, backend: &BackendTarget, route: &RouteRule) -> String {
        route.rewrite(&format!("{}{}", backend.base, self.path_and_query()))
    }

    /// Backend URL for a WebSocket upgrade. Only the host and port of the
    /// backend are used; the rule applies to the request part.
    pub fn websocket_target(&self, backend: &BackendTarget, route: &RouteRule) -> String {
        format!(
            "ws://{}:{}{}",
            backend.host,
            backend.port,
            route.rewrite(&self.path_and_query())
        )
    }
}

fn strip_mount_prefix<'a>(path: &'a str, mount_prefix: &str) -> Option<&'a str> {
    if mount_prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(mount_prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
