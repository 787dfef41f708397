//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Build the backend target from path info and the route rule
//! - Forward method, headers and a streamed body over a pooled client
//! - Stream the backend response back, rewriting index documents
//!
//! # Design Decisions
//! - One attempt per request, never retried
//! - Only index documents are buffered; everything else streams
//! - The request timeout bounds the wait for response headers

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::{BackendTarget, TimeoutConfig};
use crate::http::content::ContentRewriter;
use crate::http::dispatch::RequestForwarder;
use crate::http::request::ProxyRequest;
use crate::http::response::{strip_hop_by_hop, ProxyError};
use crate::observability::metrics;
use crate::routing::RouteRule;

pub struct HttpRelay {
    client: Client<HttpConnector, Body>,
    backend: BackendTarget,
    route: RouteRule,
    content: ContentRewriter,
    request_timeout: Duration,
}

impl HttpRelay {
    pub fn new(
        backend: BackendTarget,
        route: RouteRule,
        content: ContentRewriter,
        timeouts: &TimeoutConfig,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            backend,
            route,
            content,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        }
    }

    async fn relay(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        let target = request.http_target(&self.backend, &self.route);
        let ProxyRequest {
            method,
            path_info,
            mount_prefix,
            mut headers,
            body,
            ..
        } = request;

        let uri: Uri = target.parse().map_err(|e: axum::http::uri::InvalidUri| {
            ProxyError::InvalidTarget {
                target: target.clone(),
                reason: e.to_string(),
            }
        })?;
        // Index detection looks at the path the backend will see.
        let backend_path = self.route.rewrite(&path_info);
        let rewrite_index = method != Method::HEAD && self.content.applies_to(&backend_path);

        strip_hop_by_hop(&mut headers);
        let host = HeaderValue::from_str(&self.backend.authority()).map_err(|e| {
            ProxyError::InvalidTarget {
                target: target.clone(),
                reason: e.to_string(),
            }
        })?;
        headers.insert(HOST, host);
        if rewrite_index {
            // The marker can only be found in an identity-encoded body.
            headers.remove(ACCEPT_ENCODING);
        }

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        tracing::debug!(backend_url = %target, "Forwarding to backend");

        let pending = self.client.request(outbound);
        let response: Response<Incoming> = match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ProxyError::Upstream(e.to_string())),
            Err(_) => return Err(ProxyError::UpstreamTimeout),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        if !rewrite_index || !has_body(parts.status) {
            return Ok(Response::from_parts(parts, Body::new(body)));
        }

        let bytes = axum::body::to_bytes(Body::new(body), usize::MAX)
            .await
            .map_err(|e| ProxyError::ReadBody(e.to_string()))?;
        let rewritten = self.content.rewrite(bytes, &mount_prefix);
        parts.headers.remove(TRANSFER_ENCODING);
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        Ok(Response::from_parts(parts, Body::from(rewritten)))
    }
}

impl RequestForwarder for HttpRelay {
    async fn forward(&self, request: ProxyRequest) -> Response {
        let start = Instant::now();
        let method = request.method.clone();
        let request_id = request.request_id().unwrap_or("-").to_string();
        let path = request.original_uri.path().to_string();

        let response = match self.relay(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    error = %e,
                    "Upstream error"
                );
                e.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), "http", start);
        response
    }
}

/// Statuses that may carry a body.
fn has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}
