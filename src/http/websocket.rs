//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Open the companion backend connection before completing the upgrade
//! - Complete the client upgrade with the backend's chosen sub-protocol
//! - Run the two directional pumps and supervise their shutdown
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - A backend that cannot be reached fails the upgrade (502/504), so the
//!   client never sees an open socket with nothing behind it
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - Ping/pong handled transparently by each leg

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::http::header::{
    AUTHORIZATION, COOKIE, SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION,
};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{BackendTarget, WebSocketSettings};
use crate::http::dispatch::UpgradeAcceptor;
use crate::http::request::{ProxyRequest, X_REQUEST_ID};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::routing::RouteRule;
use crate::session::{pump, ConnectionRegistry, PumpExit, RelayLimits, SessionRecord, Side};

/// Time the surviving pump gets to finish the close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Headers copied from the client handshake to the backend handshake.
fn forwarded_headers() -> [HeaderName; 4] {
    [
        SEC_WEBSOCKET_PROTOCOL,
        COOKIE,
        AUTHORIZATION,
        HeaderName::from_static(X_REQUEST_ID),
    ]
}

/// Registry entry for a session that has not reached the upgrade handoff.
/// Dropping it unregisters the session.
struct PendingSession {
    session: Arc<SessionRecord>,
    registry: Arc<ConnectionRegistry>,
    armed: bool,
}

impl PendingSession {
    fn open(registry: &Arc<ConnectionRegistry>, target: &str) -> Self {
        Self {
            session: registry.open_session(target),
            registry: Arc::clone(registry),
            armed: true,
        }
    }

    fn session(&self) -> &Arc<SessionRecord> {
        &self.session
    }

    /// Hand the session over to the upgrade callbacks.
    fn release(mut self) -> Arc<SessionRecord> {
        self.armed = false;
        Arc::clone(&self.session)
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(session_id = %self.session.id(), "Pending session dropped");
            self.registry.abort(self.session.id());
        }
    }
}

pub struct WebSocketBridge {
    backend: BackendTarget,
    route: RouteRule,
    settings: WebSocketSettings,
    registry: Arc<ConnectionRegistry>,
}

impl WebSocketBridge {
    pub fn new(
        backend: BackendTarget,
        route: RouteRule,
        settings: WebSocketSettings,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            backend,
            route,
            settings,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn relay_limits(&self) -> RelayLimits {
        RelayLimits {
            max_text: self.settings.max_text_message_size,
            max_binary: self.settings.max_binary_message_size,
            idle: self.settings.max_idle_time,
        }
    }

    /// Transport limit for the client leg. Only bounded when both frame
    /// types are; the relay enforces the per-type limits.
    fn client_message_limit(&self) -> Option<usize> {
        match (
            self.settings.max_text_message_size,
            self.settings.max_binary_message_size,
        ) {
            (Some(text), Some(binary)) => Some(text.max(binary)),
            _ => None,
        }
    }

    fn check_version(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let Some(min) = self.settings.min_version else {
            return Ok(());
        };
        let raw = headers
            .get(SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match raw.trim().parse::<u8>() {
            Ok(version) if version >= min => Ok(()),
            _ => Err(ProxyError::UnsupportedVersion(raw.to_string())),
        }
    }

    async fn connect(
        &self,
        target: &str,
        headers: &HeaderMap,
    ) -> Result<(BackendStream, Option<String>), ProxyError> {
        let mut request = target
            .into_client_request()
            .map_err(|e| ProxyError::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        for name in forwarded_headers() {
            for value in headers.get_all(&name) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }

        let connect = tokio_tungstenite::connect_async(request);
        match tokio::time::timeout(self.settings.connect_timeout, connect).await {
            Ok(Ok((stream, response))) => {
                let protocol = response
                    .headers()
                    .get(SEC_WEBSOCKET_PROTOCOL)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                Ok((stream, protocol))
            }
            Ok(Err(e)) => Err(ProxyError::WebSocketConnect {
                target: target.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ProxyError::WebSocketTimeout {
                target: target.to_string(),
            }),
        }
    }

    async fn bridge(
        &self,
        upgrade: WebSocketUpgrade,
        request: ProxyRequest,
    ) -> Result<Response, ProxyError> {
        self.check_version(&request.headers)?;

        let target = request.websocket_target(&self.backend, &self.route);
        let pending = PendingSession::open(&self.registry, &target);
        tracing::debug!(session_id = %pending.session().id(), backend_url = %target, "Connecting to backend");

        // Dropping this future mid-connect drops `pending` too.
        let (backend, protocol) = match self.connect(&target, &request.headers).await {
            Ok(connected) => connected,
            Err(e) => {
                metrics::record_connect_failure(e.reason());
                return Err(e);
            }
        };

        let mut upgrade = upgrade.write_buffer_size(self.settings.buffer_size);
        if let Some(limit) = self.client_message_limit() {
            upgrade = upgrade.max_message_size(limit).max_frame_size(limit);
        }
        if let Some(protocol) = protocol {
            upgrade = upgrade.protocols([protocol]);
        }

        let session = pending.release();
        let failed_registry = Arc::clone(&self.registry);
        let failed_id = session.id();
        let registry = Arc::clone(&self.registry);
        let limits = self.relay_limits();

        Ok(upgrade
            .on_failed_upgrade(move |error| {
                tracing::warn!(session_id = %failed_id, error = %error, "Client upgrade failed");
                failed_registry.abort(failed_id);
            })
            .on_upgrade(move |socket| run_session(socket, backend, session, registry, limits)))
    }
}

impl UpgradeAcceptor for WebSocketBridge {
    async fn accept(&self, upgrade: WebSocketUpgrade, request: ProxyRequest) -> Response {
        let start = Instant::now();
        let method = request.method.clone();
        let request_id = request.request_id().unwrap_or("-").to_string();
        let path = request.original_uri.path().to_string();

        let response = match self.bridge(upgrade, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    path = %path,
                    error = %e,
                    "WebSocket bridge failed"
                );
                e.into_response()
            }
        };

        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            "websocket",
            start,
        );
        response
    }
}

/// Relay frames until both directions have finished.
async fn run_session(
    client: WebSocket,
    backend: BackendStream,
    session: Arc<SessionRecord>,
    registry: Arc<ConnectionRegistry>,
    limits: RelayLimits,
) {
    if let Err(e) = session.mark_open() {
        tracing::warn!(error = %e, "Session not opened");
        return;
    }
    metrics::session_opened();
    let started = Instant::now();
    tracing::info!(session_id = %session.id(), backend_url = %session.target(), "WebSocket session open");

    let (client_sink, client_stream) = client.split();
    let (backend_sink, backend_stream) = backend.split();

    let mut inbound = tokio::spawn({
        let session = Arc::clone(&session);
        let limits = limits.clone();
        async move {
            pump::<ws::Message, tungstenite::Message, _, _, _>(
                client_stream,
                backend_sink,
                &session,
                Side::Inbound,
                &limits,
            )
            .await
        }
    });
    let mut outbound = tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            pump::<tungstenite::Message, ws::Message, _, _, _>(
                backend_stream,
                client_sink,
                &session,
                Side::Outbound,
                &limits,
            )
            .await
        }
    });

    let (first_side, first) = tokio::select! {
        res = &mut inbound => (Side::Inbound, res),
        res = &mut outbound => (Side::Outbound, res),
    };
    let (other_side, mut other) = match first_side {
        Side::Inbound => (Side::Outbound, outbound),
        Side::Outbound => (Side::Inbound, inbound),
    };

    let first_exit = first.unwrap_or_else(|e| PumpExit::ReadFailed(e.to_string()));
    registry.close_side(&session, first_side);
    if let Some(close) = first_exit.propagated_close() {
        session.cancel(close);
    }

    let other_exit = match tokio::time::timeout(CLOSE_GRACE, &mut other).await {
        Ok(res) => Some(res.unwrap_or_else(|e| PumpExit::ReadFailed(e.to_string()))),
        Err(_) => {
            tracing::debug!(session_id = %session.id(), direction = other_side.as_str(), "Close grace expired");
            other.abort();
            None
        }
    };
    registry.close_side(&session, other_side);
    metrics::session_closed();

    tracing::info!(
        session_id = %session.id(),
        first = first_side.as_str(),
        first_exit = ?first_exit,
        other_exit = ?other_exit,
        duration_ms = started.elapsed().as_millis() as u64,
        "WebSocket session closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequestParts;
    use axum::http::{HeaderValue, Request};

    fn bridge(settings: WebSocketSettings) -> WebSocketBridge {
        WebSocketBridge::new(
            BackendTarget::parse("http://127.0.0.1:2004").unwrap(),
            RouteRule::default(),
            settings,
            Arc::new(ConnectionRegistry::new()),
        )
    }

    #[test]
    fn version_floor() {
        let bridge = bridge(WebSocketSettings {
            min_version: Some(13),
            ..WebSocketSettings::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        assert!(bridge.check_version(&headers).is_ok());

        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        assert!(matches!(
            bridge.check_version(&headers),
            Err(ProxyError::UnsupportedVersion(v)) if v == "8"
        ));
    }

    #[test]
    fn no_version_floor_by_default() {
        let bridge = bridge(WebSocketSettings::default());
        assert!(bridge.check_version(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn client_limit_needs_both_frame_limits() {
        let bridge_one = bridge(WebSocketSettings {
            max_text_message_size: Some(1024),
            ..WebSocketSettings::default()
        });
        assert_eq!(bridge_one.client_message_limit(), None);

        let bridge_both = bridge(WebSocketSettings {
            max_text_message_size: Some(1024),
            max_binary_message_size: Some(4096),
            ..WebSocketSettings::default()
        });
        assert_eq!(bridge_both.client_message_limit(), Some(4096));
    }

    #[tokio::test]
    async fn unreachable_backend_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let bridge = bridge(WebSocketSettings::default());
        let target = format!("ws://{addr}/socket");
        let err = bridge.connect(&target, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::WebSocketConnect { .. }));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn dropped_accept_unregisters_session() {
        // Accepts TCP connections but never answers the handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let bridge = WebSocketBridge::new(
            BackendTarget::parse(&format!("http://{addr}")).unwrap(),
            RouteRule::default(),
            WebSocketSettings::default(),
            Arc::new(ConnectionRegistry::new()),
        );

        let mut request = Request::builder()
            .uri("/live")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let on_upgrade = hyper::upgrade::on(&mut request);
        request.extensions_mut().insert(on_upgrade);
        let (mut parts, body) = request.into_parts();
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        let request = ProxyRequest::from_request(Request::from_parts(parts, body), "").unwrap();

        let mut accept = Box::pin(bridge.accept(upgrade, request));
        let pending = tokio::time::timeout(Duration::from_millis(100), &mut accept).await;
        assert!(pending.is_err(), "connect should still be pending");
        assert_eq!(bridge.registry().len(), 1);

        drop(accept);
        assert!(bridge.registry().is_empty());
    }
}
