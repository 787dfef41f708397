//! Request dispatch.
//!
//! Every request below the mount prefix goes to exactly one of two seams:
//! WebSocket upgrades to an [`UpgradeAcceptor`], everything else to a
//! [`RequestForwarder`].

use std::future::Future;

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::header::{SEC_WEBSOCKET_VERSION, UPGRADE};
use axum::http::{HeaderMap, Request};
use axum::response::{IntoResponse, Response};

use crate::http::request::ProxyRequest;
use crate::http::response::ProxyError;

/// Forwards plain HTTP requests.
pub trait RequestForwarder: Send + Sync + 'static {
    fn forward(&self, request: ProxyRequest) -> impl Future<Output = Response> + Send;
}

/// Completes WebSocket upgrades.
pub trait UpgradeAcceptor: Send + Sync + 'static {
    fn accept(
        &self,
        upgrade: WebSocketUpgrade,
        request: ProxyRequest,
    ) -> impl Future<Output = Response> + Send;
}

/// Routes requests under the mount prefix to a forwarder or an acceptor.
#[derive(Debug)]
pub struct Dispatcher<F, U> {
    mount_prefix: String,
    forwarder: F,
    acceptor: U,
}

impl<F, U> Dispatcher<F, U>
where
    F: RequestForwarder,
    U: UpgradeAcceptor,
{
    pub fn new(mount_prefix: impl Into<String>, forwarder: F, acceptor: U) -> Self {
        Self {
            mount_prefix: mount_prefix.into(),
            forwarder,
            acceptor,
        }
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    pub fn acceptor(&self) -> &U {
        &self.acceptor
    }

    pub async fn dispatch(
        &self,
        upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
        request: Request<Body>,
    ) -> Response {
        let path = request.uri().path().to_string();
        let Some(request) = ProxyRequest::from_request(request, &self.mount_prefix) else {
            tracing::debug!(path = %path, mount_prefix = %self.mount_prefix, "Outside mount prefix");
            return ProxyError::NotMounted(path).into_response();
        };

        match upgrade {
            Ok(upgrade) => self.acceptor.accept(upgrade, request).await,
            Err(rejection) if wants_websocket(&request.headers) => {
                tracing::debug!(path = %path, error = %rejection, "WebSocket upgrade rejected");
                match rejection {
                    WebSocketUpgradeRejection::InvalidWebSocketVersionHeader(_) => {
                        let version = request
                            .headers
                            .get(SEC_WEBSOCKET_VERSION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        ProxyError::UnsupportedVersion(version).into_response()
                    }
                    other => other.into_response(),
                }
            }
            Err(_) => self.forwarder.forward(request).await,
        }
    }
}

/// Whether the client asked for a WebSocket, regardless of whether the
/// handshake headers are valid.
fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingForwarder {
        seen: Mutex<Vec<String>>,
    }

    impl RequestForwarder for RecordingForwarder {
        async fn forward(&self, request: ProxyRequest) -> Response {
            self.seen.lock().unwrap().push(request.path_and_query());
            StatusCode::OK.into_response()
        }
    }

    struct StubAcceptor;

    impl UpgradeAcceptor for StubAcceptor {
        async fn accept(&self, _upgrade: WebSocketUpgrade, _request: ProxyRequest) -> Response {
            StatusCode::SWITCHING_PROTOCOLS.into_response()
        }
    }

    async fn run(
        dispatcher: &Dispatcher<RecordingForwarder, StubAcceptor>,
        request: Request<Body>,
    ) -> Response {
        let (mut parts, body) = request.into_parts();
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await;
        dispatcher
            .dispatch(upgrade, Request::from_parts(parts, body))
            .await
    }

    #[tokio::test]
    async fn forwards_plain_requests_below_mount() {
        let dispatcher = Dispatcher::new("/view/1", RecordingForwarder::default(), StubAcceptor);
        let request = Request::builder()
            .uri("/view/1/api/items?page=2")
            .body(Body::empty())
            .unwrap();

        let response = run(&dispatcher, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *dispatcher.forwarder().seen.lock().unwrap(),
            vec!["/api/items?page=2".to_string()]
        );
    }

    #[tokio::test]
    async fn outside_mount_is_not_found() {
        let dispatcher = Dispatcher::new("/view/1", RecordingForwarder::default(), StubAcceptor);
        let request = Request::builder().uri("/elsewhere").body(Body::empty()).unwrap();

        let response = run(&dispatcher, request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(dispatcher.forwarder().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn old_websocket_version_is_upgrade_required() {
        let dispatcher = Dispatcher::new("", RecordingForwarder::default(), StubAcceptor);
        let request = Request::builder()
            .uri("/socket")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "8")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        let response = run(&dispatcher, request).await;

        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert!(dispatcher.forwarder().seen.lock().unwrap().is_empty());
    }
}
