//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Resolve proxy settings and build the relay and the bridge
//! - Create the Axum Router with the single catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Serve until shutdown, then close live WebSocket sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig, ProxySettings};
use crate::http::content::ContentRewriter;
use crate::http::dispatch::Dispatcher;
use crate::http::relay::HttpRelay;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::http::websocket::WebSocketBridge;
use crate::lifecycle::ShutdownSignal;
use crate::session::ConnectionRegistry;

/// How long to wait for cancelled sessions to finish their close handshake.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher<HttpRelay, WebSocketBridge>>,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Arc<ConnectionRegistry>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails when the proxy properties do not resolve.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let ProxySettings {
            backend,
            route,
            mount_prefix,
            index,
            websocket,
        } = config.resolve_settings()?;

        tracing::info!(
            target_uri = %backend.base,
            mount_prefix = %mount_prefix,
            pattern = %route.pattern(),
            replacement = %route.replacement(),
            "Proxy settings resolved"
        );

        let registry = Arc::new(ConnectionRegistry::new());
        let relay = HttpRelay::new(
            backend.clone(),
            route.clone(),
            ContentRewriter::new(index),
            &config.timeouts,
        );
        let bridge = WebSocketBridge::new(backend, route, websocket, Arc::clone(&registry));

        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(mount_prefix, relay, bridge)),
        };
        let router = Self::build_router(state);

        Ok(Self {
            router,
            config,
            registry,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id());

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let registry = Arc::clone(&self.registry);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                let cancelled = registry.cancel_all();
                tracing::info!(sessions = cancelled, "Shutdown signal received");
            })
            .await?;

        let deadline = Instant::now() + SESSION_DRAIN_TIMEOUT;
        while !self.registry.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !self.registry.is_empty() {
            tracing::warn!(sessions = self.registry.len(), "Sessions still open at exit");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Live WebSocket sessions.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

/// Main proxy handler. Hands every request to the dispatcher.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request<Body>,
) -> Response {
    tracing::debug!(
        peer = %peer,
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );
    state.dispatcher.dispatch(upgrade, request).await
}
