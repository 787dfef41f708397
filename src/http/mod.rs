//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → dispatch.rs (strip mount prefix, upgrade or not?)
//!         → relay.rs (plain HTTP, content.rs for index documents)
//!         → websocket.rs (upgrade, backend connect, session pumps)
//!     → response.rs (hop-by-hop stripping, error mapping)
//!     → Send to client
//! ```

pub mod content;
pub mod dispatch;
pub mod relay;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use dispatch::{Dispatcher, RequestForwarder, UpgradeAcceptor};
pub use request::{MakeRequestUuid, ProxyRequest, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::HttpServer;
