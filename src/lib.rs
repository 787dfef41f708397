//! HTTP and WebSocket reverse proxy library.
//!
//! Relays plain HTTP requests and full-duplex WebSocket sessions to a
//! single backend, rewriting a path fragment on the way in and the base
//! URL of index documents on the way out.

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;
pub mod session;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
