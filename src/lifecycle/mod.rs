//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → cancel WebSocket sessions (1001)
//!             → drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup in main: config, logging, metrics, listener, server
//! - Shutdown has a drain deadline: sessions still open are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
