//! Bridged WebSocket sessions.
//!
//! # Data Flow
//! ```text
//! client leg (axum)                      backend leg (tungstenite)
//!     │                                          ▲
//!     └──▶ pump (Inbound) ──▶ Frame ─────────────┘
//!     ┌─── pump (Outbound) ◀── Frame ◀───────────┐
//!     ▼                                          │
//! client leg                               backend leg
//!
//! registry.rs tracks both pumps of every session
//! ```
//!
//! # Design Decisions
//! - Frames are relayed whole; the payload buffer is moved, never copied
//! - Ping and pong are answered by each transport and not relayed
//! - A session is removed once both directions have finished

pub mod frame;
pub mod pump;
pub mod registry;

pub use frame::{CloseInfo, Frame, WireMessage};
pub use pump::{pump, PumpExit, RelayLimits};
pub use registry::{ConnectionRegistry, SessionError, SessionId, SessionRecord, SessionState, Side};
