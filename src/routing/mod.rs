//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path info, query)
//!     → rewrite.rs (pattern → replacement on the backend target)
//!     → matcher.rs (is this an index document?)
//!     → Return: backend target URI + index flag
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always produces the same target

pub mod matcher;
pub mod rewrite;

pub use matcher::IndexRewriteRule;
pub use rewrite::{rewrite, RouteRule};
