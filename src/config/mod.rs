//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → settings.rs resolves proxy keys through providers.rs:
//!         [properties] → [init_params] → built-in defaults
//!     → ProxySettings shared via Arc to the relay and the bridge
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any configuration error is fatal at startup

pub mod loader;
pub mod providers;
pub mod schema;
pub mod settings;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use providers::{LayeredConfig, MapSource, PropertySource};
pub use schema::{ListenerConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig};
pub use settings::{BackendTarget, ProxySettings, WebSocketSettings};
