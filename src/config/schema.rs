//! Configuration schema definitions.
//!
//! The file layer of the configuration. Server settings are plain typed
//! tables; proxy settings are string properties resolved later through
//! [`LayeredConfig`](crate::config::providers::LayeredConfig).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration for plain HTTP forwarding.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-deployment property store. Highest precedence.
    pub properties: HashMap<String, String>,

    /// Container-level init parameters. Consulted when a property is absent.
    pub init_params: HashMap<String, String>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for HTTP forwarding.
///
/// The WebSocket connect bound is a proxy property (`connectTimeout`),
/// not part of this table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend TCP connect timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the backend to produce response headers, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_property_tables() {
        let raw = r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [properties]
            targetUri = "http://backend:2004"

            [init_params]
            uriReplacePattern = "/proxied/"
            bufferSize = "4096"
        "#;

        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.properties["targetUri"], "http://backend:2004");
        assert_eq!(config.init_params["bufferSize"], "4096");
        // Unspecified tables fall back to defaults
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.observability.log_format, "pretty");
    }
}
