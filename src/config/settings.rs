//! Proxy settings resolved from the layered property chain.
//!
//! Precedence: per-deployment `[properties]` → `[init_params]` → built-in
//! defaults. Anything malformed here is a startup error.

use std::time::Duration;

use url::Url;

use crate::config::loader::ConfigError;
use crate::config::providers::{LayeredConfig, MapSource};
use crate::config::schema::ProxyConfig;
use crate::routing::{IndexRewriteRule, RouteRule};

pub const TARGET_URI: &str = "targetUri";
pub const URI_REPLACE_PATTERN: &str = "uriReplacePattern";
pub const URI_REPLACE_VALUE: &str = "uriReplaceValue";
pub const MOUNT_PREFIX: &str = "mountPrefix";
pub const INDEX_PREFIX: &str = "indexPrefix";
pub const BUFFER_SIZE: &str = "bufferSize";
pub const MAX_IDLE_TIME: &str = "maxIdleTime";
pub const MAX_TEXT_MESSAGE_SIZE: &str = "maxTextMessageSize";
pub const MAX_BINARY_MESSAGE_SIZE: &str = "maxBinaryMessageSize";
pub const MIN_VERSION: &str = "minVersion";
pub const CONNECT_TIMEOUT: &str = "connectTimeout";

/// Placeholder backend. Real deployments always set `targetUri`.
pub const DEFAULT_TARGET_URI: &str = "http://127.0.0.1:2004";

const DEFAULTS_SOURCE: &str = "defaults";

/// Built-in defaults, the lowest layer of the chain.
pub fn default_source() -> MapSource {
    MapSource::from_pairs(
        DEFAULTS_SOURCE,
        &[
            (TARGET_URI, DEFAULT_TARGET_URI),
            (URI_REPLACE_PATTERN, "/proxied/"),
            (URI_REPLACE_VALUE, "/"),
            (MOUNT_PREFIX, ""),
            (INDEX_PREFIX, "/ui/"),
            (BUFFER_SIZE, "8192"),
            (CONNECT_TIMEOUT, "3000"),
        ],
    )
}

/// Backend location derived from `targetUri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    /// Base URI without trailing slash, prefixed to every HTTP path.
    pub base: String,
    pub host: String,
    pub port: u16,
}

impl BackendTarget {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: TARGET_URI.to_string(),
            value: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_string()))?;

        Ok(Self {
            base: raw.trim_end_matches('/').to_string(),
            host,
            port,
        })
    }

    /// `host:port` authority, used as the forwarded `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// WebSocket transport tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketSettings {
    /// Client leg write buffer size in bytes.
    pub buffer_size: usize,
    /// Close a session after this long without a frame in either direction.
    pub max_idle_time: Option<Duration>,
    pub max_text_message_size: Option<usize>,
    pub max_binary_message_size: Option<usize>,
    /// Minimum accepted `Sec-WebSocket-Version`.
    pub min_version: Option<u8>,
    /// Bound on the backend WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            max_idle_time: None,
            max_text_message_size: None,
            max_binary_message_size: None,
            min_version: None,
            connect_timeout: Duration::from_millis(3000),
        }
    }
}

/// Everything the proxy needs at runtime, resolved once at startup.
#[derive(Debug)]
pub struct ProxySettings {
    pub backend: BackendTarget,
    pub route: RouteRule,
    /// Prefix the proxy is mounted under, without trailing slash.
    pub mount_prefix: String,
    pub index: IndexRewriteRule,
    pub websocket: WebSocketSettings,
}

impl ProxySettings {
    /// Resolve settings from a property chain.
    pub fn resolve(chain: &LayeredConfig) -> Result<Self, ConfigError> {
        tracing::debug!(keys = ?chain.keys(), "Resolving proxy properties");

        let target = chain
            .lookup(TARGET_URI)
            .map(|r| {
                if r.source == DEFAULTS_SOURCE {
                    tracing::warn!(
                        target_uri = %r.value,
                        "targetUri not configured, using placeholder backend"
                    );
                }
                r.value
            })
            .unwrap_or_else(|| DEFAULT_TARGET_URI.to_string());
        let backend = BackendTarget::parse(&target)?;

        let pattern = chain.get(URI_REPLACE_PATTERN).unwrap_or_default();
        let replacement = chain.get(URI_REPLACE_VALUE).unwrap_or_default();
        let route = RouteRule::new(pattern.clone(), replacement).map_err(|e| {
            ConfigError::InvalidValue {
                key: URI_REPLACE_PATTERN.to_string(),
                value: pattern,
                reason: e.to_string(),
            }
        })?;

        let mount_prefix = normalize_mount_prefix(&chain.get(MOUNT_PREFIX).unwrap_or_default())?;

        let index_prefix = chain
            .get(INDEX_PREFIX)
            .unwrap_or_else(|| crate::routing::matcher::DEFAULT_INDEX_PREFIX.to_string());
        if !index_prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: INDEX_PREFIX.to_string(),
                value: index_prefix,
                reason: "must start with '/'".to_string(),
            });
        }

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            buffer_size: chain
                .get_parsed(BUFFER_SIZE)?
                .unwrap_or(defaults.buffer_size),
            max_idle_time: chain
                .get_parsed::<u64>(MAX_IDLE_TIME)?
                .map(Duration::from_millis),
            max_text_message_size: chain.get_parsed(MAX_TEXT_MESSAGE_SIZE)?,
            max_binary_message_size: chain.get_parsed(MAX_BINARY_MESSAGE_SIZE)?,
            min_version: chain.get_parsed(MIN_VERSION)?,
            connect_timeout: chain
                .get_parsed::<u64>(CONNECT_TIMEOUT)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
        };

        Ok(Self {
            backend,
            route,
            mount_prefix,
            index: IndexRewriteRule::new(index_prefix),
            websocket,
        })
    }
}

impl ProxyConfig {
    /// The property chain for this configuration.
    pub fn property_chain(&self) -> LayeredConfig {
        LayeredConfig::new()
            .with_source(MapSource::new("properties", self.properties.clone()))
            .with_source(MapSource::new("init_params", self.init_params.clone()))
            .with_source(default_source())
    }

    /// Resolve runtime proxy settings.
    pub fn resolve_settings(&self) -> Result<ProxySettings, ConfigError> {
        ProxySettings::resolve(&self.property_chain())
    }
}

fn normalize_mount_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.is_empty() && !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidValue {
            key: MOUNT_PREFIX.to_string(),
            value: raw.to_string(),
            reason: "must be empty or start with '/'".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
