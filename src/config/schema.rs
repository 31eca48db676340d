//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Client-side connection pool settings.
    pub client: ClientConfig,

    /// Server-side protocol settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Address family used when resolving host names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Accept IPv4 and IPv6 results.
    Any,
    /// IPv4 only.
    #[default]
    Ipv4,
    /// IPv6 only.
    Ipv6,
}

impl AddressFamily {
    /// Whether an address belongs to this family.
    pub fn admits(&self, addr: &std::net::SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

/// Connection pool and connector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on the whole connect attempt, in milliseconds. Unbounded if absent.
    pub connect_timeout_ms: Option<u64>,

    /// How long an idle pooled connection stays reusable, in seconds.
    pub keepalive_timeout_secs: u64,

    /// Close every connection on release instead of pooling it.
    pub force_close: bool,

    /// Verify server certificates.
    pub verify_ssl: bool,

    /// PEM bundle of trust anchors replacing the built-in roots.
    pub ca_file: Option<String>,

    /// Resolve and cache host names instead of letting connect resolve them.
    pub resolve: bool,

    /// Address family for resolution.
    pub address_family: AddressFamily,

    /// Optional HTTP proxy.
    pub proxy: Option<ProxyConfig>,

    /// Connect through a unix domain socket at this path instead of TCP.
    pub unix_socket: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: None,
            keepalive_timeout_secs: 30,
            force_close: false,
            verify_ssl: true,
            ca_file: None,
            resolve: false,
            address_family: AddressFamily::Ipv4,
            proxy: None,
            unix_socket: None,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }
}

/// HTTP proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Proxy URL, e.g. "http://proxy.local:3128". Only http proxies are supported.
    pub url: String,

    /// Optional basic-auth login.
    #[serde(default)]
    pub login: Option<String>,

    /// Optional basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
}

/// Server protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Idle keep-alive timeout in seconds (nginx uses 75).
    pub keepalive_timeout_secs: u64,

    /// Handlers allowed to run concurrently on one connection.
    pub max_concurrent_handlers: usize,

    /// Total time spent draining an uncompleted request, in seconds.
    pub lingering_time_secs: f64,

    /// Longest single wait for more bytes while draining, in seconds.
    pub lingering_timeout_secs: f64,

    /// Per-request handler deadline in seconds; answered with 504 on expiry.
    pub handler_timeout_secs: Option<f64>,

    /// How long graceful shutdown waits for in-flight handlers, in seconds.
    pub shutdown_timeout_secs: f64,

    /// Embed error traces in error pages.
    pub debug: bool,

    /// Emit an access log record per response.
    pub access_log: bool,

    /// Longest accepted request line or header line.
    pub max_line_size: usize,

    /// Longest accepted header value.
    pub max_field_size: usize,

    /// Largest accepted header block in bytes.
    pub max_headers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            keepalive_timeout_secs: 75,
            max_concurrent_handlers: 2,
            lingering_time_secs: 30.0,
            lingering_timeout_secs: 5.0,
            handler_timeout_secs: None,
            shutdown_timeout_secs: 15.0,
            debug: false,
            access_log: true,
            max_line_size: 8190,
            max_field_size: 8190,
            max_headers: 32768,
        }
    }
}

impl ServerConfig {
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub fn lingering_time(&self) -> Duration {
        Duration::from_secs_f64(self.lingering_time_secs.max(0.0))
    }

    pub fn lingering_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.lingering_timeout_secs.max(0.0))
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_timeout_secs.max(0.0))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
