//! Client-side error taxonomy.

use std::io;

use crate::client::key::ConnectionKey;
use crate::net::tls::TlsError;

/// Failures surfaced by `ConnectionPool::connect`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The overall connect attempt exceeded `connect_timeout`.
    #[error("Connection timeout to host {key}")]
    ConnectTimeout { key: ConnectionKey },

    /// Every candidate address failed; wraps the last OS error.
    #[error("Cannot connect to host {key}: {source}")]
    ConnectFailed {
        key: ConnectionKey,
        #[source]
        source: io::Error,
    },

    /// The proxy itself could not be reached.
    #[error("Cannot connect to proxy {proxy}: {source}")]
    ProxyConnectFailed {
        proxy: String,
        #[source]
        source: io::Error,
    },

    /// The proxy answered CONNECT with something other than 200.
    #[error("Proxy refused tunnel: {status} {reason}")]
    ProxyTunnelRejected { status: u16, reason: String },

    /// The proxy reply to CONNECT could not be parsed.
    #[error("Malformed proxy response: {0}")]
    ProxyProtocol(String),

    /// The TLS context could not be built.
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Connection pool is closed")]
    PoolClosed,
}

impl ConnectError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::ConnectTimeout { .. } => "connect_timeout",
            ConnectError::ConnectFailed { .. } => "connect_failed",
            ConnectError::ProxyConnectFailed { .. } => "proxy_connect_failed",
            ConnectError::ProxyTunnelRejected { .. } => "proxy_tunnel_rejected",
            ConnectError::ProxyProtocol(_) => "proxy_protocol",
            ConnectError::Tls(_) => "tls",
            ConnectError::PoolClosed => "pool_closed",
        }
    }
}

/// Problems building a client request target.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
}
