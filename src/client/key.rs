//! Pool bucket keys.

use std::fmt;

/// Identifies a pool bucket: `(host, port, is_secure)`.
///
/// Unix-domain connections are keyed the same way, so two socket paths used
/// under the same nominal host/port/secure triple share a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
}

impl ConnectionKey {
    /// Key for `host:port` over plaintext or TLS.
    pub fn new(host: impl Into<String>, port: u16, is_secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            is_secure,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ssl:{}", self.host, self.port, self.is_secure)
    }
}
