//! Transport factories used by the pool on a miss.
//!
//! # Variants
//! - [`TcpConnector`]: resolve, try each address in order, optional TLS
//! - [`ProxyConnector`]: through an HTTP proxy, CONNECT tunnel for TLS
//! - [`UnixConnector`]: a unix domain socket path (unix only)
//!
//! [`AnyConnector`] picks one of them from the client configuration.

pub mod proxy;
pub mod resolver;
pub mod tcp;
#[cfg(unix)]
pub mod unix;

use async_trait::async_trait;

use crate::client::error::ConnectError;
use crate::client::request::{BasicAuth, ClientRequest};
use crate::config::ClientConfig;
use crate::net::transport::{PoolTransport, Stream};

pub use proxy::ProxyConnector;
pub use resolver::{ResolvedHost, Resolver};
pub use tcp::TcpConnector;
#[cfg(unix)]
pub use unix::UnixConnector;

/// Produces new transports for a request target.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: PoolTransport;

    /// Adjust the request before the pool looks up or creates a transport.
    fn prepare(&self, _request: &mut ClientRequest) {}

    /// Open a fresh transport for `request`.
    async fn create(&self, request: &ClientRequest) -> Result<Self::Transport, ConnectError>;
}

/// Whichever connector the configuration selects.
#[derive(Debug)]
pub enum AnyConnector {
    Tcp(TcpConnector),
    Proxy(ProxyConnector),
    #[cfg(unix)]
    Unix(UnixConnector),
}

impl AnyConnector {
    /// Build from configuration: unix socket, then proxy, then direct TCP.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConnectError> {
        #[cfg(unix)]
        {
            if let Some(path) = &config.unix_socket {
                return Ok(AnyConnector::Unix(UnixConnector::new(path)));
            }
        }

        let tcp = TcpConnector::from_config(config)?;
        match &config.proxy {
            Some(proxy) => {
                let url = url::Url::parse(&proxy.url)
                    .map_err(|e| ConnectError::ProxyProtocol(format!("invalid proxy URL: {e}")))?;
                let auth = proxy.login.as_ref().map(|login| {
                    BasicAuth::new(login.clone(), proxy.password.clone().unwrap_or_default())
                });
                Ok(AnyConnector::Proxy(ProxyConnector::new(tcp, url, auth)?))
            }
            None => Ok(AnyConnector::Tcp(tcp)),
        }
    }
}

#[async_trait]
impl Connector for AnyConnector {
    type Transport = Stream;

    fn prepare(&self, request: &mut ClientRequest) {
        match self {
            AnyConnector::Tcp(c) => c.prepare(request),
            AnyConnector::Proxy(c) => c.prepare(request),
            #[cfg(unix)]
            AnyConnector::Unix(c) => c.prepare(request),
        }
    }

    async fn create(&self, request: &ClientRequest) -> Result<Stream, ConnectError> {
        match self {
            AnyConnector::Tcp(c) => c.create(request).await,
            AnyConnector::Proxy(c) => c.create(request).await,
            #[cfg(unix)]
            AnyConnector::Unix(c) => c.create(request).await,
        }
    }
}
