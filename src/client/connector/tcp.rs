//! Direct TCP connector with optional TLS.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig as TlsClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::client::connector::resolver::{ResolvedHost, Resolver};
use crate::client::connector::Connector;
use crate::client::error::ConnectError;
use crate::client::key::ConnectionKey;
use crate::client::request::ClientRequest;
use crate::config::{AddressFamily, ClientConfig};
use crate::net::tls::{self, TlsError, Trust};
use crate::net::transport::Stream;

/// Connects straight to the request target.
#[derive(Debug)]
pub struct TcpConnector {
    verify_ssl: bool,
    trust: Trust,
    tls: OnceLock<Arc<TlsClientConfig>>,
    resolver: Resolver,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(true, false, AddressFamily::Ipv4)
    }
}

impl TcpConnector {
    /// Connector with default trust, or no verification when `verify_ssl`
    /// is false.
    pub fn new(verify_ssl: bool, resolve: bool, family: AddressFamily) -> Self {
        Self {
            verify_ssl,
            trust: if verify_ssl { Trust::Default } else { Trust::Insecure },
            tls: OnceLock::new(),
            resolver: Resolver::new(resolve, family),
        }
    }

    /// Build from the client section, loading `ca_file` if given.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TlsError> {
        let trust = Trust::from_settings(config.verify_ssl, config.ca_file.as_deref().map(Path::new))?;
        Ok(Self {
            verify_ssl: config.verify_ssl,
            trust,
            tls: OnceLock::new(),
            resolver: Resolver::new(config.resolve, config.address_family),
        })
    }

    /// Use a caller-built TLS context. Not allowed with verification off.
    pub fn with_tls_config(mut self, config: Arc<TlsClientConfig>) -> Result<Self, TlsError> {
        if !self.verify_ssl {
            return Err(TlsError::ConflictingTrust);
        }
        self.tls = OnceLock::from(config);
        Ok(self)
    }

    /// Whether server certificates are verified.
    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    /// Address family candidates are filtered by.
    pub fn family(&self) -> AddressFamily {
        self.resolver.family()
    }

    /// Whether resolutions are cached.
    pub fn resolve(&self) -> bool {
        self.resolver.is_enabled()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Snapshot of the resolution cache.
    pub fn resolved_hosts(&self) -> Vec<((String, u16), Vec<ResolvedHost>)> {
        self.resolver.resolved_hosts()
    }

    /// Drop one cached resolution, or all of them with `None`.
    pub fn clear_resolved_hosts(&self, key: Option<(&str, u16)>) {
        self.resolver.clear_resolved_hosts(key);
    }

    /// The TLS context, built on first use.
    pub fn tls_config(&self) -> Result<Arc<TlsClientConfig>, TlsError> {
        if let Some(config) = self.tls.get() {
            return Ok(config.clone());
        }
        let config = tls::client_config(&self.trust)?;
        // A concurrent builder may have won; keep whichever landed first.
        Ok(self.tls.get_or_init(|| config).clone())
    }

    /// Connect to the first reachable address of `host:port`.
    pub(crate) async fn open_tcp(&self, host: &str, port: u16) -> std::io::Result<TcpStream> {
        let candidates = self.resolver.resolve(host, port).await?;
        let mut last_error = None;

        for candidate in candidates {
            match TcpStream::connect(candidate.addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(address = %candidate.addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no addresses for {host}"))
        }))
    }

    /// Start TLS on an established socket, naming `key.host` as the server.
    pub(crate) async fn handshake(
        &self,
        tcp: TcpStream,
        key: &ConnectionKey,
    ) -> Result<Stream, ConnectError> {
        let connector = TlsConnector::from(self.tls_config()?);
        let server_name = ServerName::try_from(key.host.clone()).map_err(|e| {
            ConnectError::ConnectFailed {
                key: key.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            }
        })?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| ConnectError::ConnectFailed {
                key: key.clone(),
                source,
            })?;
        Ok(Stream::from(tls))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = Stream;

    async fn create(&self, request: &ClientRequest) -> Result<Stream, ConnectError> {
        let key = request.key();
        let tcp = self
            .open_tcp(&request.host, request.port)
            .await
            .map_err(|source| ConnectError::ConnectFailed {
                key: key.clone(),
                source,
            })?;

        if request.is_secure {
            self.handshake(tcp, &key).await
        } else {
            Ok(Stream::from(tcp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::default();

        let request = ClientRequest::new(http::Method::GET, &format!("http://127.0.0.1:{port}/")).unwrap();
        let stream = connector.create(&request).await.unwrap();
        assert!(!stream.is_secure());
    }

    #[tokio::test]
    async fn refused_connection_wraps_os_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = ClientRequest::new(http::Method::GET, &format!("http://127.0.0.1:{port}/")).unwrap();
        let err = TcpConnector::default().create(&request).await.unwrap_err();
        match err {
            ConnectError::ConnectFailed { key, source } => {
                assert_eq!(key.port, port);
                assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_context_conflicts_with_disabled_verification() {
        let config = tls::client_config(&Trust::Default).unwrap();
        let insecure = TcpConnector::new(false, false, AddressFamily::Ipv4);
        assert!(matches!(
            insecure.with_tls_config(config.clone()),
            Err(TlsError::ConflictingTrust)
        ));
        assert!(TcpConnector::default().with_tls_config(config).is_ok());
    }

    #[test]
    fn tls_context_is_built_once() {
        let connector = TcpConnector::default();
        let first = connector.tls_config().unwrap();
        let second = connector.tls_config().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
