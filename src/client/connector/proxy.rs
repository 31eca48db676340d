//! HTTP proxy connector.
//!
//! # Data Flow
//! ```text
//! plaintext target:
//!     prepare: path → absolute URI, Proxy-Authorization on the request
//!     create:  TCP to proxy, requests go over it as-is
//!
//! secure target:
//!     create:  TCP to proxy
//!              → CONNECT host:port (Proxy-Authorization here only)
//!              → 200: detach socket, TLS handshake with target over it
//!              → other: close, ProxyTunnelRejected { status, reason }
//! ```

use async_trait::async_trait;
use http::header::{HeaderValue, HOST, PROXY_AUTHORIZATION};
use http::{HeaderMap, Method};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::client::connector::tcp::TcpConnector;
use crate::client::connector::Connector;
use crate::client::error::ConnectError;
use crate::client::handle::Connection;
use crate::client::protocol::ResponseHeadError;
use crate::client::request::{BasicAuth, ClientRequest};
use crate::net::transport::Stream;

/// Reaches targets through an `http://` proxy.
#[derive(Debug)]
pub struct ProxyConnector {
    tcp: TcpConnector,
    proxy: Url,
    host: String,
    port: u16,
    auth: Option<BasicAuth>,
}

impl ProxyConnector {
    pub fn new(tcp: TcpConnector, proxy: Url, auth: Option<BasicAuth>) -> Result<Self, ConnectError> {
        if proxy.scheme() != "http" {
            return Err(ConnectError::ProxyProtocol(format!(
                "only http proxies are supported, got {}",
                proxy.scheme()
            )));
        }
        let host = proxy
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| ConnectError::ProxyProtocol(format!("proxy URL has no host: {proxy}")))?;
        let port = proxy.port_or_known_default().unwrap_or(80);
        Ok(Self {
            tcp,
            proxy,
            host,
            port,
            auth,
        })
    }

    pub fn proxy(&self) -> &Url {
        &self.proxy
    }

    pub fn proxy_auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    pub fn tcp(&self) -> &TcpConnector {
        &self.tcp
    }

    fn proxy_error(&self, source: std::io::Error) -> ConnectError {
        ConnectError::ProxyConnectFailed {
            proxy: self.proxy.to_string(),
            source,
        }
    }

    async fn tunnel(&self, request: &ClientRequest, tcp: tokio::net::TcpStream) -> Result<Stream, ConnectError> {
        let authority = request.netloc_with_port();
        let mut headers = HeaderMap::new();
        if let Ok(host) = HeaderValue::from_str(&authority) {
            headers.insert(HOST, host);
        }
        if let Some(auth) = &self.auth {
            headers.insert(PROXY_AUTHORIZATION, auth.header_value());
        }
        let connect = ClientRequest {
            method: Method::CONNECT,
            is_secure: false,
            host: self.host.clone(),
            port: self.port,
            path: authority,
            headers,
        };

        let mut conn = Connection::standalone(connect, Stream::from(tcp));
        let exchange = async {
            let head = conn.request().head_bytes();
            conn.write_all(&head).await?;
            conn.flush().await?;
            Ok::<_, ResponseHeadError>(conn.read_response_head().await?)
        };
        let head = match exchange.await {
            Ok(head) => head,
            Err(e) => {
                conn.close();
                return Err(match e {
                    ResponseHeadError::Io(source) => self.proxy_error(source),
                    other => ConnectError::ProxyProtocol(other.to_string()),
                });
            }
        };

        if head.status != 200 {
            tracing::debug!(
                proxy = %self.proxy,
                status = head.status,
                reason = %head.reason,
                "Proxy refused CONNECT"
            );
            conn.close();
            return Err(ConnectError::ProxyTunnelRejected {
                status: head.status,
                reason: head.reason,
            });
        }
        if !conn.protocol().buffered().is_empty() {
            conn.close();
            return Err(ConnectError::ProxyProtocol(
                "proxy sent data after CONNECT response".to_string(),
            ));
        }

        let stream = conn
            .detach()
            .ok_or_else(|| ConnectError::ProxyProtocol("tunnel connection lost".to_string()))?;
        let tcp = stream
            .into_tcp()
            .map_err(|_| ConnectError::ProxyProtocol("tunnel is not a TCP stream".to_string()))?;
        self.tcp.handshake(tcp, &request.key()).await
    }
}

#[async_trait]
impl Connector for ProxyConnector {
    type Transport = Stream;

    fn prepare(&self, request: &mut ClientRequest) {
        if request.is_secure {
            return;
        }
        if !request.path.starts_with("http://") {
            request.path = request.absolute_uri();
        }
        if let Some(auth) = &self.auth {
            request.headers.insert(PROXY_AUTHORIZATION, auth.header_value());
        }
    }

    async fn create(&self, request: &ClientRequest) -> Result<Stream, ConnectError> {
        let tcp = self
            .tcp
            .open_tcp(&self.host, self.port)
            .await
            .map_err(|source| self.proxy_error(source))?;

        if request.is_secure {
            self.tunnel(request, tcp).await
        } else {
            Ok(Stream::from(tcp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn connector(port: u16, auth: Option<BasicAuth>) -> ProxyConnector {
        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        ProxyConnector::new(TcpConnector::default(), url, auth).unwrap()
    }

    #[test]
    fn plaintext_requests_use_absolute_form_and_carry_credentials() {
        let proxy = connector(3128, Some(BasicAuth::new("user", "pass")));
        let mut request = ClientRequest::new(Method::GET, "http://example.com:8080/a?b=1").unwrap();

        proxy.prepare(&mut request);
        proxy.prepare(&mut request);

        assert_eq!(request.path, "http://example.com:8080/a?b=1");
        assert_eq!(request.headers[PROXY_AUTHORIZATION], "Basic dXNlcjpwYXNz");
        assert_eq!(request.key().host, "example.com");
    }

    #[test]
    fn secure_requests_are_left_alone() {
        let proxy = connector(3128, Some(BasicAuth::new("user", "pass")));
        let mut request = ClientRequest::new(Method::GET, "https://example.com/a").unwrap();
        proxy.prepare(&mut request);
        assert_eq!(request.path, "/a");
        assert!(request.headers.get(PROXY_AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn rejected_tunnel_reports_status_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            socket
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            let closed = socket.read(&mut buf).await.unwrap() == 0;
            (head, closed)
        });

        let proxy = connector(port, Some(BasicAuth::new("user", "pass")));
        let request = ClientRequest::new(Method::GET, "https://example.com/").unwrap();
        let err = proxy.create(&request).await.unwrap_err();
        match err {
            ConnectError::ProxyTunnelRejected { status, reason } => {
                assert_eq!(status, 407);
                assert_eq!(reason, "Proxy Authentication Required");
            }
            other => panic!("unexpected error: {other}"),
        }

        let (head, closed) = server.await.unwrap();
        assert!(head.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(head.contains("proxy-authorization: Basic dXNlcjpwYXNz\r\n"));
        assert!(closed);
    }

    #[tokio::test]
    async fn accepted_tunnel_starts_tls_on_the_proxy_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = vec![0u8; 4096];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before CONNECT completed");
                head.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();

            // The next bytes on this socket open the TLS handshake.
            let n = socket.read(&mut buf).await.unwrap();
            let hello = buf[..n].to_vec();
            drop(socket);

            let second = tokio::time::timeout(Duration::from_millis(200), listener.accept())
                .await
                .is_ok();
            (String::from_utf8_lossy(&head).into_owned(), hello, second)
        });

        let proxy = connector(port, None);
        let request = ClientRequest::new(Method::GET, "https://example.com/").unwrap();
        // The fake proxy hangs up mid-handshake.
        let err = proxy.create(&request).await.unwrap_err();
        assert!(matches!(err, ConnectError::ConnectFailed { .. }), "{err}");

        let (head, hello, second) = server.await.unwrap();
        assert!(head.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        // 0x16 is the TLS handshake record type.
        assert_eq!(hello.first(), Some(&0x16));
        assert!(!second, "tunnel opened a second connection");
    }

    #[tokio::test]
    async fn unreachable_proxy_is_proxy_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = connector(port, None);
        let request = ClientRequest::new(Method::GET, "http://example.com/").unwrap();
        assert!(matches!(
            proxy.create(&request).await,
            Err(ConnectError::ProxyConnectFailed { .. })
        ));
    }
}
