//! Client request targets.
//!
//! Only the parts the connection layer needs: where to connect, the request
//! line, and the headers the proxy connector may rewrite.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderValue, HOST};
use http::{HeaderMap, Method};
use url::{Host, Url};

use crate::client::error::RequestError;
use crate::client::key::ConnectionKey;

/// Basic credentials, e.g. for a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub login: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// `Basic <base64(login:password)>`.
    pub fn encode(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.login, self.password))
        )
    }

    /// The encoded credentials as a `Proxy-Authorization` value.
    pub fn header_value(&self) -> HeaderValue {
        // base64 output and the prefix are always visible ASCII
        HeaderValue::from_str(&self.encode()).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

/// The request a connection is being acquired for.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub is_secure: bool,
    pub host: String,
    pub port: u16,
    /// Request-target as written on the request line.
    pub path: String,
    pub headers: HeaderMap,
}

impl ClientRequest {
    /// Build a request from an `http://` or `https://` URL.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let parsed = Url::parse(url)?;
        let is_secure = match parsed.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(RequestError::UnsupportedScheme(other.to_string())),
        };
        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(RequestError::MissingHost(url.to_string())),
        };
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if is_secure { 443 } else { 80 });

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        let mut request = Self {
            method,
            is_secure,
            host,
            port,
            path,
            headers: HeaderMap::new(),
        };
        if let Ok(value) = HeaderValue::from_str(&request.netloc()) {
            request.headers.insert(HOST, value);
        }
        Ok(request)
    }

    /// The pool bucket this request connects through.
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.host.clone(), self.port, self.is_secure)
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure {
            "https"
        } else {
            "http"
        }
    }

    /// `host:port`, always with the port, as CONNECT expects.
    pub fn netloc_with_port(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// `host` or `host:port` when the port is not the scheme default.
    pub fn netloc(&self) -> String {
        let host = self.bracketed_host();
        let default_port = if self.is_secure { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// `scheme://netloc/path`, the form used when talking to a proxy.
    pub fn absolute_uri(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.netloc(), self.path)
    }

    /// Serialized request line and headers, terminated by the blank line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.path).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_and_default_port() {
        let req = ClientRequest::new(Method::GET, "https://example.com/a/b?x=1").unwrap();
        assert_eq!(req.key(), ConnectionKey::new("example.com", 443, true));
        assert_eq!(req.path, "/a/b?x=1");
        assert_eq!(req.netloc(), "example.com");
        assert_eq!(req.headers[HOST], "example.com");
    }

    #[test]
    fn absolute_uri_keeps_explicit_port() {
        let req = ClientRequest::new(Method::GET, "http://127.0.0.1:8080/status").unwrap();
        assert_eq!(req.absolute_uri(), "http://127.0.0.1:8080/status");
        let head = String::from_utf8(req.head_bytes()).unwrap();
        assert!(head.starts_with("GET /status HTTP/1.1\r\nhost: 127.0.0.1:8080\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn ipv6_hosts_are_bracketed_in_netloc() {
        let req = ClientRequest::new(Method::GET, "http://[::1]:9000/").unwrap();
        assert_eq!(req.host, "::1");
        assert_eq!(req.netloc(), "[::1]:9000");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            ClientRequest::new(Method::GET, "ftp://example.com/"),
            Err(RequestError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn basic_auth_encoding() {
        let auth = BasicAuth::new("user", "pass");
        assert_eq!(auth.encode(), "Basic dXNlcjpwYXNz");
    }
}
