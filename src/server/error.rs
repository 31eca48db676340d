//! Server-side error taxonomy.

use http::HeaderMap;

/// A request the parser rejected, answered with `status`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {reason}")]
pub struct ProcessingError {
    pub status: u16,
    pub reason: String,
    /// Extra headers to put on the error response.
    pub headers: HeaderMap,
}

impl ProcessingError {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, reason)
    }

    pub fn invalid_header(name: &str) -> Self {
        Self::bad_request(format!("Invalid HTTP Header: {name}"))
    }
}

/// Failures inside the server protocol and request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed request line, headers, Content-Length or obsolete upgrade.
    #[error("bad request: {0}")]
    ProtocolParse(#[from] ProcessingError),

    /// A handler failed unexpectedly.
    #[error("internal handler fault: {0}")]
    InternalHandlerFault(String),

    /// The handler was cancelled by shutdown.
    #[error("request handler cancelled")]
    HandlerCancelled,

    /// The handler exceeded its deadline.
    #[error("request handler timed out")]
    HandlerTimeout,

    /// The peer went away while the request was being read or answered.
    #[error("client disconnected")]
    ClientDisconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Status for the error page, or `None` when no response should be sent.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServerError::ProtocolParse(e) => Some(e.status),
            ServerError::InternalHandlerFault(_) | ServerError::Io(_) => Some(500),
            ServerError::HandlerTimeout => Some(504),
            ServerError::HandlerCancelled | ServerError::ClientDisconnected => None,
        }
    }
}
