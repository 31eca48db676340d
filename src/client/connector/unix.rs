//! Unix domain socket connector.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UnixStream;

use crate::client::connector::Connector;
use crate::client::error::ConnectError;
use crate::client::request::ClientRequest;
use crate::net::transport::Stream;

/// Connects every request to one socket path; the URL host is only used
/// for the `Host` header and the pool key.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for UnixConnector {
    type Transport = Stream;

    async fn create(&self, request: &ClientRequest) -> Result<Stream, ConnectError> {
        UnixStream::connect(&self.path)
            .await
            .map(Stream::from)
            .map_err(|source| ConnectError::ConnectFailed {
                key: request.key(),
                source,
            })
    }
}
