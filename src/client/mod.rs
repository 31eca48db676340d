//! Client side: keep-alive connection pool and transport factories.
//!
//! # Data Flow
//! ```text
//! ClientRequest (host, port, secure)
//!     → pool.rs (acquire idle transport for ConnectionKey)
//!         └─ miss → connector/ (tcp | proxy tunnel | unix) → new transport
//!     → handle.rs (Connection: active until release / close / detach)
//!     → caller writes request, reads response, records framing
//!     → Connection::release → pool.rs (reuse or close)
//! ```
//!
//! # Design Decisions
//! - Framing state travels with the transport ([`ProtocolState`]) so the
//!   pool can refuse to reuse a half-read or close-delimited connection
//! - Connectors are a trait with an associated transport type; the pool is
//!   generic over it, which keeps mock transports trivial in tests

pub mod connector;
pub mod error;
pub mod handle;
pub mod key;
pub mod pool;
pub mod protocol;
pub mod request;

pub use connector::{AnyConnector, Connector, ProxyConnector, TcpConnector};
#[cfg(unix)]
pub use connector::UnixConnector;
pub use error::{ConnectError, RequestError};
pub use handle::{Connection, HandleState};
pub use key::ConnectionKey;
pub use pool::{ConnectionPool, PoolSettings};
pub use protocol::{ProtocolState, ResponseFraming, ResponseHead};
pub use request::{BasicAuth, ClientRequest};

use crate::config::ClientConfig;

/// Build a pool with the connector selected by `config`.
pub fn pool_from_config(config: &ClientConfig) -> Result<ConnectionPool<AnyConnector>, ConnectError> {
    let connector = AnyConnector::from_config(config)?;
    Ok(ConnectionPool::new(connector, PoolSettings::from(config)))
}
