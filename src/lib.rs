//! HTTP/1.1 connection lifecycle engine.
//!
//! A client-side keep-alive connection pool with DNS caching and proxy
//! tunnelling, and a server-side protocol that parses pipelined requests,
//! runs handlers under bounded concurrency and keeps responses in order.

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use client::{pool_from_config, ConnectError, Connection, ConnectionPool};
pub use config::EngineConfig;
pub use lifecycle::Shutdown;
pub use server::HttpServer;
