//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server side:
//!     listener.rs (accept loop, connection limits)
//!     → connection.rs (connection id, tracking for graceful shutdown)
//!     → server protocol
//!
//! Client side:
//!     tls.rs (client context: strict, custom roots, or insecure)
//!     → transport.rs (Stream: TCP, TLS over TCP, unix; liveness probe)
//!     → connection pool
//!
//! Both:
//!     chunked.rs (incremental chunked transfer decoding)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One stream enum instead of boxed trait objects keeps the pool generic
//!   code monomorphic

pub mod chunked;
pub mod connection;
pub mod listener;
pub mod tls;
pub mod transport;
