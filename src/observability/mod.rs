//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client, server, net:
//!     → tracing events with connection_id / key / status fields
//!     → metrics.rs (pool and server counters, gauges)
//! server protocol, after every response:
//!     → access.rs (one record per request)
//!
//! Consumers:
//!     → stdout subscriber installed by logging.rs (human or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields rather than formatted strings
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - The binary decides what to install; the library only emits

pub mod access;
pub mod logging;
pub mod metrics;
