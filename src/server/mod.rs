//! Server-side HTTP/1.1 protocol.
//!
//! # Data Flow
//! ```text
//! accept.rs (listener, connection ids, shutdown)
//!     → protocol.rs (one task per connection)
//!         → parser.rs  header block → RequestMessage
//!         → payload.rs body bytes → Payload stream
//!         → handler.rs RequestHandler::handle (one task per in-flight request)
//!         → response.rs Response / error pages
//!         → writer.rs  responses in request order
//! ```
//!
//! # Design Decisions
//! - Handlers may run concurrently on one connection, bounded per connection
//! - Every failure path ends in an error page or a silent close, never a
//!   half-written response on a kept-alive connection

pub mod accept;
pub mod error;
pub mod handler;
pub mod message;
pub mod parser;
pub mod payload;
pub mod protocol;
pub mod response;
mod writer;

pub use accept::HttpServer;
pub use error::{ProcessingError, ServerError};
pub use handler::{AccessLog, NotFoundHandler, RequestHandler};
pub use message::RequestMessage;
pub use parser::{HttpRequestParser, RequestParser};
pub use payload::{Payload, PayloadError};
pub use protocol::{serve_connection, ProtocolSettings, ServerContext};
pub use response::{error_response, Response};
