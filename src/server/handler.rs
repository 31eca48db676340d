//! Request handler and access log seams.

use std::time::Duration;

use async_trait::async_trait;

use crate::server::error::ServerError;
use crate::server::message::RequestMessage;
use crate::server::payload::Payload;
use crate::server::response::Response;

/// Application callback producing one response per request.
///
/// Returning an error is answered with an error page whose status comes
/// from [`ServerError::status`]; a panic is answered with a 500.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        message: &RequestMessage,
        payload: &mut Payload,
    ) -> Result<Response, ServerError>;
}

/// Answers every request with `404 Page Not Found!` and closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl RequestHandler for NotFoundHandler {
    async fn handle(
        &self,
        _message: &RequestMessage,
        _payload: &mut Payload,
    ) -> Result<Response, ServerError> {
        Ok(Response::new(404)
            .with_body("text/plain; charset=utf-8", "Page Not Found!")
            .with_keep_alive(false))
    }
}

/// Hook called after every response, including error pages.
///
/// `message` is `None` when the request head could not be parsed.
pub trait AccessLog: Send + Sync + 'static {
    fn log(&self, message: Option<&RequestMessage>, response: &Response, elapsed: Duration);
}
