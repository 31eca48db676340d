//! Per-connection HTTP/1.1 server protocol.
//!
//! # Responsibilities
//! - Split the inbound byte stream into pipelined request heads and bodies
//! - Dispatch requests to handler tasks, at most `max_concurrent_handlers`
//!   at a time, queueing the rest in arrival order
//! - Keep responses in request order (see `writer.rs`)
//! - Close idle connections after the keep-alive timeout
//! - Drain uncompleted request bodies before closing (lingering close)
//! - Drain in-flight handlers on shutdown, then cancel the stragglers
//!
//! # Data Flow
//! ```text
//! socket read half
//!     → buffer → header block? → parse → dispatch ─┬→ spawn handler task
//!                                                  └→ pipeline queue → idle handler
//!              → BodyDecoder → PayloadSender ──────→ handler's Payload
//! handler task
//!     → RequestHandler::handle → Response → writer slot → socket write half
//! ```
//!
//! # States
//! ```text
//! AwaitingRequest → Dispatched | Queued → StreamingPayload → ResponseComplete
//!                                                         ↘ NextRequest | Closing
//! ```
//!
//! # Design Decisions
//! - One task owns the read half; handlers never touch the socket directly
//! - Body chunks go through a bounded channel; a full channel pauses reading
//! - Once `closing` is set no further request heads are parsed, but requests
//!   already dispatched or queued are still answered

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::FutureExt;
use http::header::CONTENT_LENGTH;
use http::Method;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError, OwnedPermit};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::chunked::Dechunker;
use crate::net::connection::ConnectionId;
use crate::observability::access::TracingAccessLog;
use crate::observability::metrics;
use crate::server::error::{ProcessingError, ServerError};
use crate::server::handler::{AccessLog, RequestHandler};
use crate::server::message::RequestMessage;
use crate::server::parser::{HttpRequestParser, RequestParser};
use crate::server::payload::{BodyDecoder, Item, Payload, PayloadError, PayloadSender};
use crate::server::response::{error_response, Response};
use crate::server::writer::{Outgoing, ResponseWriter, Slot};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Timing and concurrency knobs for one connection.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub keepalive_timeout: Duration,
    pub max_concurrent_handlers: usize,
    pub lingering_time: Duration,
    pub lingering_timeout: Duration,
    pub handler_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    /// Embed error details in error pages.
    pub debug: bool,
}

impl From<&ServerConfig> for ProtocolSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            keepalive_timeout: config.keepalive_timeout(),
            max_concurrent_handlers: config.max_concurrent_handlers.max(1),
            lingering_time: config.lingering_time(),
            lingering_timeout: config.lingering_timeout(),
            handler_timeout: config.handler_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            debug: config.debug,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Everything a connection needs besides its socket. Shared by all
/// connections of a server.
pub struct ServerContext {
    handler: Arc<dyn RequestHandler>,
    parser: Arc<dyn RequestParser>,
    access_log: Option<Arc<dyn AccessLog>>,
    settings: ProtocolSettings,
}

impl ServerContext {
    /// Context built from server configuration, logging access through
    /// tracing when `access_log` is set.
    pub fn new(config: &ServerConfig, handler: Arc<dyn RequestHandler>) -> Self {
        let access_log: Option<Arc<dyn AccessLog>> = if config.access_log {
            Some(Arc::new(TracingAccessLog))
        } else {
            None
        };
        Self {
            handler,
            parser: Arc::new(HttpRequestParser::from(config)),
            access_log,
            settings: ProtocolSettings::from(config),
        }
    }

    /// Replace the request-head parser.
    pub fn with_parser(mut self, parser: Arc<dyn RequestParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace or disable the access log hook.
    pub fn with_access_log(mut self, access_log: Option<Arc<dyn AccessLog>>) -> Self {
        self.access_log = access_log;
        self
    }

    /// Override the per-connection timing and concurrency settings.
    pub fn with_settings(mut self, settings: ProtocolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Per-connection settings in effect.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    fn log_access(&self, message: Option<&RequestMessage>, response: &Response, elapsed: Duration) {
        if let Some(log) = &self.access_log {
            log.log(message, response, elapsed);
        }
    }

    /// Error page for `err`, or `None` when nothing should be sent.
    fn error_page(&self, err: &ServerError) -> Option<Response> {
        let status = err.status()?;
        let trace = self.settings.debug.then(|| format!("{err:?}"));
        let response = match err {
            ServerError::ProtocolParse(e) => {
                let mut page = error_response(status, Some(e.reason.as_str()), trace.as_deref());
                for (name, value) in &e.headers {
                    page.headers.append(name.clone(), value.clone());
                }
                page
            }
            _ => error_response(status, None, trace.as_deref()),
        };
        Some(response)
    }
}

/// State shared between the connection task, its handlers and its writer.
#[derive(Debug)]
pub(crate) struct Shared {
    id: ConnectionId,
    closing: AtomicBool,
    busy: AtomicUsize,
    last_activity: Mutex<Instant>,
}

impl Shared {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self {
            id,
            closing: AtomicBool::new(false),
            busy: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn set_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Counts a handler as running a request until dropped.
struct Busy<'a>(&'a Shared);

impl<'a> Busy<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.busy.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.busy.fetch_sub(1, Ordering::SeqCst);
        self.0.touch();
    }
}

/// A parsed request on its way to a handler.
struct Dispatch {
    message: RequestMessage,
    payload: Payload,
    slot: Slot,
    started: Instant,
}

type PipelineQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Dispatch>>>;

/// The body currently being read off the socket.
struct BodyFeed {
    decoder: BodyDecoder,
    sender: PayloadSender,
    /// A chunk the payload channel had no room for; reading pauses until
    /// it is delivered.
    pending: Option<Bytes>,
    done: bool,
}

impl BodyFeed {
    fn push(&mut self, chunk: Bytes) {
        match self.sender.try_send(chunk.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.pending = Some(chunk),
            // Handler dropped its payload; keep decoding to stay framed.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    Draining(Instant),
    Forced,
}

enum Event {
    Read(std::io::Result<usize>),
    Capacity(Option<OwnedPermit<Item>>),
    HandlerDone(Result<(), JoinError>),
    WriterDone,
    KeepAlive,
    Shutdown,
    ForceClose,
    Stalled,
}

/// Serve one connection until it closes.
pub async fn serve_connection<S>(
    stream: S,
    ctx: Arc<ServerContext>,
    mut shutdown: ShutdownSignal,
    id: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, write) = tokio::io::split(stream);
    let shared = Arc::new(Shared::new(id));
    let (writer, mut writer_task) = ResponseWriter::spawn(write, shared.clone());
    let mut proto = Protocol::new(ctx, shared, writer);
    let mut handlers: JoinSet<()> = JoinSet::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut writer_done = false;

    tracing::debug!(connection_id = %id, "Connection opened");

    loop {
        if proto.shared.is_closing() {
            proto.close_queue();
        }
        if proto.is_finished(&handlers) {
            break;
        }
        if buf.capacity() - buf.len() < 1024 {
            buf.reserve(READ_BUFFER_SIZE);
        }

        let can_read = proto.wants_input();
        let capacity = proto.pending_sender();
        let waiting = capacity.is_some();
        let keepalive = proto.keepalive_deadline();
        let force_at = match proto.shutdown {
            ShutdownState::Draining(at) => Some(at),
            _ => None,
        };
        let running = proto.shutdown == ShutdownState::Running;

        let event = tokio::select! {
            res = reader.read_buf(&mut buf), if can_read => Event::Read(res),
            permit = wait_capacity(capacity), if waiting => Event::Capacity(permit),
            Some(joined) = handlers.join_next() => Event::HandlerDone(joined),
            _ = &mut writer_task, if !writer_done => Event::WriterDone,
            _ = sleep_until(keepalive) => Event::KeepAlive,
            _ = shutdown.recv(), if running => Event::Shutdown,
            _ = sleep_until(force_at) => Event::ForceClose,
            else => Event::Stalled,
        };

        match event {
            Event::Read(Ok(0)) => proto.on_eof(),
            Event::Read(Ok(_)) => proto.ingest(&mut buf, &mut handlers),
            Event::Read(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                proto.shared.set_closing();
                proto.on_eof();
            }
            Event::Capacity(permit) => {
                proto.on_capacity(permit);
                proto.ingest(&mut buf, &mut handlers);
            }
            Event::HandlerDone(Ok(())) => {}
            Event::HandlerDone(Err(e)) if e.is_cancelled() => {
                tracing::debug!(connection_id = %id, "Request handler cancelled");
            }
            Event::HandlerDone(Err(e)) => {
                tracing::error!(connection_id = %id, error = %e, "Request handler task failed");
                proto.shared.set_closing();
            }
            Event::WriterDone => {
                writer_done = true;
                proto.shared.set_closing();
            }
            Event::KeepAlive => proto.on_keepalive(),
            Event::Shutdown => proto.on_shutdown(),
            Event::ForceClose => {
                tracing::warn!(
                    connection_id = %id,
                    remaining = handlers.len(),
                    "Shutdown timeout reached, cancelling handlers"
                );
                proto.shutdown = ShutdownState::Forced;
                handlers.abort_all();
            }
            Event::Stalled => proto.shared.set_closing(),
        }
    }

    let forced = proto.shutdown == ShutdownState::Forced;
    drop(proto);
    if !writer_done {
        if forced {
            writer_task.abort();
        }
        let _ = writer_task.await;
    }
    tracing::debug!(connection_id = %id, "Connection finished");
}

async fn wait_capacity(sender: Option<mpsc::Sender<Item>>) -> Option<OwnedPermit<Item>> {
    match sender {
        Some(sender) => sender.reserve_owned().await.ok(),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Connection-task state that is not borrowed across the select.
struct Protocol {
    ctx: Arc<ServerContext>,
    shared: Arc<Shared>,
    writer: ResponseWriter,
    queue_tx: Option<mpsc::UnboundedSender<Dispatch>>,
    queue_rx: PipelineQueue,
    feed: Option<BodyFeed>,
    /// CONNECT or Upgrade: the rest of the stream is one body.
    upgraded: bool,
    eof: bool,
    shutdown: ShutdownState,
}

impl Protocol {
    fn new(ctx: Arc<ServerContext>, shared: Arc<Shared>, writer: ResponseWriter) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            shared,
            writer,
            queue_tx: Some(queue_tx),
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            feed: None,
            upgraded: false,
            eof: false,
            shutdown: ShutdownState::Running,
        }
    }

    fn is_finished(&self, handlers: &JoinSet<()>) -> bool {
        (self.shared.is_closing() || self.eof) && handlers.is_empty()
    }

    fn wants_input(&self) -> bool {
        if self.eof || self.feed.as_ref().is_some_and(|f| f.pending.is_some()) {
            return false;
        }
        self.feed.is_some() || !self.shared.is_closing()
    }

    fn pending_sender(&self) -> Option<mpsc::Sender<Item>> {
        self.feed
            .as_ref()
            .filter(|f| f.pending.is_some())
            .map(|f| f.sender.sender())
    }

    fn keepalive_deadline(&self) -> Option<Instant> {
        if self.shared.is_closing() || self.eof {
            return None;
        }
        Some(self.shared.last_activity() + self.ctx.settings.keepalive_timeout)
    }

    /// Idle handlers stop waiting once the queue is closed and empty.
    fn close_queue(&mut self) {
        self.queue_tx = None;
    }

    fn finish_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.sender.finish();
        }
    }

    /// Consume buffered bytes: body data for the current request, then as
    /// many complete request heads as the buffer holds.
    fn ingest(&mut self, buf: &mut BytesMut, handlers: &mut JoinSet<()>) {
        loop {
            if let Some(feed) = self.feed.as_mut() {
                if feed.pending.is_some() {
                    return;
                }
                match feed.decoder.decode(buf) {
                    Ok((chunk, done)) => {
                        if !chunk.is_empty() {
                            feed.push(chunk);
                        }
                        if !done {
                            return;
                        }
                        feed.done = true;
                        if feed.pending.is_none() {
                            self.finish_feed();
                        }
                        continue;
                    }
                    Err(err) => {
                        tracing::debug!(
                            connection_id = %self.shared.id(),
                            error = %err,
                            "Malformed request body"
                        );
                        if let Some(feed) = self.feed.take() {
                            feed.sender.fail(err);
                        }
                        self.shared.set_closing();
                        buf.clear();
                        return;
                    }
                }
            }

            if self.shared.is_closing() || self.upgraded || self.eof {
                return;
            }

            let blank = buf.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
            let _ = buf.split_to(blank);

            let Some(end) = find_head_end(buf) else {
                let limit = self.ctx.parser.max_head_size();
                if buf.len() > limit {
                    let err = ProcessingError::bad_request(format!(
                        "Got more than {limit} bytes when reading headers"
                    ));
                    self.reject(err.into(), Instant::now());
                    buf.clear();
                }
                return;
            };

            let head = buf.split_to(end);
            let started = Instant::now();
            match self.parse(&head) {
                Ok(message) => self.dispatch(message, handlers, started),
                Err(err) => {
                    self.reject(err, started);
                    buf.clear();
                    return;
                }
            }
        }
    }

    fn parse(&self, head: &[u8]) -> Result<RequestMessage, ServerError> {
        let message = self.ctx.parser.parse_message(head)?;
        if message.headers.contains_key("sec-websocket-key1") {
            return Err(ProcessingError::invalid_header("Sec-WebSocket-Key1").into());
        }
        if message.headers.contains_key(CONTENT_LENGTH) && content_length(&message).is_none() {
            return Err(ProcessingError::invalid_header("Content-Length").into());
        }
        Ok(message)
    }

    /// Answer an unparseable request with an error page and stop reading.
    fn reject(&mut self, err: ServerError, started: Instant) {
        self.shared.set_closing();
        self.close_queue();

        match &err {
            ServerError::ProtocolParse(e) => tracing::debug!(
                connection_id = %self.shared.id(),
                status = e.status,
                reason = %e.reason,
                "Rejected request"
            ),
            other => tracing::error!(
                connection_id = %self.shared.id(),
                error = %other,
                "Error parsing request"
            ),
        }

        let Some(response) = self.ctx.error_page(&err) else {
            return;
        };
        if let Some(slot) = self.writer.reserve() {
            let _ = slot.send(Outgoing {
                bytes: response.to_bytes(),
                close: true,
            });
        }
        metrics::record_response(response.status);
        self.ctx.log_access(None, &response, started.elapsed());
    }

    fn open_feed(&mut self, decoder: BodyDecoder) -> Payload {
        let (sender, payload) = Payload::channel();
        self.feed = Some(BodyFeed {
            decoder,
            sender,
            pending: None,
            done: false,
        });
        payload
    }

    fn dispatch(&mut self, message: RequestMessage, handlers: &mut JoinSet<()>, started: Instant) {
        let payload = if message.chunked {
            self.open_feed(BodyDecoder::Chunked(Dechunker::new()))
        } else if let Some(length) = content_length(&message).filter(|&n| n > 0) {
            self.open_feed(BodyDecoder::Length(length))
        } else if message.method == Method::CONNECT || message.upgrade {
            self.upgraded = true;
            self.open_feed(BodyDecoder::UntilEof)
        } else {
            Payload::empty()
        };

        let Some(slot) = self.writer.reserve() else {
            self.shared.set_closing();
            return;
        };

        tracing::trace!(
            connection_id = %self.shared.id(),
            method = %message.method,
            path = %message.path,
            "Request parsed"
        );

        let dispatch = Dispatch {
            message,
            payload,
            slot,
            started,
        };
        self.shared.touch();

        if handlers.len() < self.ctx.settings.max_concurrent_handlers {
            handlers.spawn(handler_loop(
                self.ctx.clone(),
                self.shared.clone(),
                self.queue_rx.clone(),
                dispatch,
            ));
        } else if let Some(queue) = &self.queue_tx {
            let _ = queue.send(dispatch);
        }
    }

    fn on_capacity(&mut self, permit: Option<OwnedPermit<Item>>) {
        let Some(feed) = self.feed.as_mut() else {
            return;
        };
        if let (Some(chunk), Some(permit)) = (feed.pending.take(), permit) {
            permit.send(Ok(chunk));
        }
        if feed.done {
            self.finish_feed();
        }
    }

    fn on_eof(&mut self) {
        self.eof = true;
        self.close_queue();

        let Some(mut feed) = self.feed.take() else {
            return;
        };
        if feed.decoder.completes_at_eof() {
            feed.done = true;
            if feed.pending.is_some() {
                self.feed = Some(feed);
            } else {
                feed.sender.finish();
            }
        } else {
            tracing::debug!(connection_id = %self.shared.id(), "Connection closed mid-body");
            feed.sender.fail(PayloadError::Incomplete);
        }
    }

    fn on_keepalive(&mut self) {
        if self.shared.busy() > 0 {
            self.shared.touch();
            return;
        }
        tracing::debug!(connection_id = %self.shared.id(), "Keep-alive timeout, closing");
        self.shared.set_closing();
        self.close_queue();
    }

    fn on_shutdown(&mut self) {
        tracing::debug!(connection_id = %self.shared.id(), "Shutting down connection");
        self.shared.set_closing();
        self.close_queue();
        self.shutdown = ShutdownState::Draining(Instant::now() + self.ctx.settings.shutdown_timeout);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(message: &RequestMessage) -> Option<u64> {
    message
        .headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Runs requests for one handler slot: the one it was spawned with, then
/// queued ones while the connection stays alive.
async fn handler_loop(
    ctx: Arc<ServerContext>,
    shared: Arc<Shared>,
    queue: PipelineQueue,
    first: Dispatch,
) {
    let mut next = Some(first);
    while let Some(dispatch) = next.take() {
        let keep_alive = {
            let _busy = Busy::enter(&shared);
            handle_request(&ctx, &shared, dispatch).await
        };
        if !keep_alive {
            break;
        }
        next = queue.lock().await.recv().await;
    }
}

/// Run the handler for one request and hand its response to the writer.
/// Returns whether the connection may carry further requests.
async fn handle_request(ctx: &ServerContext, shared: &Shared, dispatch: Dispatch) -> bool {
    let Dispatch {
        message,
        mut payload,
        slot,
        started,
    } = dispatch;
    let id = shared.id();

    let call = AssertUnwindSafe(ctx.handler.handle(&message, &mut payload)).catch_unwind();
    let outcome = match ctx.settings.handler_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Ok(Err(ServerError::HandlerTimeout))),
        None => call.await,
    };
    let outcome = outcome.unwrap_or_else(|panic| {
        Err(ServerError::InternalHandlerFault(panic_message(panic.as_ref())))
    });

    let mut response = match outcome {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ServerError::HandlerCancelled => {
                    tracing::debug!(connection_id = %id, "Request handler cancelled")
                }
                ServerError::ClientDisconnected => {
                    tracing::debug!(connection_id = %id, "Ignored premature client disconnection")
                }
                ServerError::HandlerTimeout => {
                    tracing::warn!(connection_id = %id, path = %message.path, "Request handler timed out")
                }
                ServerError::ProtocolParse(e) => {
                    tracing::debug!(connection_id = %id, status = e.status, "Handler rejected request")
                }
                ServerError::InternalHandlerFault(_) | ServerError::Io(_) => {
                    tracing::error!(connection_id = %id, error = %err, "Error handling request")
                }
            }
            match ctx.error_page(&err) {
                Some(page) => page,
                None => {
                    shared.set_closing();
                    return false;
                }
            }
        }
    };

    let uncompleted = !payload.is_eof();
    if uncompleted {
        tracing::debug!(connection_id = %id, "Uncompleted request");
        shared.set_closing();
    }

    let keep_alive = response.keep_alive && message.keep_alive() && !uncompleted;
    response.keep_alive = keep_alive;

    let sent = slot.send(Outgoing {
        bytes: response.to_bytes(),
        close: !keep_alive,
    });
    if sent.is_err() {
        tracing::debug!(connection_id = %id, "Ignored premature client disconnection");
        shared.set_closing();
    }
    metrics::record_response(response.status);
    ctx.log_access(Some(&message), &response, started.elapsed());

    if uncompleted {
        linger(&mut payload, &ctx.settings, id).await;
    }
    if !keep_alive {
        shared.set_closing();
    }
    keep_alive && sent.is_ok()
}

/// Read and discard the rest of the body so the peer is not reset while
/// still sending.
async fn linger(payload: &mut Payload, settings: &ProtocolSettings, id: ConnectionId) {
    if settings.lingering_time.is_zero() {
        return;
    }
    tracing::debug!(connection_id = %id, "Start lingering close timer");

    let deadline = Instant::now() + settings.lingering_time;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wait = (deadline - now).min(settings.lingering_timeout);
        match tokio::time::timeout(wait, payload.read_any()).await {
            Ok(Ok(Some(_))) => continue,
            _ => break,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
