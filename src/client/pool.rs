//! Keep-alive connection pool.
//!
//! # Responsibilities
//! - Park released transports per [`ConnectionKey`] and hand them out again
//! - Decide reuse vs close on release
//! - Evict dead and expired idle transports with a self-rescheduling sweep
//! - Fall back to the connector on a miss, bounded by the connect timeout
//!
//! # Design Decisions
//! - Buckets are stacks: the most recently released transport is reused
//!   first, and every stale entry popped on the way is discarded for good
//! - Bucket map and sweep handle sit behind `parking_lot` mutexes that are
//!   never held across an await; lock order is buckets, then sweeper
//! - Handles and the sweep task hold `Weak` references, so dropping the last
//!   pool clone tears everything down
//!
//! # Data Flow
//! ```text
//! connect(req)
//!     → connector.prepare(req)
//!     → acquire(key) ──hit──► Connection
//!            │miss
//!            ▼
//!       connector.create(req) [connect_timeout] ──► Connection
//!
//! Connection::release
//!     → release(key, transport, protocol, hint)
//!         ├─ close: hint | force_close | framing | unread input | pool closed
//!         └─ keep: reset parser, push (transport, protocol, now), ensure sweep
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::connector::Connector;
use crate::client::error::ConnectError;
use crate::client::handle::{Connection, Release};
use crate::client::key::ConnectionKey;
use crate::client::protocol::ProtocolState;
use crate::client::request::ClientRequest;
use crate::config::ClientConfig;
use crate::net::transport::PoolTransport;
use crate::observability::metrics;

/// Pool behaviour knobs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub connect_timeout: Option<Duration>,
    pub keepalive_timeout: Duration,
    pub force_close: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for PoolSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            keepalive_timeout: config.keepalive_timeout(),
            force_close: config.force_close,
        }
    }
}

struct IdleEntry<T> {
    transport: T,
    protocol: ProtocolState,
    released_at: Instant,
}

struct PoolInner<C: Connector> {
    me: Weak<PoolInner<C>>,
    connector: C,
    settings: PoolSettings,
    buckets: Mutex<HashMap<ConnectionKey, Vec<IdleEntry<C::Transport>>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// A keep-alive pool in front of a [`Connector`]. Cheap to clone.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// An empty pool creating transports through `connector`.
    pub fn new(connector: C, settings: PoolSettings) -> Self {
        let inner = Arc::new_cyclic(|me| PoolInner {
            me: me.clone(),
            connector,
            settings,
            buckets: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        Self { inner }
    }

    /// The transport factory used on a miss.
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// How long an idle transport stays reusable.
    pub fn keepalive_timeout(&self) -> Duration {
        self.inner.settings.keepalive_timeout
    }

    /// Whether every released transport is closed instead of pooled.
    pub fn force_close(&self) -> bool {
        self.inner.settings.force_close
    }

    /// Idle transports parked under `key`.
    pub fn idle_count(&self, key: &ConnectionKey) -> usize {
        self.inner.buckets.lock().get(key).map_or(0, Vec::len)
    }

    /// Whether a bucket exists for `key`; empty buckets are removed.
    pub fn has_bucket(&self, key: &ConnectionKey) -> bool {
        self.inner.buckets.lock().contains_key(key)
    }

    /// Take a reusable idle transport for `key`, if one exists.
    pub fn acquire(&self, key: &ConnectionKey) -> Option<(C::Transport, ProtocolState)> {
        self.inner.acquire(key)
    }

    /// Hand a transport back for a reuse-or-close decision.
    pub fn release(
        &self,
        key: &ConnectionKey,
        transport: C::Transport,
        protocol: ProtocolState,
        should_close: bool,
    ) {
        self.inner.put_back(key, transport, protocol, should_close);
    }

    /// Run one eviction pass now. Returns the delay until the next pass.
    pub fn sweep(&self) -> Option<Duration> {
        self.inner.sweep()
    }

    /// Close every idle transport and stop the sweep.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Get a connection for `request`, reusing an idle transport if possible.
    pub async fn connect(
        &self,
        mut request: ClientRequest,
    ) -> Result<Connection<C::Transport>, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::PoolClosed);
        }
        self.inner.connector.prepare(&mut request);
        let key = request.key();

        if let Some((transport, protocol)) = self.inner.acquire(&key) {
            metrics::record_acquire(true);
            tracing::debug!(key = %key, "Reusing pooled connection");
            return Ok(Connection::new(request, transport, protocol, self.release_ref()));
        }
        metrics::record_acquire(false);

        let create = self.inner.connector.create(&request);
        let result = match self.inner.settings.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, create).await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::ConnectTimeout { key: key.clone() }),
            },
            None => create.await,
        };

        match result {
            Ok(transport) => {
                tracing::debug!(key = %key, "Opened new connection");
                Ok(Connection::new(
                    request,
                    transport,
                    ProtocolState::new(),
                    self.release_ref(),
                ))
            }
            Err(e) => {
                metrics::record_connect_error(e.kind());
                tracing::debug!(key = %key, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    fn release_ref(&self) -> Weak<dyn Release<C::Transport>> {
        let weak: Weak<PoolInner<C>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<C: Connector> PoolInner<C> {
    fn acquire(&self, key: &ConnectionKey) -> Option<(C::Transport, ProtocolState)> {
        let now = Instant::now();
        let keepalive = self.settings.keepalive_timeout;
        let mut buckets = self.buckets.lock();
        let bucket = buckets.get_mut(key)?;

        let mut found = None;
        while let Some(entry) = bucket.pop() {
            if !entry.transport.is_connected() {
                tracing::trace!(key = %key, "Discarding disconnected idle connection");
                continue;
            }
            if now.duration_since(entry.released_at) >= keepalive {
                tracing::trace!(key = %key, "Discarding expired idle connection");
                entry.transport.close();
                continue;
            }
            found = Some((entry.transport, entry.protocol));
            break;
        }

        if bucket.is_empty() {
            buckets.remove(key);
        }
        metrics::record_idle_connections(buckets.values().map(Vec::len).sum());
        found
    }

    fn put_back(
        &self,
        key: &ConnectionKey,
        transport: C::Transport,
        mut protocol: ProtocolState,
        should_close: bool,
    ) {
        let close = should_close
            || self.settings.force_close
            || protocol.should_close()
            || protocol.has_unconsumed_input()
            || self.closed.load(Ordering::Acquire);

        let mut buckets = self.buckets.lock();
        if close {
            transport.close();
            if buckets.get(key).is_some_and(Vec::is_empty) {
                buckets.remove(key);
            }
            metrics::record_release(false);
            return;
        }

        protocol.reset_parser();
        buckets.entry(key.clone()).or_default().push(IdleEntry {
            transport,
            protocol,
            released_at: Instant::now(),
        });
        metrics::record_release(true);
        metrics::record_idle_connections(buckets.values().map(Vec::len).sum());
        self.ensure_sweeper();
    }

    /// Schedule the sweep unless one is pending. Called with buckets locked.
    fn ensure_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available; idle connections will not be swept");
            return;
        };
        let delay = ceil_secs(self.settings.keepalive_timeout);
        *sweeper = Some(runtime.spawn(run_sweeper(self.me.clone(), delay)));
    }

    fn sweep(&self) -> Option<Duration> {
        self.evict(false)
    }

    /// One eviction pass. The background sweeper passes `from_sweeper` so
    /// it can deregister itself under the bucket lock when nothing remains;
    /// a manual pass leaves the scheduled sweeper alone.
    fn evict(&self, from_sweeper: bool) -> Option<Duration> {
        let now = Instant::now();
        let keepalive = self.settings.keepalive_timeout;
        let mut buckets = self.buckets.lock();
        let mut min_remaining: Option<Duration> = None;

        buckets.retain(|key, bucket| {
            let entries = std::mem::take(bucket);
            for entry in entries {
                if !entry.transport.is_connected() {
                    continue;
                }
                let age = now.duration_since(entry.released_at);
                if age >= keepalive {
                    tracing::debug!(key = %key, "Closing expired idle connection");
                    entry.transport.close();
                    continue;
                }
                let remaining = keepalive - age;
                min_remaining = Some(min_remaining.map_or(remaining, |m| m.min(remaining)));
                bucket.push(entry);
            }
            !bucket.is_empty()
        });
        metrics::record_idle_connections(buckets.values().map(Vec::len).sum());

        let next = min_remaining.map(ceil_secs);
        if next.is_none() && from_sweeper {
            *self.sweeper.lock() = None;
        }
        next
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<_> = {
            let mut buckets = self.buckets.lock();
            buckets.drain().collect()
        };
        for (_, bucket) in drained {
            for entry in bucket {
                entry.transport.close();
            }
        }
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        metrics::record_idle_connections(0);
    }
}

impl<C: Connector> Release<C::Transport> for PoolInner<C> {
    fn release(
        &self,
        key: &ConnectionKey,
        transport: C::Transport,
        protocol: ProtocolState,
        should_close: bool,
    ) {
        self.put_back(key, transport, protocol, should_close);
    }
}

impl<C: Connector> Drop for PoolInner<C> {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let idle: usize = self.buckets.get_mut().values().map(Vec::len).sum();
        if idle > 0 {
            tracing::warn!(idle, "Unclosed connection pool");
        }
        self.close();
    }
}

async fn run_sweeper<C: Connector>(pool: Weak<PoolInner<C>>, mut delay: Duration) {
    loop {
        tokio::time::sleep(delay).await;
        let Some(pool) = pool.upgrade() else {
            return;
        };
        match pool.evict(true) {
            Some(next) => delay = next,
            None => return,
        }
    }
}

/// Round up to whole seconds so sweeps land on a coarse grid.
fn ceil_secs(duration: Duration) -> Duration {
    let whole = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    Duration::from_secs(whole)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct MockTransport {
        id: usize,
        connected: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl PoolTransport for MockTransport {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn close(self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockConnector {
        created: AtomicUsize,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn create(&self, _request: &ClientRequest) -> Result<MockTransport, ConnectError> {
            let id = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(MockTransport {
                id,
                connected: Arc::new(AtomicBool::new(true)),
                closed: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    struct Flags {
        connected: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    fn transport(id: usize) -> (MockTransport, Flags) {
        let connected = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        (
            MockTransport {
                id,
                connected: connected.clone(),
                closed: closed.clone(),
            },
            Flags { connected, closed },
        )
    }

    fn key() -> ConnectionKey {
        ConnectionKey::new("localhost", 8080, false)
    }

    fn pool(settings: PoolSettings) -> ConnectionPool<MockConnector> {
        ConnectionPool::new(MockConnector::default(), settings)
    }

    fn request() -> ClientRequest {
        ClientRequest::new(http::Method::GET, "http://localhost:8080/").unwrap()
    }

    #[tokio::test]
    async fn release_then_acquire_returns_same_transport() {
        let pool = pool(PoolSettings::default());
        let (t, _flags) = transport(7);

        pool.release(&key(), t, ProtocolState::new(), false);
        assert_eq!(pool.idle_count(&key()), 1);

        let (t, _) = pool.acquire(&key()).unwrap();
        assert_eq!(t.id, 7);
        assert!(!pool.has_bucket(&key()));
        assert!(pool.acquire(&key()).is_none());
        pool.close();
    }

    #[tokio::test]
    async fn acquire_is_lifo_and_discards_stale_entries() {
        let pool = pool(PoolSettings::default());
        let (valid1, _p1) = transport(1);
        let (stale, stale_flags) = transport(2);
        let (valid2, _p3) = transport(3);

        pool.release(&key(), valid1, ProtocolState::new(), false);
        pool.release(&key(), stale, ProtocolState::new(), false);
        pool.release(&key(), valid2, ProtocolState::new(), false);
        stale_flags.connected.store(false, Ordering::SeqCst);

        assert_eq!(pool.acquire(&key()).unwrap().0.id, 3);
        assert_eq!(pool.idle_count(&key()), 2);
        assert_eq!(pool.acquire(&key()).unwrap().0.id, 1);
        assert_eq!(pool.idle_count(&key()), 0);
        assert!(pool.acquire(&key()).is_none());
        pool.close();
    }

    #[tokio::test]
    async fn release_closes_when_reuse_is_unsafe() {
        let pool = pool(PoolSettings::default());

        let (t, flags) = transport(1);
        pool.release(&key(), t, ProtocolState::new(), true);
        assert!(flags.closed.load(Ordering::SeqCst));

        let (t, flags) = transport(2);
        let mut protocol = ProtocolState::new();
        protocol.set_framing(crate::client::protocol::ResponseFraming::Close);
        pool.release(&key(), t, protocol, false);
        assert!(flags.closed.load(Ordering::SeqCst));

        let (t, flags) = transport(3);
        let mut protocol = ProtocolState::new();
        protocol.set_framing(crate::client::protocol::ResponseFraming::Incomplete);
        pool.release(&key(), t, protocol, false);
        assert!(flags.closed.load(Ordering::SeqCst));

        assert!(!pool.has_bucket(&key()));
        pool.close();
    }

    #[tokio::test]
    async fn force_close_never_pools() {
        let pool = pool(PoolSettings {
            force_close: true,
            ..PoolSettings::default()
        });
        let (t, flags) = transport(1);
        pool.release(&key(), t, ProtocolState::new(), false);
        assert!(flags.closed.load(Ordering::SeqCst));
        assert_eq!(pool.idle_count(&key()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_closes_expired_entries() {
        let pool = pool(PoolSettings {
            keepalive_timeout: Duration::from_secs(2),
            ..PoolSettings::default()
        });
        let (t, flags) = transport(1);
        pool.release(&key(), t, ProtocolState::new(), false);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(flags.closed.load(Ordering::SeqCst));
        assert!(pool.acquire(&key()).is_none());
        assert!(pool.inner.sweeper.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reschedules_for_younger_entries() {
        let pool = pool(PoolSettings {
            keepalive_timeout: Duration::from_secs(10),
            ..PoolSettings::default()
        });
        let (old, old_flags) = transport(1);
        pool.release(&key(), old, ProtocolState::new(), false);
        tokio::time::advance(Duration::from_millis(4500)).await;
        let (young, young_flags) = transport(2);
        pool.release(&key(), young, ProtocolState::new(), false);
        tokio::time::advance(Duration::from_millis(5500)).await;

        // old is 10s old, young has 4.5s left, rounded up to 5s
        assert_eq!(pool.sweep(), Some(Duration::from_secs(5)));
        assert!(old_flags.closed.load(Ordering::SeqCst));
        assert!(!young_flags.closed.load(Ordering::SeqCst));
        assert_eq!(pool.idle_count(&key()), 1);
        pool.close();
        assert!(young_flags.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sweep_keeps_the_scheduled_sweeper() {
        let pool = pool(PoolSettings {
            keepalive_timeout: Duration::from_secs(10),
            ..PoolSettings::default()
        });
        let (t, flags) = transport(1);
        pool.release(&key(), t, ProtocolState::new(), false);
        flags.connected.store(false, Ordering::SeqCst);

        // Nothing is retained, but the background sweeper is still pending.
        assert_eq!(pool.sweep(), None);
        assert!(pool.inner.sweeper.lock().is_some());

        // It deregisters itself once its own pass finds nothing.
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(pool.inner.sweeper.lock().is_none());
        pool.close();
    }

    #[tokio::test]
    async fn connect_reuses_released_connection() {
        let pool = pool(PoolSettings::default());

        let mut conn = pool.connect(request()).await.unwrap();
        conn.release();
        let mut again = pool.connect(request()).await.unwrap();
        assert_eq!(again.transport().unwrap().id, 0);
        again.close();

        assert_eq!(pool.connector().created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(&key()), 0);
        pool.close();
    }

    #[tokio::test]
    async fn closed_pool_rejects_connect_and_closes_releases() {
        let pool = pool(PoolSettings::default());
        let mut conn = pool.connect(request()).await.unwrap();
        pool.close();

        assert!(pool.is_closed());
        assert!(matches!(
            pool.connect(request()).await,
            Err(ConnectError::PoolClosed)
        ));
        conn.release();
        assert_eq!(pool.idle_count(&key()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_classified() {
        struct Hanging;

        #[async_trait]
        impl Connector for Hanging {
            type Transport = MockTransport;

            async fn create(&self, _: &ClientRequest) -> Result<MockTransport, ConnectError> {
                std::future::pending().await
            }
        }

        let pool = ConnectionPool::new(
            Hanging,
            PoolSettings {
                connect_timeout: Some(Duration::from_millis(100)),
                ..PoolSettings::default()
            },
        );
        let err = pool.connect(request()).await.unwrap_err();
        assert!(matches!(err, ConnectError::ConnectTimeout { .. }));
    }

    #[test]
    fn ceil_secs_rounds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(4500)), Duration::from_secs(5));
        assert_eq!(ceil_secs(Duration::from_secs(3)), Duration::from_secs(3));
    }
}
