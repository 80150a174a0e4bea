use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pool::{AdmissionPermit, HostKey, PoolConfig};
use crate::transport::{Connection, TransportError};
use crate::{Request, Response};

/// An open connection together with the admission slot it occupies.
///
/// Whoever owns a `PooledConnection` owns the slot: the pool while the
/// connection is idle, a request task while it is leased. Dropping it closes
/// the connection first and then returns the slot.
#[derive(Debug)]
pub struct PooledConnection {
    connection: Box<dyn Connection>,
    permit: AdmissionPermit,
    uses: usize,
}

impl PooledConnection {
    /// Bind a freshly opened connection to its admission slot
    #[must_use]
    pub fn new(connection: Box<dyn Connection>, permit: AdmissionPermit) -> Self {
        Self {
            connection,
            permit,
            uses: 0,
        }
    }

    /// The host this connection talks to
    #[must_use]
    pub const fn key(&self) -> &HostKey {
        self.permit.key()
    }

    /// Number of requests sent over this connection so far
    #[must_use]
    pub const fn uses(&self) -> usize {
        self.uses
    }

    /// Whether the underlying connection accepts another request
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        self.connection.is_reusable()
    }

    /// Send a request over the connection
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the exchange fails
    pub async fn send(&mut self, request: &Request) -> Result<Response, TransportError> {
        self.uses += 1;
        self.connection.send(request).await
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // The permit is a later field and is released after this
        self.connection.close();
    }
}

#[derive(Debug)]
struct IdleConnection {
    connection: PooledConnection,
    since: Instant,
}

/// Keep-alive connections waiting to be reused, partitioned by [`HostKey`].
///
/// Lookups are LIFO: the most recently returned connection is handed out
/// first, so rarely used connections age out and get evicted.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: DashMap<HostKey, Vec<IdleConnection>>,
    config: Arc<PoolConfig>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create an empty pool
    #[must_use]
    pub fn new(config: Arc<PoolConfig>) -> Self {
        Self {
            idle: DashMap::new(),
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Take the most recently released idle connection for `key`.
    ///
    /// Expired or broken connections found on the way are closed.
    #[must_use]
    pub fn acquire_idle(&self, key: &HostKey) -> Option<PooledConnection> {
        let mut stale = Vec::new();
        let found = {
            let mut idle = self.idle.get_mut(key)?;
            loop {
                match idle.pop() {
                    Some(entry) if self.is_expired(&entry) || !entry.connection.is_reusable() => {
                        stale.push(entry);
                    }
                    Some(entry) => break Some(entry.connection),
                    None => break None,
                }
            }
        };

        if !stale.is_empty() {
            log::debug!("Discarded {} stale idle connection(s) to {key}", stale.len());
        }
        found
    }

    /// Return a connection after a request.
    ///
    /// The connection is kept for reuse when `keep_alive` is set, keep-alive
    /// is enabled in the configuration, the connection is still usable and
    /// the per-host idle cap is not reached. Otherwise it is closed and its
    /// slot released. Returns `true` if the connection was pooled.
    pub fn release(&self, connection: PooledConnection, keep_alive: bool) -> bool {
        if !keep_alive
            || !self.config.keep_alive
            || !connection.is_reusable()
            || self.closed.load(Ordering::Acquire)
        {
            return false;
        }

        let max_idle = self.config.max_idle_per_host;
        let mut idle = self.idle.entry(connection.key().clone()).or_default();
        if max_idle != 0 && idle.len() >= max_idle {
            drop(idle);
            log::debug!("Idle cap reached for {}, closing connection", connection.key());
            return false;
        }

        idle.push(IdleConnection {
            connection,
            since: Instant::now(),
        });
        true
    }

    /// Close connections that have been idle for longer than `older_than`,
    /// and those that are no longer usable. Returns how many were closed.
    pub fn evict_idle(&self, older_than: Duration) -> usize {
        let mut evicted = Vec::new();
        for mut entry in self.idle.iter_mut() {
            let (keep, stale): (Vec<_>, Vec<_>) = std::mem::take(entry.value_mut())
                .into_iter()
                .partition(|idle| {
                    idle.since.elapsed() < older_than && idle.connection.is_reusable()
                });
            *entry.value_mut() = keep;
            evicted.extend(stale);
        }
        self.idle.retain(|_, idle| !idle.is_empty());

        let count = evicted.len();
        drop(evicted);
        if count > 0 {
            log::debug!("Evicted {count} idle connection(s)");
        }
        count
    }

    /// Close every idle connection and stop accepting new ones.
    /// Returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);

        let mut closed = Vec::new();
        for mut entry in self.idle.iter_mut() {
            closed.append(entry.value_mut());
        }
        self.idle.clear();
        closed.len()
    }

    /// Number of idle connections to `key`
    #[must_use]
    pub fn idle_count(&self, key: &HostKey) -> usize {
        self.idle.get(key).map_or(0, |idle| idle.len())
    }

    /// Number of idle connections across all hosts
    #[must_use]
    pub fn total_idle(&self) -> usize {
        self.idle.iter().map(|entry| entry.value().len()).sum()
    }

    /// Periodically evict connections idle for longer than the configured
    /// idle timeout, until `token` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        token: CancellationToken,
        runtime: &Handle,
    ) -> JoinHandle<()> {
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.evict_idle(self.config.idle_connection_timeout);
                    }
                }
            }
            log::debug!("Idle sweeper stopped");
        })
    }

    fn is_expired(&self, idle: &IdleConnection) -> bool {
        let timeout = self.config.idle_connection_timeout;
        !timeout.is_zero() && idle.since.elapsed() >= timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::AdmissionController;
    use crate::test_utils::MockTransport;
    use crate::transport::TransportFactory;

    struct Fixture {
        admission: Arc<AdmissionController>,
        pool: Arc<ConnectionPool>,
        transport: MockTransport,
    }

    impl Fixture {
        fn new(config: PoolConfig) -> Self {
            let config = Arc::new(config);
            Self {
                admission: AdmissionController::new(Arc::clone(&config)),
                pool: Arc::new(ConnectionPool::new(config)),
                transport: MockTransport::new(),
            }
        }

        async fn connect(&self, key: &HostKey) -> PooledConnection {
            let permit = self.admission.try_admit(key).unwrap();
            let connection = self.transport.open(key).await.unwrap();
            PooledConnection::new(connection, permit)
        }
    }

    fn key() -> HostKey {
        HostKey::new("http", "example.com", 80)
    }

    #[tokio::test]
    async fn test_idle_connection_keeps_slot() {
        let fixture = Fixture::new(PoolConfig {
            max_connections_total: 1,
            ..PoolConfig::default()
        });

        let connection = fixture.connect(&key()).await;
        assert!(fixture.pool.release(connection, true));
        assert_eq!(fixture.pool.idle_count(&key()), 1);
        assert_eq!(fixture.admission.total_leased(), 1);

        let connection = fixture.pool.acquire_idle(&key()).unwrap();
        assert_eq!(fixture.pool.idle_count(&key()), 0);
        drop(connection);

        assert_eq!(fixture.admission.total_leased(), 0);
        assert_eq!(fixture.transport.closed(), 1);
    }

    #[tokio::test]
    async fn test_lifo_order() {
        let fixture = Fixture::new(PoolConfig::default());
        let first = fixture.connect(&key()).await;
        let mut second = fixture.connect(&key()).await;
        let response = second
            .send(&Request::try_from("http://example.com/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-connection-id"], "2");

        fixture.pool.release(first, true);
        fixture.pool.release(second, true);

        let reused = fixture.pool.acquire_idle(&key()).unwrap();
        assert_eq!(reused.uses(), 1);
        let older = fixture.pool.acquire_idle(&key()).unwrap();
        assert_eq!(older.uses(), 0);
    }

    #[tokio::test]
    async fn test_release_without_keep_alive_closes() {
        let fixture = Fixture::new(PoolConfig::default());
        let connection = fixture.connect(&key()).await;

        assert!(!fixture.pool.release(connection, false));
        assert_eq!(fixture.pool.total_idle(), 0);
        assert_eq!(fixture.admission.total_leased(), 0);
        assert_eq!(fixture.transport.closed(), 1);
    }

    #[tokio::test]
    async fn test_keep_alive_disabled_in_config() {
        let fixture = Fixture::new(PoolConfig {
            keep_alive: false,
            ..PoolConfig::default()
        });
        let connection = fixture.connect(&key()).await;

        assert!(!fixture.pool.release(connection, true));
        assert_eq!(fixture.admission.total_leased(), 0);
    }

    #[tokio::test]
    async fn test_idle_cap() {
        let fixture = Fixture::new(PoolConfig {
            max_idle_per_host: 1,
            ..PoolConfig::default()
        });
        let first = fixture.connect(&key()).await;
        let second = fixture.connect(&key()).await;

        assert!(fixture.pool.release(first, true));
        assert!(!fixture.pool.release(second, true));
        assert_eq!(fixture.pool.idle_count(&key()), 1);
        assert_eq!(fixture.admission.total_leased(), 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_skipped() {
        let fixture = Fixture::new(PoolConfig::default());
        let connection = fixture.connect(&key()).await;
        fixture.pool.release(connection, true);

        fixture.transport.break_connections();
        assert!(fixture.pool.acquire_idle(&key()).is_none());
        assert_eq!(fixture.admission.total_leased(), 0);
    }

    #[tokio::test]
    async fn test_expired_connection_is_skipped() {
        let fixture = Fixture::new(PoolConfig {
            idle_connection_timeout: Duration::from_millis(20),
            ..PoolConfig::default()
        });
        let connection = fixture.connect(&key()).await;
        fixture.pool.release(connection, true);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(fixture.pool.acquire_idle(&key()).is_none());
        assert_eq!(fixture.admission.total_leased(), 0);
        assert_eq!(fixture.transport.closed(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let fixture = Fixture::new(PoolConfig::default());
        let other = HostKey::new("http", "other.example", 80);

        let old = fixture.connect(&key()).await;
        fixture.pool.release(old, true);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = fixture.connect(&other).await;
        fixture.pool.release(fresh, true);

        assert_eq!(fixture.pool.evict_idle(Duration::from_millis(20)), 1);
        assert_eq!(fixture.pool.idle_count(&key()), 0);
        assert_eq!(fixture.pool.idle_count(&other), 1);
        assert_eq!(fixture.admission.total_leased(), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let fixture = Fixture::new(PoolConfig::default());
        for _ in 0..3 {
            let connection = fixture.connect(&key()).await;
            fixture.pool.release(connection, true);
        }

        assert_eq!(fixture.pool.close_all(), 3);
        assert_eq!(fixture.pool.total_idle(), 0);
        assert_eq!(fixture.admission.total_leased(), 0);

        // A closed pool no longer keeps connections
        let connection = fixture.connect(&key()).await;
        assert!(!fixture.pool.release(connection, true));
    }

    #[tokio::test]
    async fn test_sweeper() {
        let fixture = Fixture::new(PoolConfig {
            idle_connection_timeout: Duration::from_millis(30),
            ..PoolConfig::default()
        });
        let token = CancellationToken::new();
        let sweeper = Arc::clone(&fixture.pool).spawn_sweeper(
            Duration::from_millis(10),
            token.clone(),
            &Handle::current(),
        );

        let connection = fixture.connect(&key()).await;
        fixture.pool.release(connection, true);
        assert_eq!(fixture.pool.total_idle(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fixture.pool.total_idle(), 0);
        assert_eq!(fixture.admission.total_leased(), 0);

        token.cancel();
        sweeper.await.unwrap();
    }
}
