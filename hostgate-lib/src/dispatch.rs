//! Request dispatching.
//!
//! [`Dispatcher::submit`] decides synchronously whether a request can go
//! ahead: it resolves the [`HostKey`], looks for an idle connection and, if
//! none is available, asks the [`AdmissionController`] for a new slot. Only
//! admitted requests are spawned onto the runtime; everything else comes back
//! as an already-failed [`CompletionHandle`].

use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::handle::{CompletionHandle, Completer};
use crate::pool::{
    AdmissionController, AdmissionPermit, ConnectionPool, HostKey, HostStats, HostStatsMap,
    PoolConfig, PooledConnection,
};
use crate::transport::TransportFactory;
use crate::waiter::{WaitGroup, WaitGuard};
use crate::{ErrorKind, Request, Response, Result};

/// State shared between the dispatcher and its request tasks
#[derive(Debug)]
struct Context {
    config: Arc<PoolConfig>,
    pool: Arc<ConnectionPool>,
    transport: Arc<dyn TransportFactory>,
    stats: DashMap<HostKey, HostStats>,
}

impl Context {
    fn record(&self, key: &HostKey, update: impl FnOnce(&mut HostStats)) {
        let mut stats = self.stats.entry(key.clone()).or_default();
        update(stats.value_mut());
    }
}

/// Connection-admission and dispatch engine.
///
/// # Architecture
///
/// - Idle keep-alive connections are tried before admission. A reused
///   connection already holds its admission slot.
/// - A new connection needs a slot from the [`AdmissionController`]. When a
///   ceiling is reached the request fails at once with
///   [`ErrorKind::AdmissionRejected`]; nothing is queued.
/// - Admitted requests run as Tokio tasks. Each task owns its connection and
///   slot, so cancellation (dropping the task's future) closes the connection
///   and returns the slot.
#[derive(Debug)]
pub struct Dispatcher {
    context: Arc<Context>,
    admission: Arc<AdmissionController>,
    runtime: Handle,
    /// Cloned into every request task. `None` once shut down.
    ///
    /// Submissions only take the read side, so they never serialize each other.
    guard: RwLock<Option<WaitGuard>>,
    group: Mutex<Option<WaitGroup>>,
    sweeper: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher running request tasks on `runtime`.
    ///
    /// Starts the idle sweeper unless the idle timeout is zero.
    #[must_use]
    pub fn new(config: PoolConfig, transport: Arc<dyn TransportFactory>, runtime: Handle) -> Self {
        let config = Arc::new(config);
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&config)));
        let sweeper = CancellationToken::new();

        if let Some(interval) = config.sweep_interval() {
            Arc::clone(&pool).spawn_sweeper(interval, sweeper.child_token(), &runtime);
        }

        let (group, guard) = WaitGroup::new();
        Self {
            admission: AdmissionController::new(Arc::clone(&config)),
            context: Arc::new(Context {
                config,
                pool,
                transport,
                stats: DashMap::new(),
            }),
            runtime,
            guard: RwLock::new(Some(guard)),
            group: Mutex::new(Some(group)),
            sweeper,
        }
    }

    /// Submit a request.
    ///
    /// Never blocks and never waits for a connection slot. The returned
    /// handle has already failed if the URL cannot be resolved to a host, a
    /// connection ceiling is reached, or the dispatcher was shut down.
    pub fn submit(&self, request: Request) -> CompletionHandle {
        let Some(guard) = self
            .guard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            return CompletionHandle::failed(ErrorKind::ShutDown);
        };

        let key = match HostKey::try_from(&request.url) {
            Ok(key) => key,
            Err(e) => return CompletionHandle::failed(e),
        };

        let lease = if let Some(connection) = self.context.pool.acquire_idle(&key) {
            log::debug!("Reusing idle connection to {key}");
            Lease::Reused(connection)
        } else {
            match self.admission.try_admit(&key) {
                Ok(permit) => Lease::Fresh(permit),
                Err(reason) => {
                    log::warn!("Rejected request to {key}: {reason}");
                    self.context.record(&key, |stats| stats.record_rejection(reason));
                    return CompletionHandle::failed(ErrorKind::AdmissionRejected {
                        reason,
                        host: key,
                    });
                }
            }
        };

        let (handle, completer) = CompletionHandle::new();
        let task = RequestTask {
            context: Arc::clone(&self.context),
            key,
            request,
            lease,
        };
        self.runtime.spawn(task.run(completer, guard));
        handle
    }

    /// Stop accepting requests and wind down.
    ///
    /// Requests submitted afterwards fail with [`ErrorKind::ShutDown`].
    /// Waits for in-flight requests to finish, then closes all idle
    /// connections and stops the idle sweeper.
    pub async fn shutdown(&self) {
        drop(
            self.guard
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let group = lock(&self.group).take();
        if let Some(group) = group {
            group.wait().await;
        }

        let closed = self.context.pool.close_all();
        self.sweeper.cancel();
        log::debug!("Dispatcher shut down, closed {closed} idle connection(s)");
    }

    /// Returns `true` after [`Dispatcher::shutdown`] was called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.guard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The configuration in effect
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.context.config
    }

    /// The admission controller, for introspection
    #[must_use]
    pub const fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// The idle connection pool, for introspection
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.context.pool
    }

    /// Per-host statistics collected so far
    #[must_use]
    pub fn host_stats(&self) -> HostStatsMap {
        self.context
            .stats
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect::<std::collections::HashMap<_, _>>()
            .into()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a request got its connection
#[allow(variant_size_differences)]
#[derive(Debug)]
enum Lease {
    /// An idle connection, which brings its own slot
    Reused(PooledConnection),
    /// A freshly admitted slot; the connection is opened by the task
    Fresh(AdmissionPermit),
}

#[derive(Debug)]
struct RequestTask {
    context: Arc<Context>,
    key: HostKey,
    request: Request,
    lease: Lease,
}

impl RequestTask {
    async fn run(self, completer: Completer, _guard: WaitGuard) {
        let abort = completer.abort_token();
        let Self {
            context,
            key,
            request,
            lease,
        } = self;

        let started = Instant::now();
        let reused = matches!(lease, Lease::Reused(_));

        let (result, connection) = tokio::select! {
            biased;
            () = abort.cancelled() => {
                // The dropped exchange future owned the connection and slot
                log::debug!("Request to {key} cancelled");
                return;
            }
            outcome = exchange(&context, &key, &request, lease) => outcome,
        };

        if let Some(connection) = connection {
            context.record(&key, |stats| stats.record_connection(reused));
            let keep_alive = result.as_ref().is_ok_and(Response::is_keep_alive);
            context.pool.release(connection, keep_alive);
        }

        match &result {
            Ok(response) => context.record(&key, |stats| {
                stats.record_response(response.status().as_u16(), started.elapsed());
            }),
            Err(e) => {
                log::debug!("Request to {key} failed: {e}");
                context.record(&key, HostStats::record_failure);
            }
        }

        completer.finish(result);
    }
}

/// Open a connection if needed and perform the exchange.
///
/// Returns the connection alongside the result when one was established.
async fn exchange(
    context: &Context,
    key: &HostKey,
    request: &Request,
    lease: Lease,
) -> (Result<Response>, Option<PooledConnection>) {
    let mut connection = match lease {
        Lease::Reused(connection) => connection,
        Lease::Fresh(permit) => {
            let connect_timeout = Some(context.config.connect_timeout).filter(|t| !t.is_zero());
            match bounded(connect_timeout, context.transport.open(key)).await {
                Ok(Ok(connection)) => PooledConnection::new(connection, permit),
                Ok(Err(e)) => return (Err(e.into()), None),
                Err(elapsed) => return (Err(ErrorKind::ConnectTimeout(key.clone(), elapsed)), None),
            }
        }
    };

    let request_timeout = request.timeout.or(context.config.request_timeout);
    let result = match bounded(request_timeout, connection.send(request)).await {
        Ok(result) => result.map_err(ErrorKind::from),
        Err(elapsed) => {
            // The exchange was interrupted midway; the connection is unusable
            drop(connection);
            return (Err(ErrorKind::RequestTimeout(key.clone(), elapsed)), None);
        }
    };
    (result, Some(connection))
}

/// Run `future`, giving up after `limit` if there is one
async fn bounded<F: Future>(
    limit: Option<Duration>,
    future: F,
) -> std::result::Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| limit),
        None => Ok(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleState;
    use crate::test_utils::MockTransport;
    use crate::transport::TransportError;
    use crate::types::Rejection;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn dispatcher(config: PoolConfig, transport: &MockTransport) -> Dispatcher {
        Dispatcher::new(config, Arc::new(transport.clone()), Handle::current())
    }

    fn get(url: &str) -> Request {
        Request::try_from(url).unwrap()
    }

    fn connection_id(response: &Response) -> String {
        response.headers()["x-connection-id"]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_total_ceiling_rejects_concurrent_request() {
        let transport = MockTransport::new().gated();
        let dispatcher = dispatcher(
            PoolConfig {
                max_connections_total: 1,
                ..PoolConfig::default()
            },
            &transport,
        );

        let first = dispatcher.submit(get("http://a.example/"));
        transport.entered(1).await;

        let second = dispatcher.submit(get("http://b.example/"));
        assert_eq!(second.state(), HandleState::Failed);
        let error = second.wait().await.unwrap_err();
        assert_eq!(error.to_string(), "Too many connections");
        assert_eq!(error.rejection(), Some(Rejection::TooManyConnections));

        transport.release(1);
        assert!(first.wait().await.is_ok());

        dispatcher.shutdown().await;
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test]
    async fn test_sequential_keep_alive_reuse_within_ceiling() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(
            PoolConfig {
                max_connections_total: 1,
                ..PoolConfig::default()
            },
            &transport,
        );

        let first = dispatcher
            .submit(get("http://localhost/first"))
            .wait()
            .await
            .unwrap();
        let second = dispatcher
            .submit(get("http://localhost/second?page=2"))
            .wait()
            .await
            .unwrap();

        assert_eq!(connection_id(&first), connection_id(&second));
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.sent(), 2);
        assert_eq!(dispatcher.admission().total_leased(), 1);
        assert_eq!(dispatcher.pool().total_idle(), 1);

        let stats = dispatcher.host_stats();
        let stats = stats.get("http://localhost:80").unwrap();
        assert_eq!(stats.connections_opened, 1);
        assert_eq!(stats.connections_reused, 1);
        assert_eq!(stats.successful_requests, 2);

        dispatcher.shutdown().await;
        assert_eq!(dispatcher.admission().total_leased(), 0);
        assert_eq!(transport.active(), 0);
    }

    #[tokio::test]
    async fn test_per_host_ceiling() {
        let transport = MockTransport::new().gated();
        let dispatcher = dispatcher(
            PoolConfig {
                max_connections_per_host: 2,
                ..PoolConfig::default()
            },
            &transport,
        );

        let a1 = dispatcher.submit(get("http://a.example/1"));
        let a2 = dispatcher.submit(get("http://a.example/2"));
        let a3 = dispatcher.submit(get("http://a.example/3"));
        let b1 = dispatcher.submit(get("http://b.example/1"));

        assert_eq!(
            a3.try_result(),
            Some(Err(ErrorKind::AdmissionRejected {
                reason: Rejection::TooManyConnectionsPerHost,
                host: HostKey::new("http", "a.example", 80),
            }))
        );
        assert_eq!(b1.state(), HandleState::Pending);

        transport.release(3);
        for handle in [a1, a2, b1] {
            assert!(handle.wait().await.is_ok());
        }
        assert_eq!(transport.opened(), 3);

        let stats = dispatcher.host_stats();
        assert_eq!(stats.get("http://a.example:80").unwrap().rejected_per_host, 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_connection_close_is_not_pooled() {
        let transport = MockTransport::new().closing();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        for _ in 0..2 {
            dispatcher
                .submit(get("http://localhost/"))
                .wait()
                .await
                .unwrap();
        }

        assert_eq!(transport.opened(), 2);
        assert_eq!(transport.closed(), 2);
        assert_eq!(dispatcher.pool().total_idle(), 0);
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test]
    async fn test_keep_alive_disabled() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(
            PoolConfig {
                keep_alive: false,
                ..PoolConfig::default()
            },
            &transport,
        );

        for _ in 0..2 {
            dispatcher
                .submit(get("http://localhost/"))
                .wait()
                .await
                .unwrap();
        }

        assert_eq!(transport.opened(), 2);
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_slot() {
        let transport = MockTransport::new().failing_connect();
        let dispatcher = dispatcher(
            PoolConfig {
                max_connections_total: 1,
                ..PoolConfig::default()
            },
            &transport,
        );

        for _ in 0..2 {
            let error = dispatcher
                .submit(get("http://localhost/"))
                .wait()
                .await
                .unwrap_err();
            assert!(matches!(
                error,
                ErrorKind::Transport(TransportError::Connect { .. })
            ));
            assert_eq!(dispatcher.admission().total_leased(), 0);
        }
        assert_eq!(transport.sent(), 0);

        let stats = dispatcher.host_stats();
        assert_eq!(stats.get("http://localhost:80").unwrap().failed_requests, 2);
    }

    #[tokio::test]
    async fn test_send_failure_closes_connection() {
        let transport = MockTransport::new().failing_send();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        let error = dispatcher
            .submit(get("http://localhost/"))
            .wait()
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ErrorKind::Transport(TransportError::Send(_))
        ));
        assert_eq!(transport.closed(), 1);
        assert_eq!(dispatcher.pool().total_idle(), 0);
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let transport = MockTransport::new().with_connect_delay(Duration::from_secs(5));
        let dispatcher = dispatcher(
            PoolConfig {
                connect_timeout: Duration::from_millis(20),
                ..PoolConfig::default()
            },
            &transport,
        );

        let error = dispatcher
            .submit(get("http://localhost/"))
            .wait()
            .await
            .unwrap_err();

        assert_eq!(
            error,
            ErrorKind::ConnectTimeout(
                HostKey::new("http", "localhost", 80),
                Duration::from_millis(20)
            )
        );
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[rstest]
    #[case::request_level(Some(Duration::from_millis(20)), None)]
    #[case::config_level(None, Some(Duration::from_millis(20)))]
    #[tokio::test]
    async fn test_request_timeout(
        #[case] request_timeout: Option<Duration>,
        #[case] config_timeout: Option<Duration>,
    ) {
        let transport = MockTransport::new().gated();
        let dispatcher = dispatcher(
            PoolConfig {
                request_timeout: config_timeout,
                ..PoolConfig::default()
            },
            &transport,
        );

        let mut request = get("http://localhost/slow");
        request.timeout = request_timeout;
        let error = dispatcher.submit(request).wait().await.unwrap_err();

        assert_eq!(
            error,
            ErrorKind::RequestTimeout(
                HostKey::new("http", "localhost", 80),
                Duration::from_millis(20)
            )
        );
        assert_eq!(transport.closed(), 1);
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let transport = MockTransport::new().gated();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        let handle = dispatcher.submit(get("http://localhost/"));
        transport.entered(1).await;
        assert_eq!(dispatcher.admission().total_leased(), 1);

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.wait().await, Err(ErrorKind::Cancelled));

        dispatcher.shutdown().await;
        assert_eq!(transport.closed(), 1);
        assert_eq!(dispatcher.pool().total_idle(), 0);
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_races_completion() {
        let transport = MockTransport::new().gated();
        let dispatcher = dispatcher(
            PoolConfig {
                keep_alive: false,
                ..PoolConfig::default()
            },
            &transport,
        );

        let handles: Vec<_> = (0..16)
            .map(|i| dispatcher.submit(get(&format!("http://host{}.example/", i % 4))))
            .collect();
        transport.entered(16).await;

        let cancellers: Vec<_> = handles
            .iter()
            .map(|handle| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.cancel() })
            })
            .collect();
        transport.release(16);

        for canceller in cancellers {
            canceller.await.unwrap();
        }
        for handle in &handles {
            let state = handle.wait().await.map_or_else(
                |e| {
                    assert_eq!(e, ErrorKind::Cancelled);
                    HandleState::Cancelled
                },
                |_| HandleState::Fulfilled,
            );
            assert_eq!(handle.state(), state);
        }

        dispatcher.shutdown().await;
        let snapshot = dispatcher.admission().snapshot();
        assert_eq!(snapshot.total, 0);
        assert!(snapshot.is_consistent());
        assert_eq!(transport.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ceiling_holds_under_load() {
        let transport = MockTransport::new();
        let dispatcher = Arc::new(dispatcher(
            PoolConfig {
                max_connections_total: 1,
                ..PoolConfig::default()
            },
            &transport,
        ));

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let mut fulfilled = 0;
                    for i in 0..50 {
                        let url = format!("http://host{}.example/{i}", worker % 2);
                        match dispatcher.submit(get(&url)).wait().await {
                            Ok(_) => fulfilled += 1,
                            Err(e) => assert!(e.is_rejection(), "unexpected error: {e}"),
                        }
                    }
                    fulfilled
                })
            })
            .collect();

        let mut fulfilled = 0;
        for worker in workers {
            fulfilled += worker.await.unwrap();
        }

        assert!(fulfilled > 0);
        assert_eq!(transport.max_active(), 1);
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.admission().total_leased(), 0);
        assert_eq!(transport.active(), 0);
    }

    #[rstest]
    #[case("file:///etc/hosts", ErrorKind::InvalidUrlHost)]
    #[case(
        "foo://example.com/",
        ErrorKind::InvalidUrlPort(url::Url::parse("foo://example.com/").unwrap())
    )]
    #[tokio::test]
    async fn test_unresolvable_url(#[case] url: &str, #[case] expected: ErrorKind) {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        let handle = dispatcher.submit(get(url));
        assert_eq!(handle.try_result(), Some(Err(expected)));
        assert_eq!(transport.opened(), 0);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        dispatcher
            .submit(get("http://localhost/"))
            .wait()
            .await
            .unwrap();
        assert_eq!(dispatcher.pool().total_idle(), 1);

        dispatcher.shutdown().await;
        assert!(dispatcher.is_shut_down());
        assert_eq!(dispatcher.pool().total_idle(), 0);
        assert_eq!(transport.active(), 0);

        let handle = dispatcher.submit(get("http://localhost/"));
        assert_eq!(handle.try_result(), Some(Err(ErrorKind::ShutDown)));

        // Shutting down twice is harmless
        dispatcher.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_from_many_threads() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        let handles: Vec<CompletionHandle> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|i| {
                    let dispatcher = &dispatcher;
                    scope.spawn(move || {
                        (0..25)
                            .map(|_| dispatcher.submit(get(&format!("http://host{i}.test/"))))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert_eq!(transport.sent(), 200);
        assert!(!dispatcher.is_shut_down());

        dispatcher.shutdown().await;
        assert!(dispatcher.admission().snapshot().is_consistent());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight() {
        let transport = MockTransport::new().gated();
        let dispatcher = Arc::new(dispatcher(PoolConfig::default(), &transport));

        let handle = dispatcher.submit(get("http://localhost/"));
        transport.entered(1).await;

        let shutdown = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());

        transport.release(1);
        shutdown.await.unwrap();
        assert!(handle.wait().await.is_ok());
        assert_eq!(transport.active(), 0);
    }

    #[tokio::test]
    async fn test_idle_connections_expire() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(
            PoolConfig {
                idle_connection_timeout: Duration::from_millis(30),
                idle_sweep_interval: Some(Duration::from_millis(10)),
                ..PoolConfig::default()
            },
            &transport,
        );

        dispatcher
            .submit(get("http://localhost/"))
            .wait()
            .await
            .unwrap();
        assert_eq!(dispatcher.admission().total_leased(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(dispatcher.pool().total_idle(), 0);
        assert_eq!(dispatcher.admission().total_leased(), 0);

        dispatcher
            .submit(get("http://localhost/"))
            .wait()
            .await
            .unwrap();
        assert_eq!(transport.opened(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_get_and_callback() {
        let transport = MockTransport::new();
        let dispatcher = dispatcher(PoolConfig::default(), &transport);

        let handle = dispatcher.submit(get("http://localhost/"));
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle.on_complete(move |result| {
            let _ = tx.send(result.is_ok());
        });

        let blocking = handle.clone();
        let result =
            tokio::task::spawn_blocking(move || blocking.blocking_get(Duration::from_secs(5)))
                .await
                .unwrap();

        assert_eq!(result.unwrap().status(), http::StatusCode::OK);
        assert!(rx.await.unwrap());
    }

    #[test]
    fn test_runtime_shutdown_abandons_requests() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let transport = MockTransport::new().gated();
        let dispatcher = Dispatcher::new(
            PoolConfig::default(),
            Arc::new(transport.clone()),
            runtime.handle().clone(),
        );

        let handle = dispatcher.submit(get("http://localhost/"));
        runtime.block_on(transport.entered(1));
        drop(runtime);

        assert_eq!(handle.try_result(), Some(Err(ErrorKind::Abandoned)));
        assert_eq!(dispatcher.admission().total_leased(), 0);
    }
}
