use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::pool::HostKey;
use crate::transport::{Connection, TransportError, TransportFactory};
use crate::{Request, Response};

/// Counters shared by a [`MockTransport`] and all its connections
#[derive(Debug, Default)]
struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    sent: AtomicUsize,
    broken: AtomicBool,
}

/// In-memory transport for engine tests.
///
/// Every response carries an `x-connection-id` header naming the connection
/// that produced it (ids start at 1). A gated transport holds every response
/// until [`MockTransport::release`] hands out permits.
#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<Semaphore>,
    fail_connect: bool,
    fail_send: bool,
    close_after_response: bool,
    connect_delay: Option<Duration>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::default(),
            gate: None,
            entered: Arc::new(Semaphore::new(0)),
            fail_connect: false,
            fail_send: false,
            close_after_response: false,
            connect_delay: None,
        }
    }

    /// Hold responses until released
    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) const fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub(crate) const fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Answer every request with `Connection: close`
    pub(crate) const fn closing(mut self) -> Self {
        self.close_after_response = true;
        self
    }

    pub(crate) const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Let `n` held responses through
    pub(crate) fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until `n` more requests have reached their connection
    pub(crate) async fn entered(&self, n: u32) {
        self.entered
            .acquire_many(n)
            .await
            .expect("semaphore is never closed")
            .forget();
    }

    /// Mark every existing and future connection as unusable
    pub(crate) fn break_connections(&self) {
        self.state.broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> usize {
        self.state.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for MockTransport {
    async fn open(&self, key: &HostKey) -> Result<Box<dyn Connection>, TransportError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(TransportError::connect(
                key,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }

        let id = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            id,
            transport: self.clone(),
            reusable: true,
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    id: usize,
    transport: MockTransport,
    reusable: bool,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, request: &Request) -> Result<Response, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.transport.state.sent.fetch_add(1, Ordering::SeqCst);
        self.transport.entered.add_permits(1);

        if let Some(gate) = &self.transport.gate {
            gate.acquire().await.map_err(TransportError::receive)?.forget();
        }

        if self.transport.fail_send {
            self.reusable = false;
            return Err(TransportError::send(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("x-connection-id", HeaderValue::from(self.id));
        if self.transport.close_after_response {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            self.reusable = false;
        }

        Ok(Response::new(
            request.url.clone(),
            StatusCode::OK,
            headers,
            Bytes::from_static(b"ok"),
        ))
    }

    fn is_reusable(&self) -> bool {
        !self.closed && self.reusable && !self.transport.state.broken.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.transport.state.closed.fetch_add(1, Ordering::SeqCst);
            self.transport.state.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.close();
    }
}
