//! The seam between the engine and the wire.
//!
//! The engine never performs I/O itself. It asks a [`TransportFactory`] for a
//! fresh [`Connection`] when admission allows one, and hands requests to
//! connections it leases from the pool. [`HttpTransport`] is the plain
//! HTTP/1.1 implementation used by the [`crate::Client`] by default.

mod http;

pub use self::http::{HttpConnection, HttpTransport};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::pool::HostKey;
use crate::{Request, Response};

/// A boxed error shared between clones of a [`TransportError`]
pub type BoxedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Opens connections to a host
#[async_trait]
pub trait TransportFactory: Send + Sync + std::fmt::Debug {
    /// Open a new connection to `key`.
    ///
    /// The dispatcher bounds this call with the configured connect timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn open(&self, key: &HostKey) -> Result<Box<dyn Connection>, TransportError>;
}

/// A single open connection to a host
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Perform one request/response exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the request or reading the response fails.
    async fn send(&mut self, request: &Request) -> Result<Response, TransportError>;

    /// Whether another request may be sent on this connection
    fn is_reusable(&self) -> bool;

    /// Close the connection. Must be idempotent.
    fn close(&mut self);
}

/// Errors raised by a transport
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Establishing the connection failed
    #[error("Failed to connect to {host}: {source}")]
    Connect {
        /// Target of the connection attempt
        host: HostKey,
        /// Underlying error
        #[source]
        source: BoxedError,
    },
    /// The transport cannot talk to URLs of this scheme
    #[error("Unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
    /// Writing the request failed
    #[error("Failed to send request: {0}")]
    Send(#[source] BoxedError),
    /// Reading the response failed
    #[error("Failed to read response: {0}")]
    Receive(#[source] BoxedError),
    /// The connection was already closed
    #[error("Connection is closed")]
    Closed,
}

impl TransportError {
    /// Wrap a connection error for `host`
    pub fn connect<E>(host: &HostKey, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connect {
            host: host.clone(),
            source: Arc::new(source),
        }
    }

    /// Wrap a send error
    pub fn send<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Send(Arc::new(source))
    }

    /// Wrap a receive error
    pub fn receive<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Receive(Arc::new(source))
    }
}
