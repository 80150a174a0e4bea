//! The public entry point.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` submits requests and hands out [`CompletionHandle`]s.
//! `ClientBuilder` exposes the connection ceilings, timeouts and keep-alive
//! settings used to build a `Client`.
//!
//! For convenience, a free function [`fetch`] is provided for ad-hoc
//! requests.
#![allow(clippy::module_name_repetitions)]
use std::{sync::Arc, time::Duration};

use tokio::runtime::Handle;
use typed_builder::TypedBuilder;

use crate::{
    CompletionHandle, ErrorKind, Request, Response, Result,
    dispatch::Dispatcher,
    pool::{
        AdmissionSnapshot, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_CONNECTION_TIMEOUT, HostConfigs,
        HostStatsMap, PoolConfig,
    },
    transport::{HttpTransport, TransportFactory},
};

/// Default user agent, `hostgate/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("hostgate/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Maximum number of open connections across all hosts.
    ///
    /// Idle keep-alive connections count as open. `0` disables the ceiling.
    max_connections_total: usize,

    /// Maximum number of open connections to a single host.
    ///
    /// Hosts are told apart by scheme, hostname and port. `0` disables the
    /// ceiling. Individual hosts can be configured via
    /// [`ClientBuilder::hosts`].
    max_connections_per_host: usize,

    /// Per-host overrides, keyed by hostname
    hosts: HostConfigs,

    /// Timeout for opening a connection. `0` disables it.
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,

    /// Idle keep-alive connections are closed after this long.
    /// `0` keeps them until the server closes them.
    #[builder(default = DEFAULT_IDLE_CONNECTION_TIMEOUT)]
    idle_connection_timeout: Duration,

    /// How often idle connections are checked for expiry.
    /// Defaults to half of [`ClientBuilder::idle_connection_timeout`].
    idle_sweep_interval: Option<Duration>,

    /// Reuse connections for subsequent requests to the same host
    #[builder(default = true)]
    keep_alive: bool,

    /// Maximum number of idle connections kept per host. `0` means no cap.
    max_idle_per_host: usize,

    /// Default timeout for a request on an established connection.
    ///
    /// [`Request::timeout`] takes precedence.
    request_timeout: Option<Duration>,

    /// `User-Agent` header sent with requests that don't set one.
    ///
    /// Defaults to [`DEFAULT_USER_AGENT`].
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Runtime driving the requests.
    ///
    /// Defaults to the runtime the client is built in.
    #[builder(setter(strip_option))]
    runtime: Option<Handle>,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// The engine configuration described by this builder
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections_total: self.max_connections_total,
            max_connections_per_host: self.max_connections_per_host,
            connect_timeout: self.connect_timeout,
            idle_connection_timeout: self.idle_connection_timeout,
            idle_sweep_interval: self.idle_sweep_interval,
            keep_alive: self.keep_alive,
            max_idle_per_host: self.max_idle_per_host,
            request_timeout: self.request_timeout,
            hosts: self.hosts.clone(),
        }
    }

    /// Instantiates a [`Client`] talking plain HTTP/1.1.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MissingRuntime`] if no runtime was configured and
    /// the call is not made from within a Tokio runtime.
    pub fn client(self) -> Result<Client> {
        let transport = Arc::new(HttpTransport::new(&self.user_agent));
        self.client_with_transport(transport)
    }

    /// Instantiates a [`Client`] opening connections through `transport`.
    ///
    /// # Errors
    ///
    /// Same as [`ClientBuilder::client`].
    pub fn client_with_transport(self, transport: Arc<dyn TransportFactory>) -> Result<Client> {
        let runtime = match self.runtime.clone() {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ErrorKind::MissingRuntime)?,
        };

        Ok(Client {
            dispatcher: Arc::new(Dispatcher::new(self.pool_config(), transport, runtime)),
        })
    }
}

/// Handles incoming requests and returns responses.
///
/// Cloning a `Client` is cheap; all clones share the same connections,
/// ceilings and statistics.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
}

impl Client {
    /// Submit a request without waiting for it.
    ///
    /// Anything that converts into a [`Request`] is accepted, e.g. a URL
    /// string. Conversion errors and admission rejections are reported
    /// through the returned handle.
    pub fn submit<T, E>(&self, request: T) -> CompletionHandle
    where
        Request: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        match Request::try_from(request) {
            Ok(request) => self.dispatcher.submit(request),
            Err(e) => CompletionHandle::failed(e.into()),
        }
    }

    /// Submit a request and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    pub async fn fetch<T, E>(&self, request: T) -> Result<Response>
    where
        Request: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        self.submit(request).wait().await
    }

    /// Per-host statistics collected so far
    #[must_use]
    pub fn host_stats(&self) -> HostStatsMap {
        self.dispatcher.host_stats()
    }

    /// Current admission counters
    #[must_use]
    pub fn admission_snapshot(&self) -> AdmissionSnapshot {
        self.dispatcher.admission().snapshot()
    }

    /// Number of idle keep-alive connections
    #[must_use]
    pub fn idle_connections(&self) -> usize {
        self.dispatcher.pool().total_idle()
    }

    /// The configuration in effect
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        self.dispatcher.config()
    }

    /// Stop accepting requests, wait for in-flight ones and close all
    /// idle connections. Affects all clones.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

/// A shorthand function to fetch a single URL or request.
///
/// This provides the simplest request utility without having to create a [`Client`].
/// For more complex scenarios, see documentation of [`ClientBuilder`] instead.
///
/// # Errors
///
/// Returns an [`Err`] if:
/// - the request is invalid or cannot be sent,
/// - the client cannot be created (see [`ClientBuilder::client`]).
pub async fn fetch<T, E>(request: T) -> Result<Response>
where
    Request: TryFrom<T, Error = E>,
    ErrorKind: From<E>,
{
    let client = ClientBuilder::builder().build().client()?;
    let response = client.fetch(request).await;
    client.shutdown().await;
    response
}
