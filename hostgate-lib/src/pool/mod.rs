//! Connection admission and pooling.
//!
//! Every open connection, leased or idle, occupies exactly one admission slot
//! for its host. Slots are only taken when a new connection has to be opened;
//! a request served from the idle pool reuses the slot of that connection.
//!
//! # Architecture
//!
//! - [`HostKey`]: The `(scheme, host, port)` partition connections are pooled by
//! - [`AdmissionController`]: Enforces global and per-host connection ceilings
//! - [`ConnectionPool`]: Keeps idle keep-alive connections for reuse
//! - [`PoolConfig`]: Ceilings, timeouts and per-host overrides
//! - [`HostStats`]: Statistics tracking for each host

mod admission;
mod config;
mod idle;
mod key;
mod stats;

pub use admission::{AdmissionController, AdmissionPermit, AdmissionSnapshot};
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_CONNECTION_TIMEOUT, DEFAULT_MAX_CONNECTIONS_PER_HOST,
    DEFAULT_MAX_CONNECTIONS_TOTAL, HostConfig, HostConfigs, Limit, PoolConfig,
};
pub use idle::{ConnectionPool, PooledConnection};
pub use key::HostKey;
pub use stats::{HostStats, HostStatsMap};
