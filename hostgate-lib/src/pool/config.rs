use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::pool::HostKey;

/// Default ceiling for connections across all hosts (0 means unlimited)
pub const DEFAULT_MAX_CONNECTIONS_TOTAL: usize = 0;

/// Default ceiling for connections to a single host (0 means unlimited)
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 0;

/// Default timeout for establishing a new connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time an idle keep-alive connection is kept in the pool
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A connection ceiling. Zero in configuration means "no ceiling".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(Option<NonZeroUsize>);

impl Limit {
    /// No ceiling at all
    pub const UNLIMITED: Limit = Limit(None);

    /// Returns `true` if one more connection fits next to `current` ones
    #[must_use]
    pub fn allows(self, current: usize) -> bool {
        self.0.is_none_or(|max| current < max.get())
    }

    /// The ceiling, if there is one
    #[must_use]
    pub fn get(self) -> Option<usize> {
        self.0.map(NonZeroUsize::get)
    }
}

impl From<usize> for Limit {
    fn from(value: usize) -> Self {
        Limit(NonZeroUsize::new(value))
    }
}

/// Engine configuration shared by the admission controller, the connection
/// pool and the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of open connections across all hosts (0 = unlimited)
    #[serde(default)]
    pub max_connections_total: usize,

    /// Maximum number of open connections per host (0 = unlimited)
    #[serde(default)]
    pub max_connections_per_host: usize,

    /// Timeout for opening a new connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle keep-alive connections older than this are closed
    #[serde(default = "default_idle_connection_timeout", with = "humantime_serde")]
    pub idle_connection_timeout: Duration,

    /// Interval of the background idle sweep.
    /// Defaults to half the idle timeout.
    #[serde(default, with = "humantime_serde")]
    pub idle_sweep_interval: Option<Duration>,

    /// Keep connections open after a response for reuse
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,

    /// Maximum number of idle connections kept per host (0 = unlimited)
    #[serde(default)]
    pub max_idle_per_host: usize,

    /// Timeout for the whole exchange on an established connection
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Per-host overrides, keyed by hostname
    #[serde(default)]
    pub hosts: HostConfigs,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_total: DEFAULT_MAX_CONNECTIONS_TOTAL,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connect_timeout: default_connect_timeout(),
            idle_connection_timeout: default_idle_connection_timeout(),
            idle_sweep_interval: None,
            keep_alive: default_keep_alive(),
            max_idle_per_host: 0,
            request_timeout: None,
            hosts: HostConfigs::new(),
        }
    }
}

const fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

const fn default_idle_connection_timeout() -> Duration {
    DEFAULT_IDLE_CONNECTION_TIMEOUT
}

const fn default_keep_alive() -> bool {
    true
}

impl PoolConfig {
    /// The global connection ceiling
    #[must_use]
    pub fn total_limit(&self) -> Limit {
        Limit::from(self.max_connections_total)
    }

    /// The effective ceiling for `key`, taking per-host overrides into account
    #[must_use]
    pub fn host_limit(&self, key: &HostKey) -> Limit {
        self.hosts
            .get(key.host())
            .map_or(Limit::from(self.max_connections_per_host), |host| {
                host.effective_max_connections(self)
            })
    }

    /// How often the idle sweep runs. `None` disables the sweep.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.idle_connection_timeout.is_zero() {
            return None;
        }
        let interval = self
            .idle_sweep_interval
            .unwrap_or(self.idle_connection_timeout / 2);
        (!interval.is_zero()).then_some(interval)
    }
}

/// Per-host configuration overrides, keyed by hostname
pub type HostConfigs = HashMap<String, HostConfig>;

/// Configuration for a specific host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Maximum open connections to this host (0 = unlimited)
    pub max_connections: Option<usize>,
}

impl HostConfig {
    /// Get the effective ceiling, falling back to the global per-host default
    #[must_use]
    pub fn effective_max_connections(&self, global_config: &PoolConfig) -> Limit {
        Limit::from(
            self.max_connections
                .unwrap_or(global_config.max_connections_per_host),
        )
    }
}
