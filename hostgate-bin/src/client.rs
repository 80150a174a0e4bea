use crate::options::Config;
use anyhow::{Context, Result};
use hostgate_lib::{Client, ClientBuilder};

/// Creates a client according to the command-line config.
///
/// Must be called from within the Tokio runtime that drives the requests.
pub(crate) fn create(cfg: &Config) -> Result<Client> {
    ClientBuilder::builder()
        .max_connections_total(cfg.max_connections)
        .max_connections_per_host(cfg.max_connections_per_host)
        .hosts(cfg.hosts.clone())
        .connect_timeout(cfg.connect_timeout)
        .idle_connection_timeout(cfg.idle_timeout)
        .keep_alive(!cfg.no_keep_alive)
        .max_idle_per_host(cfg.max_idle_per_host)
        .request_timeout(cfg.timeout)
        .user_agent(cfg.user_agent.clone())
        .build()
        .client()
        .context("Failed to create request client")
}
