//! `hostgate` is a connection admission and dispatch engine for HTTP clients.
//!
//! It decides for every request whether an idle keep-alive connection can be
//! reused or a new connection may be opened, enforces global and per-host
//! connection ceilings, and reports outcomes through cancellable
//! [`CompletionHandle`]s. Requests over a ceiling are rejected right away
//! instead of being queued.
//!
//! "Hello world" example:
//! ```no_run
//! use hostgate_lib::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let response = hostgate_lib::fetch("http://example.com/").await?;
//!   println!("{}", response);
//!   Ok(())
//! }
//! ```
//!
//! For more specific use-cases you can build a client yourself, using the
//! `ClientBuilder` to configure ceilings, timeouts and keep-alive:
//!
//! ```no_run
//! use hostgate_lib::{ClientBuilder, HandleState, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!     .max_connections_total(64_usize)
//!     .max_connections_per_host(4_usize)
//!     .build()
//!     .client()?;
//!
//!   let handle = client.submit("http://example.com/");
//!   if handle.state() == HandleState::Failed {
//!     // Rejected before any connection was touched
//!   }
//!   let response = handle.wait().await?;
//!   assert!(response.status().is_success());
//!   client.shutdown().await;
//!   Ok(())
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod dispatch;
mod handle;
mod types;
mod waiter;

pub mod pool;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use crate::{
    client::{Client, ClientBuilder, DEFAULT_USER_AGENT, fetch},
    dispatch::Dispatcher,
    handle::{CompletionHandle, HandleState},
    pool::{HostConfig, HostKey, HostStats, HostStatsMap, PoolConfig},
    types::{ErrorKind, Rejection, Request, Response, Result},
};
