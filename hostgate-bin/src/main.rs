//! `hostgate` fetches URLs through the hostgate connection admission engine.
//!
//! Every URL is submitted at once. Requests that exceed the global or
//! per-host connection ceiling are rejected right away, idle keep-alive
//! connections are reused, and one line per result is printed.
//!
//! Fetch a single URL:
//! ```sh
//! hostgate http://localhost:8080/
//! ```
//!
//! Submit a URL ten times with at most two connections to its host:
//! ```sh
//! hostgate --repeat 10 --max-connections-per-host 2 http://localhost:8080/
//! ```
//!
//! Show per-host statistics as JSON:
//! ```sh
//! hostgate --host-stats --format json http://localhost:8080/a http://localhost:9090/b
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

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use formatters::log::init_logging;

mod client;
mod commands;
mod formatters;
mod options;
mod stats;
mod verbosity;

use crate::{
    formatters::stats::{OutputStats, output_statistics},
    options::{Config, HOSTGATE_CONFIG_FILE, HostgateOptions},
};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line options.
fn load_config() -> Result<HostgateOptions> {
    let mut opts = HostgateOptions::parse();

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, the default one is loaded if it
        // exists. An invalid default file is still an error.
        let default_config = PathBuf::from(HOSTGATE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    init_logging(&opts.config.verbose);

    Ok(opts)
}

/// Set up runtime and call hostgate entrypoint
fn run_main() -> Result<i32> {
    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            // Logging may not be initialized yet
            eprintln!("[ERROR] Error while loading config: {e}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = match opts.config.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    runtime.block_on(run(&opts))
}

/// Run hostgate on the given URLs
async fn run(opts: &HostgateOptions) -> Result<i32> {
    let client = client::create(&opts.config)?;

    let outcome = commands::fetch(&client, &opts.urls, &opts.config).await;
    client.shutdown().await;
    let (fetch_stats, exit_code) = outcome?;

    let stats = OutputStats {
        fetch_stats,
        host_stats: opts.config.host_stats.then(|| client.host_stats()),
    };
    output_statistics(&stats, &opts.config)?;

    Ok(exit_code as i32)
}
