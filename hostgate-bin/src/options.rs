use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::{Parser, ValueEnum, builder::TypedValueParser};
use const_format::formatcp;
use hostgate_lib::{
    DEFAULT_USER_AGENT,
    pool::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_CONNECTION_TIMEOUT, HostConfigs},
};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};

pub(crate) const HOSTGATE_CONFIG_FILE: &str = "hostgate.toml";

const DEFAULT_METHOD: &str = "GET";
const DEFAULT_REPEAT: usize = 1;

// clap wants `&str` defaults while serde uses the `Duration` constants
// from the library; a test keeps both in sync.
const CONNECT_TIMEOUT_STR: &str = "10s";
const IDLE_TIMEOUT_STR: &str = "1m";

// The default config file is only shown in the help text, so that a missing
// `hostgate.toml` is not an error while a missing `--config` file is.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    HOSTGATE_CONFIG_FILE,
);

/// The format used for results and statistics
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    /// One line per result, followed by a summary
    #[default]
    Compact,
    /// A single JSON document
    Json,
}

macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    connect_timeout: Duration = DEFAULT_CONNECT_TIMEOUT;
    idle_timeout: Duration = DEFAULT_IDLE_CONNECTION_TIMEOUT;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    method: String = DEFAULT_METHOD.to_string();
    repeat: usize = DEFAULT_REPEAT;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// Name and value are trimmed; everything after the first colon is the value.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = header.split_once(':') else {
        return Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        ));
    };
    let name = name.trim();
    let name = HeaderName::from_str(name)
        .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
    Ok((name, value))
}

/// Parses a single HTTP header into a tuple of (String, String)
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid = |message: String| clap::Error::raw(clap::error::ErrorKind::InvalidValue, message);

        let header = value
            .to_str()
            .ok_or_else(|| invalid("Header value contains invalid UTF-8".to_string()))?;
        let (name, value) = parse_single_header(header).map_err(|e| invalid(e.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| invalid("Header value contains invalid UTF-8".to_string()))?;
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// hostgate fetches URLs through a connection admission engine.
///
/// Every URL is submitted right away. Requests over the global or per-host
/// connection ceiling are rejected instead of queued, idle keep-alive
/// connections are reused.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct HostgateOptions {
    /// URLs to fetch (plain `http` only)
    #[arg(name = "urls", required = true)]
    pub(crate) urls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for hostgate
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Maximum number of open connections across all hosts (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub(crate) max_connections: usize,

    /// Maximum number of open connections to a single host (0 = unlimited)
    ///
    /// Individual hosts can be configured in the config file with
    /// `[hosts."example.com"]` tables.
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub(crate) max_connections_per_host: usize,

    /// Timeout for opening a connection, e.g. `5s` (0 disables it)
    #[arg(long, value_parser = humantime::parse_duration, default_value = CONNECT_TIMEOUT_STR)]
    #[serde(default = "connect_timeout", with = "humantime_serde")]
    pub(crate) connect_timeout: Duration,

    /// Close idle keep-alive connections after this long (0 keeps them)
    #[arg(long, value_parser = humantime::parse_duration, default_value = IDLE_TIMEOUT_STR)]
    #[serde(default = "idle_timeout", with = "humantime_serde")]
    pub(crate) idle_timeout: Duration,

    /// Close every connection after its response instead of keeping it alive
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_keep_alive: bool,

    /// Maximum number of idle connections kept per host (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub(crate) max_idle_per_host: usize,

    /// Timeout for a request on an established connection, e.g. `30s`
    #[arg(short, long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) timeout: Option<Duration>,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Request method
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// Custom request header
    #[arg(
        short = 'H',
        long = "header",
        value_parser = HeaderParser,
        number_of_values = 1,
        long_help = "Set custom header for requests

Some websites require custom headers to be passed in order to return valid responses.
You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
This is the same format that other tools like curl or wget use.
Multiple headers can be specified by using the flag multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Submit every URL this many times at once
    #[arg(short, long, default_value_t = DEFAULT_REPEAT)]
    #[serde(default = "repeat")]
    pub(crate) repeat: usize,

    /// Output format of results and statistics
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Compact)]
    #[serde(default)]
    pub(crate) format: OutputFormat,

    /// Show per-host statistics at the end of the run
    #[arg(long)]
    #[serde(default)]
    pub(crate) host_stats: bool,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,

    /// Host-specific configurations from config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) hosts: HostConfigs,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Overwrites existing headers in `self` with the values from `other`.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();

        let merged_map: HashMap<_, _> = self_map.into_iter().chain(other_map).collect();
        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // Per-host tables only exist in TOML
        self.hosts = toml.hosts;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..hosts,

                // Keys with defaults to assign
                verbose: verbosity(),
                max_connections: 0,
                max_connections_per_host: 0,
                connect_timeout: connect_timeout(),
                idle_timeout: idle_timeout(),
                no_keep_alive: false,
                max_idle_per_host: 0,
                timeout: None,
                user_agent: user_agent(),
                method: method(),
                repeat: repeat(),
                format: OutputFormat::default(),
                host_stats: false,
                threads: None,
            }
        }
    }
}
