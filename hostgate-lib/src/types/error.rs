use serde::{Serialize, Serializer};
use std::{convert::Infallible, time::Duration};
use strum::{Display, IntoStaticStr};
use thiserror::Error;
use url::Url;

use crate::pool::HostKey;
use crate::transport::TransportError;

/// The reason an admission request was turned down.
///
/// Both variants surface as [`ErrorKind::AdmissionRejected`]; callers that
/// need to tell the two ceilings apart match on this value instead of the
/// rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize)]
pub enum Rejection {
    /// The global `max_connections_total` ceiling is reached
    #[strum(serialize = "Too many connections")]
    TooManyConnections,
    /// The ceiling for the request's host is reached
    #[strum(serialize = "Too many connections per host")]
    TooManyConnectionsPerHost,
}

/// Possible errors when dispatching requests with `hostgate_lib`
#[allow(variant_size_differences)]
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A connection ceiling is exhausted. The request never touched a connection.
    #[error("{reason}")]
    AdmissionRejected {
        /// Which ceiling rejected the request
        reason: Rejection,
        /// The pooling partition the request was addressed to
        host: HostKey,
    },
    /// Opening, writing to, or reading from a connection failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport did not produce a connection in time
    #[error("Connecting to {host} timed out after {elapsed}", host = .0, elapsed = humantime_duration(.1))]
    ConnectTimeout(HostKey, Duration),
    /// A request-level timeout elapsed before the response arrived
    #[error("Request to {host} timed out after {elapsed}", host = .0, elapsed = humantime_duration(.1))]
    RequestTimeout(HostKey, Duration),
    /// The caller stopped waiting for a response. The request itself may still be running.
    #[error("No response within {}", humantime_duration(.0))]
    Timeout(Duration),
    /// The completion handle was cancelled
    #[error("Request was cancelled")]
    Cancelled,
    /// The request task was dropped before it produced an outcome,
    /// e.g. because the runtime shut down
    #[error("Request was abandoned before completion")]
    Abandoned,
    /// The client no longer accepts requests
    #[error("Client has been shut down")]
    ShutDown,
    /// No Tokio runtime was available to drive requests
    #[error("No Tokio runtime available; build the client from within a runtime")]
    MissingRuntime,
    /// An URL with an invalid host was found
    #[error("URL is missing a host")]
    InvalidUrlHost,
    /// The URL has neither an explicit port nor a known default for its scheme
    #[error("Cannot determine port for URL `{0}`")]
    InvalidUrlPort(Url),
    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse `{0}` as URL: {1}")]
    UrlParseError(String, url::ParseError),
    /// The given header could not be parsed.
    #[error("Header could not be parsed: {0}")]
    InvalidHeader(String),
}

impl ErrorKind {
    /// The rejection reason, if this error is an admission rejection
    #[must_use]
    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::AdmissionRejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Returns `true` if a connection ceiling turned the request down
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }

    /// Returns `true` for any of the timeout variants
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ConnectTimeout(..) | Self::RequestTimeout(..)
        )
    }
}

fn humantime_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::AdmissionRejected { reason: r1, host: h1 },
                Self::AdmissionRejected { reason: r2, host: h2 },
            ) => r1 == r2 && h1 == h2,
            (Self::Transport(e1), Self::Transport(e2)) => e1.to_string() == e2.to_string(),
            (Self::ConnectTimeout(h1, d1), Self::ConnectTimeout(h2, d2))
            | (Self::RequestTimeout(h1, d1), Self::RequestTimeout(h2, d2)) => h1 == h2 && d1 == d2,
            (Self::Timeout(d1), Self::Timeout(d2)) => d1 == d2,
            (Self::InvalidUrlPort(u1), Self::InvalidUrlPort(u2)) => u1 == u2,
            (Self::UrlParseError(s1, e1), Self::UrlParseError(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidHeader(s1), Self::InvalidHeader(s2)) => s1 == s2,
            (Self::Cancelled, Self::Cancelled)
            | (Self::Abandoned, Self::Abandoned)
            | (Self::ShutDown, Self::ShutDown)
            | (Self::MissingRuntime, Self::MissingRuntime)
            | (Self::InvalidUrlHost, Self::InvalidUrlHost) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<http::header::InvalidHeaderValue> for ErrorKind {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for ErrorKind {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

impl From<(String, url::ParseError)> for ErrorKind {
    fn from(value: (String, url::ParseError)) -> Self {
        Self::UrlParseError(value.0, value.1)
    }
}

impl From<Infallible> for ErrorKind {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}
