use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::{convert::TryFrom, fmt::Display, time::Duration};
use url::Url;

use crate::ErrorKind;

/// A request that can be submitted to a [`crate::Client`].
///
/// The engine only looks at the URL (to find the pooling partition) and the
/// optional timeout. Method, headers and body are passed through to the
/// connection untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, e.g. `GET` or `POST`
    pub method: Method,

    /// Target of the request. Path and query do not influence connection reuse.
    pub url: Url,

    /// Headers sent in addition to the ones the transport adds itself
    pub headers: HeaderMap,

    /// Request body; empty for most methods
    pub body: Bytes,

    /// Request-level timeout overriding [`crate::PoolConfig::request_timeout`]
    pub timeout: Option<Duration>,
}

impl Request {
    /// Instantiate a new `Request` object
    #[inline]
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    /// Shorthand for a `GET` request
    #[inline]
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header to the request
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value are not valid
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ErrorKind> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set the request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a request-level timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl TryFrom<&str> for Request {
    type Error = ErrorKind;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| (s.to_string(), e))?;
        Ok(Request::get(url))
    }
}

impl TryFrom<String> for Request {
    type Error = ErrorKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Request::try_from(s.as_str())
    }
}

impl From<Url> for Request {
    fn from(url: Url) -> Self {
        Request::get(url)
    }
}
