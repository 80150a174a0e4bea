use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use std::fmt::Display;
use url::Url;

/// Response delivered through a [`crate::CompletionHandle`].
///
/// The body is fully buffered by the transport before the handle resolves,
/// so a `Response` is cheap to clone and detached from its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create new response
    #[inline]
    #[must_use]
    pub const fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Response {
            url,
            status,
            headers,
            body,
        }
    }

    /// The URL of the request this response answers
    #[inline]
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Retrieve the status code of the response
    #[inline]
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    #[inline]
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw response body
    #[inline]
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Response body decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the server allows the connection to be reused.
    ///
    /// HTTP/1.1 connections are persistent unless a `Connection` header
    /// carries the `close` token.
    #[must_use]
    pub fn is_keep_alive(&self) -> bool {
        !self
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("close"))
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.url)
    }
}
