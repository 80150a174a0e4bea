use std::fmt::{self, Display};

use hostgate_lib::{ErrorKind, Response};
use serde::Serialize;

/// The outcome of a single submitted URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FetchResult {
    pub(crate) url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl FetchResult {
    pub(crate) fn new(url: &str, result: &Result<Response, ErrorKind>) -> Self {
        match result {
            Ok(response) => Self {
                url: url.to_string(),
                status: Some(response.status().as_u16()),
                error: None,
            },
            Err(e) => Self {
                url: url.to_string(),
                status: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.error) {
            (Some(status), _) => write!(f, "[{status}] {}", self.url),
            (None, Some(error)) => write!(f, "[ERROR] {} | {error}", self.url),
            (None, None) => write!(f, "[ERROR] {}", self.url),
        }
    }
}

/// Counts over all results of a run, in submission order
#[derive(Debug, Default, Serialize)]
pub(crate) struct FetchStats {
    pub(crate) total: usize,
    /// Responses with a 2xx status
    pub(crate) successful: usize,
    /// Responses with any other status
    pub(crate) error_responses: usize,
    /// Requests that got no response at all, rejections included
    pub(crate) failures: usize,
    pub(crate) rejected: usize,
    pub(crate) timeouts: usize,
    pub(crate) results: Vec<FetchResult>,
}

impl FetchStats {
    pub(crate) fn add(&mut self, url: &str, result: &Result<Response, ErrorKind>) {
        self.total += 1;

        match result {
            Ok(response) if response.status().is_success() => self.successful += 1,
            Ok(_) => self.error_responses += 1,
            Err(e) => {
                self.failures += 1;
                if e.is_rejection() {
                    self.rejected += 1;
                } else if e.is_timeout() {
                    self.timeouts += 1;
                }
            }
        }

        self.results.push(FetchResult::new(url, result));
    }

    /// A run succeeds when every request got a response
    #[inline]
    pub(crate) const fn is_success(&self) -> bool {
        self.failures == 0
    }
}
