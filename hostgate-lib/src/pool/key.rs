use serde::{Serialize, Serializer};
use std::{fmt, str::FromStr};
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// A type-safe representation of a pooling partition.
///
/// Connections are only ever reused between requests with the same scheme,
/// host and port. Path, query and fragment of a URL are irrelevant for the
/// partition, and the port defaults to the scheme's well-known port.
///
/// # Examples
///
/// ```
/// use hostgate_lib::HostKey;
/// use url::Url;
///
/// let url = Url::parse("http://API.example.com/repos?page=2").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.to_string(), "http://api.example.com:80");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    scheme: String,
    host: String,
    port: u16,
}

impl HostKey {
    /// Create a key from its parts. Scheme and host are normalized to lowercase.
    #[must_use]
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        HostKey {
            scheme: scheme.to_lowercase(),
            host: host.to_lowercase(),
            port,
        }
    }

    /// The URL scheme, e.g. `http`
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The hostname or IP address
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit or default port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ErrorKind::InvalidUrlPort(url.clone()))?;

        // IPv6 literals keep their brackets in `host_str`, which is what we
        // want for display and for connecting.
        Ok(HostKey::new(url.scheme(), host, port))
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        HostKey::try_from(&url)
    }
}

impl FromStr for HostKey {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| (s.to_string(), e))?;
        HostKey::try_from(&url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Serialize for HostKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
