use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::types::Rejection;

/// A [`HashMap`] mapping hosts to their [`HostStats`]
#[derive(Debug, Default, Serialize)]
pub struct HostStatsMap(HashMap<String, HostStats>);

impl HostStatsMap {
    /// Sort host statistics by request count (descending order)
    /// This matches the display order we want in the output
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, HostStats)> {
        let mut sorted_hosts: Vec<_> = self.0.clone().into_iter().collect();
        sorted_hosts.sort_by(|(a_host, a), (b_host, b)| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a_host.cmp(b_host))
        });
        sorted_hosts
    }

    /// Statistics for `host`, if any request was made to it
    #[must_use]
    pub fn get(&self, host: &str) -> Option<&HostStats> {
        self.0.get(host)
    }

    /// Returns `true` if no host was contacted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, HostStats>> for HostStatsMap {
    fn from(value: HashMap<String, HostStats>) -> Self {
        Self(value)
    }
}

/// Record and report statistics for a single [`crate::HostKey`]
#[derive(Debug, Clone, Default)]
pub struct HostStats {
    /// Total number of requests submitted for this host, including rejected ones
    pub total_requests: u64,
    /// Number of responses with a 2xx status
    pub successful_requests: u64,
    /// Number of responses with a non-2xx status
    pub error_responses: u64,
    /// Number of requests that failed without a response (transport errors, timeouts)
    pub failed_requests: u64,
    /// Number of requests rejected by the global ceiling
    pub rejected_total: u64,
    /// Number of requests rejected by the per-host ceiling
    pub rejected_per_host: u64,
    /// Number of connections opened
    pub connections_opened: u64,
    /// Number of requests served by an idle keep-alive connection
    pub connections_reused: u64,
    /// Request times for median calculation
    pub request_times: Vec<Duration>,
    /// Status code counts
    pub status_codes: HashMap<u16, u64>,
}

impl HostStats {
    /// Record a response with status code and request duration
    pub fn record_response(&mut self, status_code: u16, request_time: Duration) {
        self.total_requests += 1;
        *self.status_codes.entry(status_code).or_insert(0) += 1;

        if (200..=299).contains(&status_code) {
            self.successful_requests += 1;
        } else {
            self.error_responses += 1;
        }

        self.request_times.push(request_time);
    }

    /// Record a request that failed before a response arrived
    pub const fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }

    /// Record a request turned down by admission control
    pub const fn record_rejection(&mut self, reason: Rejection) {
        self.total_requests += 1;
        match reason {
            Rejection::TooManyConnections => self.rejected_total += 1,
            Rejection::TooManyConnectionsPerHost => self.rejected_per_host += 1,
        }
    }

    /// Record whether a request got a new or a reused connection
    pub const fn record_connection(&mut self, reused: bool) {
        if reused {
            self.connections_reused += 1;
        } else {
            self.connections_opened += 1;
        }
    }

    /// Number of rejected requests, regardless of the ceiling
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected_total + self.rejected_per_host
    }

    /// Get median request time
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        if self.request_times.is_empty() {
            return None;
        }

        let mut times = self.request_times.clone();
        times.sort();
        let mid = times.len() / 2;

        if times.len().is_multiple_of(2) {
            // Average of two middle values
            Some((times[mid - 1] + times[mid]) / 2)
        } else {
            Some(times[mid])
        }
    }

    /// Get average request time
    #[must_use]
    pub fn average_request_time(&self) -> Option<Duration> {
        if self.request_times.is_empty() {
            return None;
        }

        let total: Duration = self.request_times.iter().sum();
        #[allow(clippy::cast_possible_truncation)]
        Some(total / (self.request_times.len() as u32))
    }

    /// Get the current success rate (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0 // Assume success until proven otherwise
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.successful_requests as f64 / self.total_requests as f64;
            success_rate
        }
    }

    /// Share of connections that were reused (0.0 to 1.0)
    #[must_use]
    pub fn reuse_rate(&self) -> f64 {
        let connections = self.connections_opened + self.connections_reused;
        if connections == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let reuse_rate = self.connections_reused as f64 / connections as f64;
            reuse_rate
        }
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let success_pct = (self.success_rate() * 100.0) as u64;

        let avg_time = self
            .average_request_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{:.0}ms", d.as_millis()));

        format!(
            "{} requests ({}% success, {} rejected), {} opened, {} reused, avg: {}",
            self.total_requests,
            success_pct,
            self.rejected(),
            self.connections_opened,
            self.connections_reused,
            avg_time
        )
    }
}

impl Serialize for HostStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let median_request_time_ms = self.median_request_time().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("HostStats", 11)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("successful_requests", &self.successful_requests)?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("error_responses", &self.error_responses)?;
        s.serialize_field("failed_requests", &self.failed_requests)?;
        s.serialize_field("rejected_total", &self.rejected_total)?;
        s.serialize_field("rejected_per_host", &self.rejected_per_host)?;
        s.serialize_field("connections_opened", &self.connections_opened)?;
        s.serialize_field("connections_reused", &self.connections_reused)?;
        s.serialize_field("median_request_time_ms", &median_request_time_ms)?;
        s.serialize_field("status_codes", &self.status_codes)?;
        s.end()
    }
}
