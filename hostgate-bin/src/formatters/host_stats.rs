//! Per-host statistics as a table, one row per host.

use std::fmt::{self, Display};

use hostgate_lib::HostStatsMap;

pub(crate) struct CompactHostStats<'a> {
    pub(crate) host_stats: &'a HostStatsMap,
}

impl Display for CompactHostStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Per-host Statistics")?;
        writeln!(f, "{}", "─".repeat(60))?;

        let sorted_hosts = self.host_stats.sorted();

        let hostname_width = sorted_hosts
            .iter()
            .map(|(hostname, _)| hostname.len())
            .max()
            .unwrap_or(0)
            .max(8)
            + 2;

        for (hostname, stats) in sorted_hosts {
            let median_time = stats
                .median_request_time()
                .map_or_else(|| "N/A".to_string(), |d| format!("{:.0}ms", d.as_millis()));

            writeln!(
                f,
                "{:<width$} │ {:>6} reqs │ {:>6.1}% success │ {:>5} rejected │ {:>8} median │ {:>6.1}% reused",
                hostname,
                stats.total_requests,
                stats.success_rate() * 100.0,
                stats.rejected(),
                median_time,
                stats.reuse_rate() * 100.0,
                width = hostname_width
            )?;
        }

        Ok(())
    }
}
