use anyhow::Result;
use std::fmt::{self, Display};

use super::{OutputStats, StatsFormatter};
use crate::formatters::host_stats::CompactHostStats;

struct CompactOutputStats<'a> {
    stats: &'a OutputStats,
}

impl Display for CompactOutputStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats.fetch_stats;

        for result in &stats.results {
            writeln!(f, "{result}")?;
        }
        writeln!(f)?;

        write!(f, "{} Total, {} OK", stats.total, stats.successful)?;
        if stats.error_responses > 0 {
            write!(f, ", {} Non-2xx", stats.error_responses)?;
        }
        let err_str = if stats.failures == 1 { "Error" } else { "Errors" };
        write!(f, ", {} {err_str}", stats.failures)?;
        if stats.rejected > 0 {
            write!(f, " ({} rejected)", stats.rejected)?;
        }

        if let Some(host_stats) = &self.stats.host_stats
            && !host_stats.is_empty()
        {
            writeln!(f)?;
            write!(f, "{}", CompactHostStats { host_stats })?;
        }

        Ok(())
    }
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl StatsFormatter for Compact {
    fn format(&self, stats: &OutputStats) -> Result<String> {
        Ok(CompactOutputStats { stats }.to_string())
    }
}
