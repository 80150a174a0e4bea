mod compact;
mod json;

pub(crate) use compact::Compact;
pub(crate) use json::Json;

use anyhow::Result;
use hostgate_lib::HostStatsMap;
use serde::Serialize;

use crate::{formatters::get_stats_formatter, options::Config, stats::FetchStats};

/// Everything printed at the end of a run
#[derive(Debug, Serialize)]
pub(crate) struct OutputStats {
    #[serde(flatten)]
    pub(crate) fetch_stats: FetchStats,
    #[serde(rename = "host_statistics", skip_serializing_if = "Option::is_none")]
    pub(crate) host_stats: Option<HostStatsMap>,
}

pub(crate) trait StatsFormatter {
    /// Format the results and statistics of a run
    fn format(&self, stats: &OutputStats) -> Result<String>;
}

/// Print the results and statistics in the configured format
pub(crate) fn output_statistics(stats: &OutputStats, config: &Config) -> Result<()> {
    let formatter = get_stats_formatter(config.format);
    println!("{}", formatter.format(stats)?);
    Ok(())
}
