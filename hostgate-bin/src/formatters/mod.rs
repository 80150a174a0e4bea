pub(crate) mod host_stats;
pub(crate) mod log;
pub(crate) mod stats;

use self::stats::StatsFormatter;
use crate::options::OutputFormat;

pub(crate) fn get_stats_formatter(format: OutputFormat) -> Box<dyn StatsFormatter> {
    match format {
        OutputFormat::Compact => Box::new(stats::Compact::new()),
        OutputFormat::Json => Box::new(stats::Json::new()),
    }
}
