use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Scrape hourly air-pollution measurements into SQLite and republish
/// them to the open-data portal.
#[derive(Debug, Parser)]
#[command(name = "airnow-archive", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Portal configuration file.
    #[arg(long, global = true, default_value = "website_info.yaml")]
    pub config: PathBuf,

    /// Dataset/resource metadata file.
    #[arg(long, global = true, default_value = "website/metadata.yaml")]
    pub metadata: PathBuf,

    /// Long-form dataset notes attached on dataset create/update.
    #[arg(long, global = true, default_value = "website/dataset_notes.md")]
    pub notes: PathBuf,

    /// SQLite database file.
    #[arg(long, global = true, default_value = "AirQuality.db")]
    pub database: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape pollution data for a date slice and upsert it locally.
    ///
    /// Without any date flags the previous day (source calendar) is
    /// scraped.
    Pollution {
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(short, long)]
        month: Option<u32>,
        #[arg(short, long)]
        day: Option<u32>,
        #[arg(short, long)]
        station: Option<u32>,
        /// Also push the scraped slice to the portal datastore.
        #[arg(short, long)]
        ckan: bool,
    },
    /// Refresh station metadata.
    Stations {
        /// Also push the station table to the portal datastore.
        #[arg(short, long)]
        ckan: bool,
    },
    /// Run the periodic scrape-and-publish loop.
    Schedule,
}

/// Build a composite-key prefix filter from a partially specified query.
///
/// Present fields render as zero-padded digit groups, absent ones as `_`
/// wildcards of the field's width; the result is a `LIKE` predicate over
/// the primary key.
pub fn id_filter(year: i32, month: Option<u32>, day: Option<u32>, station: Option<u32>) -> String {
    let mut pattern = format!("{year:04}");
    match month {
        Some(m) => pattern.push_str(&format!("{m:02}")),
        None => pattern.push_str("__"),
    }
    match day {
        Some(d) => pattern.push_str(&format!("{d:02}")),
        None => pattern.push_str("__"),
    }
    match station {
        Some(s) => pattern.push_str(&format!("{s:03}")),
        None => pattern.push_str("___"),
    }
    format!("ID LIKE '{pattern}%'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_query_renders_all_groups() {
        assert_eq!(
            id_filter(1401, Some(6), Some(15), Some(23)),
            "ID LIKE '14010615023%'"
        );
    }

    #[test]
    fn absent_fields_become_wildcards() {
        assert_eq!(id_filter(1401, None, None, None), "ID LIKE '1401_______%'");
        assert_eq!(
            id_filter(1401, None, Some(15), None),
            "ID LIKE '1401__15___%'"
        );
        assert_eq!(
            id_filter(1401, Some(6), None, Some(7)),
            "ID LIKE '140106__007%'"
        );
    }
}
