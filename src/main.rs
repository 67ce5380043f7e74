use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use airnow_archive::archive::{ArchiveQuery, PollutionArchive};
use airnow_archive::ckan::CkanClient;
use airnow_archive::cli::{id_filter, Cli, Command};
use airnow_archive::config::{PortalMetadata, SiteConfig};
use airnow_archive::date::SolarDate;
use airnow_archive::error::{Error, Result};
use airnow_archive::scheduler::Scheduler;
use airnow_archive::store::{LocalStore, TableKind};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Pollution {
            year,
            month,
            day,
            station,
            ckan,
        } => {
            let query = match year {
                Some(year) => ArchiveQuery {
                    year,
                    month,
                    day,
                    station,
                },
                // No date given: scrape the previous day.
                None => {
                    let yesterday =
                        SolarDate::from_gregorian(chrono::Local::now().date_naive()).pred();
                    ArchiveQuery::day(yesterday)
                }
            };

            let site = SiteConfig::load(&cli.config)?;
            let mut archive = PollutionArchive::open(&site.source_url)?;
            if let Some(station) = query.station {
                if !archive.catalog().contains(station) {
                    return Err(Error::UnknownStation(station.to_string()));
                }
            }
            let mut store = LocalStore::open(&cli.database)?;

            let rows = match archive.fetch(query)? {
                Some(table) => store.upsert_pollution(&table)?,
                None => 0,
            };
            let total = store.count(TableKind::Pollution)?;
            info!(rows, total, "pollution upsert finished");

            if ckan && rows > 0 {
                let metadata = PortalMetadata::load(&cli.metadata, Some(&cli.notes))?;
                let client = CkanClient::new(&site, metadata)?;
                let filter = id_filter(query.year, query.month, query.day, query.station);
                let slice = store.query(TableKind::Pollution, Some(&filter))?;
                client.push_records(TableKind::Pollution.name(), &slice)?;
            }
        }

        Command::Stations { ckan } => {
            let site = SiteConfig::load(&cli.config)?;
            let mut archive = PollutionArchive::open(&site.source_url)?;
            let stations = archive.station_info()?.to_vec();

            let mut store = LocalStore::open(&cli.database)?;
            let rows = store.upsert_stations(&stations)?;
            let total = store.count(TableKind::Stations)?;
            info!(rows, total, "station metadata refreshed");

            if ckan {
                let metadata = PortalMetadata::load(&cli.metadata, Some(&cli.notes))?;
                let client = CkanClient::new(&site, metadata)?;
                let snapshot = store.query(TableKind::Stations, None)?;
                client.push_records(TableKind::Stations.name(), &snapshot)?;
            }
        }

        Command::Schedule => {
            let site = SiteConfig::load(&cli.config)?;
            let scheduler = Scheduler::new(site, cli.metadata, cli.notes, cli.database)?;
            scheduler.run_loop()?;
        }
    }

    Ok(())
}
