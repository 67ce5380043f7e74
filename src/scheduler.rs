use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDate, Timelike};
use reqwest::blocking::Client as HttpClient;
use tracing::{debug, error, info};

use crate::archive::{ArchiveQuery, PollutionArchive};
use crate::ckan::CkanClient;
use crate::cli::id_filter;
use crate::config::{PortalMetadata, SiteConfig};
use crate::date::SolarDate;
use crate::error::Result;
use crate::store::{LocalStore, TableKind};

/// Tick interval of the scheduler loop.
const TICK: Duration = Duration::from_secs(30);

/// Minute of the hour at which the hourly update fires.
const HOURLY_MINUTE: u32 = 10;

/// Local hour at which the daily backfill fires.
const DAILY_HOUR: u32 = 8;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a scheduled pipeline run needs.
pub struct Scheduler {
    site: SiteConfig,
    metadata_path: PathBuf,
    notes_path: PathBuf,
    db_path: PathBuf,
    http: HttpClient,
}

impl Scheduler {
    pub fn new(
        site: SiteConfig,
        metadata_path: PathBuf,
        notes_path: PathBuf,
        db_path: PathBuf,
    ) -> Result<Self> {
        let http = HttpClient::builder().timeout(PING_TIMEOUT).build()?;
        Ok(Self {
            site,
            metadata_path,
            notes_path,
            db_path,
            http,
        })
    }

    /// Run the periodic loop: an hourly update at minute 10, a daily
    /// backfill for yesterday at 08:00, and a liveness ping every tick.
    ///
    /// A failed pipeline run is logged and reported to the monitoring
    /// endpoint; the loop itself keeps going so the next trigger still
    /// fires.
    pub fn run_loop(&self) -> Result<()> {
        info!("scheduler started");
        let mut last_hourly: Option<(NaiveDate, u32)> = None;
        let mut last_daily: Option<NaiveDate> = None;

        loop {
            let now = Local::now();
            let civil_today = now.date_naive();

            if now.minute() >= HOURLY_MINUTE && last_hourly != Some((civil_today, now.hour())) {
                last_hourly = Some((civil_today, now.hour()));
                self.hourly_update(now.hour());
            }

            if now.hour() >= DAILY_HOUR && last_daily != Some(civil_today) {
                last_daily = Some(civil_today);
                self.daily_update();
            }

            if let Some(hc) = &self.site.healthchecks {
                self.ping(&hc.run);
            }
            thread::sleep(TICK);
        }
    }

    /// Scrape today's data (or yesterday's during the first hour, when
    /// today has no readings yet) and publish it.
    fn hourly_update(&self, local_hour: u32) {
        self.ping_data_flow("/start");
        let today = SolarDate::from_gregorian(Local::now().date_naive());
        let target = if local_hour > 0 { today } else { today.pred() };

        match self.run_pipeline(target) {
            Ok(rows) => {
                info!(date = %target, rows, "hourly update done");
                self.ping_data_flow("");
            }
            Err(e) => {
                error!(date = %target, error = %e, "hourly update failed");
                self.ping_data_flow("/fail");
            }
        }
    }

    /// Re-scrape all of yesterday to pick up late corrections.
    fn daily_update(&self) {
        let yesterday = SolarDate::from_gregorian(Local::now().date_naive()).pred();
        match self.run_pipeline(yesterday) {
            Ok(rows) => info!(date = %yesterday, rows, "daily update done"),
            Err(e) => {
                error!(date = %yesterday, error = %e, "daily update failed");
                self.ping_data_flow("/fail");
            }
        }
    }

    /// One full scrape -> store -> publish cycle for a single day.
    fn run_pipeline(&self, date: SolarDate) -> Result<usize> {
        let mut archive = PollutionArchive::open(&self.site.source_url)?;
        let mut store = LocalStore::open(&self.db_path)?;

        let stations = archive.station_info()?.to_vec();
        store.upsert_stations(&stations)?;

        let rows = match archive.fetch(ArchiveQuery::day(date))? {
            Some(table) => store.upsert_pollution(&table)?,
            None => {
                info!(date = %date, "no data for day");
                0
            }
        };

        if rows > 0 {
            let metadata =
                PortalMetadata::load(&self.metadata_path, Some(&self.notes_path))?;
            let ckan = CkanClient::new(&self.site, metadata)?;
            let filter = id_filter(date.year, Some(date.month), Some(date.day), None);
            let slice = store.query(TableKind::Pollution, Some(&filter))?;
            ckan.push_records(TableKind::Pollution.name(), &slice)?;
        }

        Ok(rows)
    }

    fn ping_data_flow(&self, suffix: &str) {
        if let Some(hc) = &self.site.healthchecks {
            self.ping(&format!("{}{suffix}", hc.data_flow));
        }
    }

    /// Best effort; a failed ping must never take the loop down.
    fn ping(&self, url: &str) {
        if let Err(e) = self.http.get(url).send() {
            debug!(url, error = %e, "healthcheck ping failed");
        }
    }
}
