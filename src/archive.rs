use tracing::{info, warn};

use crate::catalog::{fetch_station_info, StationCatalog, StationRecord};
use crate::date::{days_in_month, SolarDate};
use crate::error::{Error, Result};
use crate::session::{fetch_station_options, SessionClient};
use crate::table::{
    clean_input_table, clean_output_table, extract_table, DataTable, PollutionTable,
    NO_RECORDS_SENTINEL,
};

/// Report granularity sent with every archive form post.
const TIME_UNIT: &str = "hour";
const DECIMAL_PLACES: u32 = 2;

/// A partially specified (year, month, day, station) query.
///
/// The most specific granularity wins: a bare year walks the whole year, a
/// station implies a single station-day. A `station` without `day`, or a
/// `day` without `month`, is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub station: Option<u32>,
}

impl ArchiveQuery {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
            station: None,
        }
    }

    pub fn day(date: SolarDate) -> Self {
        Self {
            year: date.year,
            month: Some(date.month),
            day: Some(date.day),
            station: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.station.is_some() && self.day.is_none() {
            return Err(Error::InvalidQuery(
                "station queries need an explicit day".into(),
            ));
        }
        if self.day.is_some() && self.month.is_none() {
            return Err(Error::InvalidQuery("day queries need an explicit month".into()));
        }
        Ok(())
    }
}

/// The date-grid walker: expands a query into sequential station-day
/// scrapes against one open session and concatenates the results
/// bottom-up.
///
/// Station establishment dates are fetched lazily, at most once per walker
/// lifetime. A walker owns its session; open a new walker for a new
/// pipeline run.
pub struct PollutionArchive {
    session: SessionClient,
    catalog: StationCatalog,
    station_info: Option<Vec<StationRecord>>,
}

impl PollutionArchive {
    /// Open a scraping session and bootstrap the station catalog from the
    /// archive page dropdown.
    pub fn open(base_url: &str) -> Result<Self> {
        let session = SessionClient::open(base_url)?;
        let catalog = StationCatalog::from_options(fetch_station_options(base_url)?);
        Ok(Self {
            session,
            catalog,
            station_info: None,
        })
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    /// Station metadata (district, establishment date), fetched on first
    /// use and cached for the walker's lifetime.
    pub fn station_info(&mut self) -> Result<&[StationRecord]> {
        if self.station_info.is_none() {
            let records = fetch_station_info(&self.session, &self.catalog)?;
            self.station_info = Some(records);
        }
        Ok(self.station_info.as_deref().expect("just populated"))
    }

    /// Run a query and normalize the result. `Ok(None)` means the source
    /// has no data for the requested slice, which is not an error.
    pub fn fetch(&mut self, query: ArchiveQuery) -> Result<Option<PollutionTable>> {
        query.validate()?;

        let table = match (query.month, query.day, query.station) {
            (Some(month), Some(day), Some(station)) => {
                let date = SolarDate::new(query.year, month, day)?;
                let table = self.station_day(date, station)?;
                (!is_no_records(&table)).then_some(table)
            }
            (Some(month), Some(day), None) => {
                let date = SolarDate::new(query.year, month, day)?;
                self.day(date)?
            }
            (Some(month), None, None) => self.month(query.year, month)?,
            (None, None, None) => self.year(query.year)?,
            // validate() has already rejected the rest.
            _ => unreachable!("validated query"),
        };

        match table {
            Some(t) if !t.is_empty() => {
                let cleaned = clean_output_table(&t, &self.catalog)?;
                Ok(Some(cleaned))
            }
            _ => Ok(None),
        }
    }

    /// One request+clean cycle for a single station and day. The result may
    /// still be the server's "no records" sentinel row.
    pub fn station_day(&self, date: SolarDate, station: u32) -> Result<DataTable> {
        let body = self
            .session
            .request_station_day(station, date, TIME_UNIT, DECIMAL_PLACES)?;
        let grid = extract_table(&body)?;
        clean_input_table(grid)
    }

    /// All stations established on or before `date`, concatenated.
    ///
    /// Empty-report sentinels are skipped silently; a malformed station
    /// page is logged and skipped so one broken leaf does not abort the
    /// walk. Network errors propagate.
    pub fn day(&mut self, date: SolarDate) -> Result<Option<DataTable>> {
        info!(%date, "fetching day");
        let eligible = eligible_stations(self.station_info()?, date);

        let mut combined = DataTable::default();
        for station in eligible {
            let table = match self.station_day(date, station) {
                Ok(table) => table,
                Err(e @ (Error::Parse(_) | Error::DataFormat(_))) => {
                    warn!(%date, station, error = %e, "skipping malformed station-day");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if is_no_records(&table) {
                continue;
            }
            combined.append(table);
        }

        Ok((!combined.is_empty()).then_some(combined))
    }

    /// Concatenate non-empty days across one month of the source calendar.
    pub fn month(&mut self, year: i32, month: u32) -> Result<Option<DataTable>> {
        let mut combined = DataTable::default();
        for day in 1..=days_in_month(year, month) {
            let date = SolarDate::new(year, month, day)?;
            if let Some(table) = self.day(date)? {
                combined.append(table);
            }
        }
        Ok((!combined.is_empty()).then_some(combined))
    }

    /// Concatenate non-empty months across a whole year.
    pub fn year(&mut self, year: i32) -> Result<Option<DataTable>> {
        let mut combined = DataTable::default();
        for month in 1..=12 {
            if let Some(table) = self.month(year, month)? {
                combined.append(table);
            }
        }
        Ok((!combined.is_empty()).then_some(combined))
    }
}

/// True when a station-day table is the server's empty-report sentinel.
pub fn is_no_records(table: &DataTable) -> bool {
    table
        .rows
        .first()
        .and_then(|row| row.first())
        .is_some_and(|cell| cell.trim() == NO_RECORDS_SENTINEL)
}

/// Stations established on or before `date`, out of a station-info table.
pub fn eligible_stations(info: &[StationRecord], date: SolarDate) -> Vec<u32> {
    info.iter()
        .filter(|s| s.established <= date)
        .map(|s| s.id)
        .collect()
}
