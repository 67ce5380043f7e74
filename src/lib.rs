#![forbid(unsafe_code)]

//! Scraper and publisher for the Tehran AirNow pollution archive.
//!
//! The archive site serves hourly pollution readings behind an ASP.NET
//! form: a session cookie plus server-side hidden fields must be captured
//! once and echoed back with every query. This crate opens that session,
//! expands a (year, month?, day?, station?) query into sequential
//! station-day scrapes, normalizes the scraped tables into uniquely keyed
//! records, upserts them into a local SQLite store, and pushes snapshots
//! to a CKAN open-data portal in bounded chunks.
//!
//! **Quick start**
//! ```no_run
//! use airnow_archive::{ArchiveQuery, LocalStore, PollutionArchive};
//!
//! let mut archive = PollutionArchive::open(airnow_archive::DEFAULT_BASE_URL)?;
//! let mut store = LocalStore::open("AirQuality.db")?;
//!
//! // All stations, Ordibehesht 1402.
//! let query = ArchiveQuery {
//!     year: 1402,
//!     month: Some(2),
//!     day: None,
//!     station: None,
//! };
//! if let Some(table) = archive.fetch(query)? {
//!     store.upsert_pollution(&table)?;
//! }
//! # Ok::<(), airnow_archive::Error>(())
//! ```
//!
//! Re-scraping the same period is idempotent: records are keyed by a
//! composite (date, hour, station) string and upserts replace by key.

pub mod archive;
pub mod catalog;
pub mod ckan;
pub mod cli;
pub mod config;
pub mod date;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod table;

pub use crate::archive::{ArchiveQuery, PollutionArchive};
pub use crate::catalog::{StationCatalog, StationRecord};
pub use crate::ckan::CkanClient;
pub use crate::config::{PortalMetadata, SiteConfig};
pub use crate::date::SolarDate;
pub use crate::error::{Error, Result};
pub use crate::session::{SessionClient, DEFAULT_BASE_URL};
pub use crate::store::{LocalStore, TableKind};
pub use crate::table::{DataTable, PollutionRecord, PollutionTable};
