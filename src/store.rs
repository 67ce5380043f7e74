use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, types::ValueRef, Connection};
use tracing::debug;

use crate::catalog::StationRecord;
use crate::error::{Error, Result};
use crate::table::PollutionTable;

/// Pollutant measurement columns of the Pollution table.
pub const POLLUTANT_COLUMNS: [&str; 8] = ["CO", "O3", "NO", "NO2", "NOx", "SO2", "PM10", "PM2.5"];

/// Upper bound on SQL parameters per statement, far below SQLite's limit.
const DELETE_BATCH: usize = 500;

/// The two persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Stations,
    Pollution,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Stations => "Stations",
            TableKind::Pollution => "Pollution",
        }
    }

    fn create_sql(self) -> String {
        match self {
            TableKind::Stations => "CREATE TABLE IF NOT EXISTS Stations (
                    ID INTEGER PRIMARY KEY,
                    Station TEXT,
                    District INTEGER,
                    Date_of_Establishment TEXT
                )"
            .to_string(),
            TableKind::Pollution => {
                let measurements: Vec<String> = POLLUTANT_COLUMNS
                    .iter()
                    .map(|c| format!("\"{c}\" REAL"))
                    .collect();
                format!(
                    "CREATE TABLE IF NOT EXISTS Pollution (
                        ID TEXT PRIMARY KEY,
                        Date TEXT,
                        Hour INTEGER,
                        Station INTEGER NOT NULL,
                        {}
                    )",
                    measurements.join(",\n                        ")
                )
            }
        }
    }
}

/// Keyed relational store with delete-then-insert upsert semantics.
///
/// Schemas are created on first use; there are no migrations. Each upsert
/// runs in one transaction so a crash cannot leave a key deleted but not
/// reinserted.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Replace-by-key upsert of normalized pollution records.
    ///
    /// Rows whose composite key is in the input set are deleted and
    /// reinserted wholesale; everything else is left untouched, so
    /// re-scraping the same period is idempotent.
    pub fn upsert_pollution(&mut self, table: &PollutionTable) -> Result<usize> {
        for pollutant in &table.pollutants {
            if !POLLUTANT_COLUMNS.contains(&pollutant.as_str()) {
                return Err(Error::DataFormat(format!(
                    "unknown pollutant column: {pollutant:?}"
                )));
            }
        }

        self.conn
            .execute_batch(&TableKind::Pollution.create_sql())?;

        let tx = self.conn.transaction()?;
        let keys: Vec<&str> = table.records.iter().map(|r| r.id.as_str()).collect();
        delete_by_keys(&tx, TableKind::Pollution, &keys)?;

        {
            let quoted: Vec<String> = table.pollutants.iter().map(|c| format!("\"{c}\"")).collect();
            let placeholders: Vec<String> =
                (1..=4 + table.pollutants.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO Pollution (ID, Date, Hour, Station, {}) VALUES ({})",
                quoted.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for record in &table.records {
                let mut values: Vec<rusqlite::types::Value> = vec![
                    record.id.clone().into(),
                    record.date.clone().into(),
                    i64::from(record.hour).into(),
                    i64::from(record.station).into(),
                ];
                for v in &record.values {
                    values.push(match v {
                        Some(x) => (*x).into(),
                        None => rusqlite::types::Value::Null,
                    });
                }
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }

        tx.commit()?;
        debug!(rows = table.records.len(), "pollution upsert committed");
        Ok(table.records.len())
    }

    /// Wholesale refresh of station metadata, keyed by station id.
    pub fn upsert_stations(&mut self, records: &[StationRecord]) -> Result<usize> {
        self.conn
            .execute_batch(&TableKind::Stations.create_sql())?;

        let tx = self.conn.transaction()?;
        let keys: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        delete_by_keys(&tx, TableKind::Stations, &key_refs)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO Stations (ID, Station, District, Date_of_Establishment)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.name,
                    record.district,
                    record.established.to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(records.len())
    }

    /// All rows of a table, optionally restricted by a caller-supplied SQL
    /// predicate over the primary key, with every field rendered as text
    /// the way the remote datastore expects it.
    ///
    /// The filter fragment is interpolated verbatim; it is the caller's
    /// contract that it is well formed.
    pub fn query(
        &self,
        table: TableKind,
        filter: Option<&str>,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let mut sql = format!("SELECT * FROM {}", table.name());
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = BTreeMap::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), render_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Row count, for reporting after a run.
    pub fn count(&self, table: TableKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn delete_by_keys(conn: &Connection, table: TableKind, keys: &[&str]) -> Result<()> {
    for batch in keys.chunks(DELETE_BATCH) {
        let placeholders: Vec<String> = (1..=batch.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "DELETE FROM {} WHERE ID IN ({})",
            table.name(),
            placeholders.join(", ")
        );
        conn.execute(&sql, rusqlite::params_from_iter(batch.iter()))?;
    }
    Ok(())
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(_) => String::new(),
    }
}
