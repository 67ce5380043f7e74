use scraper::{Html, Selector};

use crate::catalog::StationCatalog;
use crate::error::{Error, Result};

/// Literal the server renders as the only cell of an empty report.
pub const NO_RECORDS_SENTINEL: &str = "رکوردی برای نمایش موجود نیست.";

/// Placeholder the server renders for a missing measurement.
const MISSING_VALUE: &str = "\u{a0}";

/// Source-language header cells and their canonical names.
const HEADER_RENAMES: [(&str, &str); 3] =
    [("ایستگاه", "Station"), ("ساعت", "Hour"), ("تاریخ", "Date")];

/// A scraped table: canonical header plus string rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenate another table's rows, aligning columns by name.
    ///
    /// Different station pages can serve pollutant columns in a different
    /// order or with a different column set, so positional concatenation
    /// is not safe. Columns new to `self` are unioned in and back-filled
    /// with the missing-value placeholder; cells absent from `other` are
    /// filled the same way.
    pub fn append(&mut self, mut other: DataTable) {
        if self.header.is_empty() || self.header == other.header {
            if self.header.is_empty() {
                self.header = other.header;
            }
            self.rows.append(&mut other.rows);
            return;
        }

        for name in &other.header {
            if !self.header.contains(name) {
                self.header.push(name.clone());
                for row in &mut self.rows {
                    row.push(MISSING_VALUE.to_string());
                }
            }
        }

        let positions: Vec<Option<usize>> = self
            .header
            .iter()
            .map(|name| other.header.iter().position(|h| h == name))
            .collect();
        for row in other.rows {
            let aligned = positions
                .iter()
                .map(|position| match position {
                    Some(i) => row
                        .get(*i)
                        .cloned()
                        .unwrap_or_else(|| MISSING_VALUE.to_string()),
                    None => MISSING_VALUE.to_string(),
                })
                .collect();
            self.rows.push(aligned);
        }
    }
}

/// One normalized hourly reading for one station.
///
/// `id` is the composite primary key: zero-padded date digits, 2-digit
/// hour, 3-digit station id. `values` line up with the pollutant column
/// names carried by the surrounding [`PollutionTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollutionRecord {
    pub id: String,
    pub date: String,
    pub hour: u32,
    pub station: u32,
    pub values: Vec<Option<f64>>,
}

/// Normalized output of one or more station-day scrapes: the pollutant
/// column names plus the records in canonical (Date, Hour, Station,
/// pollutants...) layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollutionTable {
    pub pollutants: Vec<String>,
    pub records: Vec<PollutionRecord>,
}

/// Composite primary key for one (date, hour, station) reading.
///
/// Pure and deterministic: `1402/02/01`, hour 5, station 21 maps to
/// `"1402020105021"` on every run.
pub fn composite_key(date: &str, hour: u32, station: u32) -> String {
    format!("{}{hour:02}{station:03}", date.replace('/', ""))
}

/// Parse the first HTML table of a response body into a grid of cell text.
pub fn extract_table(body: &str) -> Result<Vec<Vec<String>>> {
    let document = Html::parse_document(body);
    let table_sel = Selector::parse("table").expect("valid selector");
    let row_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| Error::Parse("no table element in response".into()))?;

    let mut grid = Vec::new();
    for row in table.select(&row_sel) {
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|cell| cell.text().collect::<String>())
            .collect();
        if !cells.is_empty() {
            grid.push(cells);
        }
    }
    Ok(grid)
}

/// Treat row 0 as the header, rename the known source-language cells to
/// canonical names, and drop the header row from the data.
pub fn clean_input_table(grid: Vec<Vec<String>>) -> Result<DataTable> {
    let mut grid = grid.into_iter();
    let raw_header = grid
        .next()
        .ok_or_else(|| Error::Parse("scraped table has no header row".into()))?;

    let header = raw_header
        .into_iter()
        .map(|cell| {
            let trimmed = cell.trim();
            HEADER_RENAMES
                .iter()
                .find(|(from, _)| *from == trimmed)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| trimmed.to_string())
        })
        .collect();

    Ok(DataTable {
        header,
        rows: grid.collect(),
    })
}

/// Normalize a cleaned input table into typed records.
///
/// Maps station display names to ids through the catalog, coerces the hour,
/// builds the composite key, and parses every pollutant cell: the missing
/// placeholder becomes `None`, `/` decimal separators become `.`, and any
/// other non-numeric text is a hard error.
pub fn clean_output_table(table: &DataTable, catalog: &StationCatalog) -> Result<PollutionTable> {
    let col = |name: &str| -> Result<usize> {
        table
            .header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::Parse(format!("missing {name} column in table header")))
    };
    let station_col = col("Station")?;
    let hour_col = col("Hour")?;
    let date_col = col("Date")?;

    let pollutant_cols: Vec<usize> = (0..table.header.len())
        .filter(|&i| i != station_col && i != hour_col && i != date_col)
        .collect();
    let pollutants: Vec<String> = pollutant_cols
        .iter()
        .map(|&i| table.header[i].clone())
        .collect();

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        if row.len() < table.header.len() {
            return Err(Error::Parse(format!(
                "row has {} cells, header has {}",
                row.len(),
                table.header.len()
            )));
        }
        let name = &row[station_col];
        let station = catalog
            .id_of(name)
            .ok_or_else(|| Error::UnknownStation(name.trim().to_string()))?;

        let hour_text = row[hour_col].trim();
        let hour: u32 = hour_text
            .parse()
            .map_err(|_| Error::DataFormat(format!("non-integer hour: {hour_text:?}")))?;

        let date = row[date_col].trim().to_string();

        let mut values = Vec::with_capacity(pollutant_cols.len());
        for &i in &pollutant_cols {
            values.push(parse_measurement(&row[i])?);
        }

        records.push(PollutionRecord {
            id: composite_key(&date, hour, station),
            date,
            hour,
            station,
            values,
        });
    }

    Ok(PollutionTable {
        pollutants,
        records,
    })
}

fn parse_measurement(cell: &str) -> Result<Option<f64>> {
    if cell == MISSING_VALUE || cell.trim().is_empty() {
        return Ok(None);
    }
    let normalized = cell.trim().replace('/', ".");
    normalized
        .parse::<f64>()
        .map(Some)
        .map_err(|_| Error::DataFormat(format!("non-numeric measurement: {cell:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StationCatalog {
        StationCatalog::from_options(vec![(21, "دروس".to_string())])
    }

    fn sample_table() -> DataTable {
        DataTable {
            header: vec![
                "Station".into(),
                "CO".into(),
                "PM10".into(),
                "Hour".into(),
                "Date".into(),
            ],
            rows: vec![
                vec![
                    "دروس".into(),
                    "2/5".into(),
                    "\u{a0}".into(),
                    "5".into(),
                    "1402/02/01".into(),
                ],
                vec![
                    "دروس".into(),
                    "3.1".into(),
                    "41".into(),
                    "23".into(),
                    "1402/02/01".into(),
                ],
            ],
        }
    }

    #[test]
    fn extract_table_takes_first_table() {
        let body = r#"<html><body>
            <table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table>
            <table><tr><td>other</td></tr></table>
        </body></html>"#;
        let grid = extract_table(body).unwrap();
        assert_eq!(grid, vec![vec!["A", "B"], vec!["1", "2"]]);
    }

    #[test]
    fn extract_table_fails_without_table() {
        assert!(matches!(
            extract_table("<html><body><p>x</p></body></html>"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn clean_input_renames_headers_and_drops_header_row() {
        let grid = vec![
            vec![
                "ایستگاه".to_string(),
                "CO".to_string(),
                "ساعت".to_string(),
                "تاریخ".to_string(),
            ],
            vec![
                "دروس".to_string(),
                "1".to_string(),
                "0".to_string(),
                "1402/02/01".to_string(),
            ],
        ];
        let table = clean_input_table(grid).unwrap();
        assert_eq!(table.header, vec!["Station", "CO", "Hour", "Date"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn composite_key_is_deterministic_and_padded() {
        assert_eq!(composite_key("1402/02/01", 5, 21), "1402020105021");
        assert_eq!(composite_key("1402/02/01", 5, 21), "1402020105021");
        assert_ne!(
            composite_key("1402/02/01", 5, 21),
            composite_key("1402/02/01", 5, 22)
        );
        assert_eq!(composite_key("1401/12/29", 23, 107), "1401122923107");
    }

    #[test]
    fn clean_output_builds_canonical_records() {
        let out = clean_output_table(&sample_table(), &catalog()).unwrap();
        assert_eq!(out.pollutants, vec!["CO", "PM10"]);
        assert_eq!(out.records.len(), 2);

        let first = &out.records[0];
        assert_eq!(first.id, "1402020105021");
        assert_eq!(first.station, 21);
        assert_eq!(first.hour, 5);
        // "2/5" is a slash-decimal, the placeholder is null.
        assert_eq!(first.values, vec![Some(2.5), None]);

        let second = &out.records[1];
        assert_eq!(second.id, "1402020123021");
        assert_eq!(second.values, vec![Some(3.1), Some(41.0)]);
    }

    #[test]
    fn append_aligns_reordered_columns_by_name() {
        let catalog = StationCatalog::from_options(vec![
            (21, "دروس".to_string()),
            (22, "ستاد بحران".to_string()),
        ]);
        let mut combined = DataTable {
            header: vec![
                "Station".into(),
                "CO".into(),
                "O3".into(),
                "Hour".into(),
                "Date".into(),
            ],
            rows: vec![vec![
                "دروس".into(),
                "1.0".into(),
                "2.0".into(),
                "5".into(),
                "1402/02/01".into(),
            ]],
        };
        // Same columns, O3 and CO swapped.
        combined.append(DataTable {
            header: vec![
                "Station".into(),
                "O3".into(),
                "CO".into(),
                "Hour".into(),
                "Date".into(),
            ],
            rows: vec![vec![
                "ستاد بحران".into(),
                "9.0".into(),
                "8.0".into(),
                "5".into(),
                "1402/02/01".into(),
            ]],
        });

        let out = clean_output_table(&combined, &catalog).unwrap();
        assert_eq!(out.pollutants, vec!["CO", "O3"]);
        assert_eq!(out.records[0].values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(out.records[1].values, vec![Some(8.0), Some(9.0)]);
    }

    #[test]
    fn append_unions_differing_column_sets() {
        let mut combined = sample_table();
        combined.append(DataTable {
            header: vec![
                "Station".into(),
                "SO2".into(),
                "Hour".into(),
                "Date".into(),
            ],
            rows: vec![vec![
                "دروس".into(),
                "7".into(),
                "6".into(),
                "1402/02/01".into(),
            ]],
        });

        assert_eq!(
            combined.header,
            vec!["Station", "CO", "PM10", "Hour", "Date", "SO2"]
        );
        let out = clean_output_table(&combined, &catalog()).unwrap();
        assert_eq!(out.pollutants, vec!["CO", "PM10", "SO2"]);
        // Columns absent from one side are null for its rows.
        assert_eq!(out.records[0].values, vec![Some(2.5), None, None]);
        assert_eq!(out.records[2].values, vec![None, None, Some(7.0)]);
    }

    #[test]
    fn clean_output_rejects_unknown_station() {
        let mut table = sample_table();
        table.rows[0][0] = "nowhere".into();
        assert!(matches!(
            clean_output_table(&table, &catalog()),
            Err(Error::UnknownStation(_))
        ));
    }

    #[test]
    fn clean_output_rejects_garbage_measurements() {
        let mut table = sample_table();
        table.rows[0][1] = "n/a".into();
        assert!(matches!(
            clean_output_table(&table, &catalog()),
            Err(Error::DataFormat(_))
        ));
    }
}
