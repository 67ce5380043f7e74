use std::collections::BTreeMap;

use tracing::warn;

use crate::date::SolarDate;
use crate::error::{Error, Result};
use crate::session::SessionClient;
use crate::table::extract_table;

/// Immutable station id / display name mapping, loaded once per session
/// from the archive page's station dropdown.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    by_id: BTreeMap<u32, String>,
    by_name: BTreeMap<String, u32>,
}

impl StationCatalog {
    pub fn from_options(options: Vec<(u32, String)>) -> Self {
        let mut by_id = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        for (id, name) in options {
            by_name.insert(name.clone(), id);
            by_id.insert(id, name);
        }
        Self { by_id, by_name }
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name.trim()).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// One row of the station metadata page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationRecord {
    pub id: u32,
    pub name: String,
    pub district: Option<u32>,
    pub established: SolarDate,
}

/// Fetch and parse the station-info page into per-station records.
pub fn fetch_station_info(
    session: &SessionClient,
    catalog: &StationCatalog,
) -> Result<Vec<StationRecord>> {
    let body = session.get_page(crate::session::STATION_INFO_PATH)?;
    parse_station_info(&body, catalog)
}

/// Parse the first table of the station-info page.
///
/// Columns are (display name, district, free text holding the
/// establishment date). Rows whose display name is not in the catalog are
/// dropped with a warning; the store keys stations by numeric id.
pub fn parse_station_info(body: &str, catalog: &StationCatalog) -> Result<Vec<StationRecord>> {
    let grid = extract_table(body)?;
    if grid.len() < 2 {
        return Err(Error::Parse("station-info table has no data rows".into()));
    }

    let mut records = Vec::new();
    for row in &grid[1..] {
        if row.len() < 3 {
            continue;
        }
        let name = row[0].trim();
        let Some(id) = catalog.id_of(name) else {
            warn!(station = name, "station-info row not in catalog, dropped");
            continue;
        };
        let district = row[1].trim().parse::<u32>().ok();
        let Some(date_text) = find_wire_date(&row[2]) else {
            return Err(Error::Parse(format!(
                "no establishment date in station-info row for {name:?}"
            )));
        };
        let established = SolarDate::parse(date_text)?;
        records.push(StationRecord {
            id,
            name: name.to_string(),
            district,
            established,
        });
    }

    Ok(records)
}

/// Find the first `dddd/dd/dd` substring in free text.
fn find_wire_date(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let matches_at = |start: usize| -> bool {
        if start + 10 > bytes.len() {
            return false;
        }
        let window = &bytes[start..start + 10];
        window.iter().enumerate().all(|(i, &b)| match i {
            4 | 7 => b == b'/',
            _ => b.is_ascii_digit(),
        })
    };
    (0..bytes.len()).find(|&i| matches_at(i)).map(|i| &text[i..i + 10])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StationCatalog {
        StationCatalog::from_options(vec![
            (1, "میدان آزادی".to_string()),
            (21, "دروس".to_string()),
        ])
    }

    #[test]
    fn catalog_maps_both_directions() {
        let c = catalog();
        assert_eq!(c.id_of("دروس"), Some(21));
        assert_eq!(c.id_of(" دروس "), Some(21));
        assert_eq!(c.name_of(1), Some("میدان آزادی"));
        assert_eq!(c.id_of("nowhere"), None);
        assert!(c.contains(21));
        assert!(!c.contains(99));
    }

    #[test]
    fn station_info_rows_parse_and_join() {
        let body = r#"<table>
            <tr><th>Station</th><th>District</th><th>Established</th></tr>
            <tr><td>دروس</td><td>3</td><td>تاسیس 1388/04/15 شد</td></tr>
            <tr><td>unknown</td><td>9</td><td>1390/01/01</td></tr>
        </table>"#;
        let records = parse_station_info(body, &catalog()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 21);
        assert_eq!(records[0].district, Some(3));
        assert_eq!(
            records[0].established,
            SolarDate::new(1388, 4, 15).unwrap()
        );
    }

    #[test]
    fn wire_date_found_inside_free_text() {
        assert_eq!(find_wire_date("abc 1402/02/01 xyz"), Some("1402/02/01"));
        assert_eq!(find_wire_date("no date here"), None);
        assert_eq!(find_wire_date("1402-02-01"), None);
    }
}
