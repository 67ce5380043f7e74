use std::fmt;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Leap-year residues of the 33-year Solar Hijri cycle.
const LEAP_RESIDUES: [i32; 8] = [1, 5, 9, 13, 17, 22, 26, 30];

/// 1400/01/01 in the source calendar.
const EPOCH_YEAR: i32 = 1400;

/// A calendar date in the Solar Hijri calendar used by the source site.
///
/// Ordering is chronological, so establishment-date gating can compare
/// dates directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SolarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SolarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
            return Err(Error::InvalidQuery(format!(
                "invalid date: {year}/{month}/{day}"
            )));
        }
        Ok(Self { year, month, day })
    }

    /// Parse the source wire format `YYYY/MM/DD`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(3, '/');
        let (y, m, d) = match (parts.next(), parts.next(), parts.next()) {
            (Some(y), Some(m), Some(d)) => (y, m, d),
            _ => return Err(Error::Parse(format!("expected YYYY/MM/DD, got {s:?}"))),
        };
        let year: i32 = y
            .parse()
            .map_err(|_| Error::Parse(format!("invalid year in date {s:?}")))?;
        let month: u32 = m
            .parse()
            .map_err(|_| Error::Parse(format!("invalid month in date {s:?}")))?;
        let day: u32 = d
            .parse()
            .map_err(|_| Error::Parse(format!("invalid day in date {s:?}")))?;
        Self::new(year, month, day)
    }

    /// Zero-padded `YYYYMMDD` digits, the date portion of composite keys.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    /// The previous calendar day, rolling over month and year boundaries.
    pub fn pred(&self) -> Self {
        if self.day > 1 {
            Self {
                day: self.day - 1,
                ..*self
            }
        } else if self.month > 1 {
            Self {
                year: self.year,
                month: self.month - 1,
                day: days_in_month(self.year, self.month - 1),
            }
        } else {
            Self {
                year: self.year - 1,
                month: 12,
                day: days_in_month(self.year - 1, 12),
            }
        }
    }

    /// Convert a Gregorian civil date into the source calendar.
    ///
    /// Counts days from the 1400/01/01 anchor (2021-03-21 Gregorian) and
    /// walks whole years using the same 33-year cycle as [`is_leap_year`],
    /// so the scheduler's notion of "today" agrees with [`days_in_month`].
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let epoch = NaiveDate::from_ymd_opt(2021, 3, 21).expect("valid anchor date");
        let mut offset = (date - epoch).num_days();
        let mut year = EPOCH_YEAR;

        while offset < 0 {
            year -= 1;
            offset += i64::from(days_in_year(year));
        }
        while offset >= i64::from(days_in_year(year)) {
            offset -= i64::from(days_in_year(year));
            year += 1;
        }

        let mut month = 1;
        while offset >= i64::from(days_in_month(year, month)) {
            offset -= i64::from(days_in_month(year, month));
            month += 1;
        }

        Self {
            year,
            month,
            day: offset as u32 + 1,
        }
    }
}

impl fmt::Display for SolarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

pub fn is_leap_year(year: i32) -> bool {
    LEAP_RESIDUES.contains(&year.rem_euclid(33))
}

/// Months 1-6 have 31 days, 7-11 have 30, and month 12 has 30 in a leap
/// year and 29 otherwise.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 => {
            if is_leap_year(year) {
                30
            } else {
                29
            }
        }
        _ => 0,
    }
}

fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_lengths_follow_leap_rule() {
        for month in 1..=6 {
            assert_eq!(days_in_month(1402, month), 31);
        }
        for month in 7..=11 {
            assert_eq!(days_in_month(1402, month), 30);
        }
        // 1399 % 33 == 13 -> leap, 1400 % 33 == 14 -> common.
        assert_eq!(days_in_month(1399, 12), 30);
        assert_eq!(days_in_month(1400, 12), 29);
        // Residue 1 is leap, residue 2 is not.
        assert_eq!(days_in_month(33 * 42 + 1, 12), 30);
        assert_eq!(days_in_month(33 * 42 + 2, 12), 29);
    }

    #[test]
    fn leap_residue_set() {
        let leaps: Vec<i32> = (1386..1419).filter(|&y| is_leap_year(y)).collect();
        assert_eq!(leaps, vec![1387, 1391, 1395, 1399, 1403, 1408, 1412, 1416]);
    }

    #[test]
    fn display_and_compact_are_zero_padded() {
        let d = SolarDate::new(1402, 2, 1).unwrap();
        assert_eq!(d.to_string(), "1402/02/01");
        assert_eq!(d.compact(), "14020201");
    }

    #[test]
    fn parse_round_trips_wire_format() {
        let d = SolarDate::parse("1401/06/23").unwrap();
        assert_eq!(d, SolarDate::new(1401, 6, 23).unwrap());
        assert!(SolarDate::parse("1401-06-23").is_err());
        assert!(SolarDate::parse("1401/13/01").is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let early = SolarDate::new(1398, 12, 29).unwrap();
        let late = SolarDate::new(1399, 1, 1).unwrap();
        assert!(early < late);
    }

    #[test]
    fn pred_rolls_over_boundaries() {
        let d = SolarDate::new(1400, 1, 1).unwrap();
        assert_eq!(d.pred(), SolarDate::new(1399, 12, 30).unwrap());
        let d = SolarDate::new(1400, 7, 1).unwrap();
        assert_eq!(d.pred(), SolarDate::new(1400, 6, 31).unwrap());
    }

    #[test]
    fn gregorian_anchor_and_neighbors() {
        let anchor = NaiveDate::from_ymd_opt(2021, 3, 21).unwrap();
        assert_eq!(
            SolarDate::from_gregorian(anchor),
            SolarDate::new(1400, 1, 1).unwrap()
        );
        assert_eq!(
            SolarDate::from_gregorian(anchor.pred_opt().unwrap()),
            SolarDate::new(1399, 12, 30).unwrap()
        );
        // 1399 was a leap year: 366 days before the anchor.
        assert_eq!(
            SolarDate::from_gregorian(NaiveDate::from_ymd_opt(2020, 3, 20).unwrap()),
            SolarDate::new(1399, 1, 1).unwrap()
        );
    }
}
