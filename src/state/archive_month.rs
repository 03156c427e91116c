use chrono::{Datelike, NaiveDate};
use std::fmt;

/// Discovery status of one archive month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveStatus {
    Pending,
    /// Every listing page was walked to a terminal condition
    Complete,
}

impl ArchiveStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A calendar month, the unit of discovery tracking
///
/// Displayed and stored as `YYYY-MM`. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Returns None for a month outside 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses the `YYYY-MM` storage key
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month touched by the inclusive date range, in order
    pub fn range(start: NaiveDate, end: NaiveDate) -> Vec<Self> {
        let last = Self::from_date(end);
        let mut current = Self::from_date(start);
        let mut months = Vec::new();
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// Archive listing path relative to the site root, e.g. `2020/03/`
    pub fn archive_path(&self) -> String {
        format!("{:04}/{:02}/", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_display_and_parse() {
        let ym = YearMonth::new(2020, 3).unwrap();
        assert_eq!(ym.to_string(), "2020-03");
        assert_eq!(YearMonth::parse("2020-03"), Some(ym));
        assert_eq!(YearMonth::parse("2020-13"), None);
        assert_eq!(YearMonth::parse("2020/03"), None);
    }

    #[test]
    fn test_range_crosses_year_boundary() {
        let months = YearMonth::range(date(2016, 11, 20), date(2017, 2, 1));
        let keys: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(keys, vec!["2016-11", "2016-12", "2017-01", "2017-02"]);
    }

    #[test]
    fn test_range_single_month() {
        let months = YearMonth::range(date(2020, 3, 1), date(2020, 3, 31));
        assert_eq!(months, vec![YearMonth::new(2020, 3).unwrap()]);
    }

    #[test]
    fn test_archive_path() {
        assert_eq!(YearMonth::new(2017, 1).unwrap().archive_path(), "2017/01/");
    }

    #[test]
    fn test_status_db_strings() {
        assert_eq!(ArchiveStatus::Complete.to_db_string(), "complete");
        assert_eq!(
            ArchiveStatus::from_db_string("pending"),
            Some(ArchiveStatus::Pending)
        );
        assert_eq!(ArchiveStatus::from_db_string("done"), None);
    }
}
