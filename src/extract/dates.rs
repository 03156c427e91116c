use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use url::Url;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y at %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%b %d, %Y at %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%Y",
];

/// Parses the date formats WordPress themes and wpDiscuz emit
///
/// Offsets are normalized to UTC; naive values are taken as UTC. Relative
/// phrases ("5 hours ago") are not resolved and yield `None`.
pub fn parse_site_date(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Date embedded in a permalink path (`/YYYY/MM/` or `/YYYY/MM/DD/`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlDate {
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

impl UrlDate {
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day.unwrap_or(1))
    }
}

fn numeric(segment: &str, len: usize) -> Option<u32> {
    if segment.len() == len && segment.bytes().all(|b| b.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

/// Finds the first `/YYYY/MM[/DD]/` run in the URL path
pub fn url_date(url: &str) -> Option<UrlDate> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    segments.windows(2).enumerate().find_map(|(i, pair)| {
        let year = numeric(pair[0], 4)? as i32;
        let month = numeric(pair[1], 2).filter(|m| (1..=12).contains(m))?;
        let day = segments
            .get(i + 2)
            .and_then(|s| numeric(s, 2))
            .filter(|d| (1..=31).contains(d));
        Some(UrlDate { year, month, day })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_iso_with_offset() {
        let dt = parse_site_date("2020-03-14T15:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 13);
        assert_eq!(dt.day(), 14);
    }

    #[test]
    fn test_parse_wpdiscuz_text_date() {
        let dt = parse_site_date("March 14, 2020 3:22 pm").unwrap();
        assert_eq!((dt.month(), dt.hour(), dt.minute()), (3, 15, 22));
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_site_date("January 20, 2017").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2017, 1, 20));
        assert!(parse_site_date("2017-01-20").is_some());
    }

    #[test]
    fn test_unparseable_dates() {
        assert!(parse_site_date("").is_none());
        assert!(parse_site_date("5 hours ago").is_none());
    }

    #[test]
    fn test_url_date_with_day() {
        let d = url_date("https://wattsupwiththat.com/2020/03/14/some-post/").unwrap();
        assert_eq!(
            d,
            UrlDate {
                year: 2020,
                month: 3,
                day: Some(14)
            }
        );
    }

    #[test]
    fn test_url_date_month_only() {
        let d = url_date("https://wattsupwiththat.com/2020/03/some-post/").unwrap();
        assert_eq!(d.day, None);
        assert_eq!(d.to_date(), NaiveDate::from_ymd_opt(2020, 3, 1));
    }

    #[test]
    fn test_url_without_date() {
        assert!(url_date("https://wattsupwiththat.com/about/").is_none());
        assert!(url_date("https://wattsupwiththat.com/2020/13/x/").is_none());
    }
}
