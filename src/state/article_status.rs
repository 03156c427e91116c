/// Article status definitions for tracking acquisition progress
use std::fmt;

/// Lifecycle of one article in the progress ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleStatus {
    /// Discovered from a listing page, not yet fetched
    Pending,

    /// Fetched and extracted successfully
    Scraped,

    /// Last fetch failed; retriable while the retry count is under the bound
    Failed,

    /// The site answered 404; never retried
    Unavailable,
}

impl ArticleStatus {
    /// Returns true if no further automated attempt is made from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Scraped | Self::Unavailable)
    }

    /// Returns true if an article in this status may be fetched again,
    /// given its current retry count and the configured bound
    pub fn is_retriable(&self, retry_count: u32, max_retries: u32) -> bool {
        match self {
            Self::Pending => true,
            Self::Failed => retry_count < max_retries,
            Self::Scraped | Self::Unavailable => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scraped" => Some(Self::Scraped),
            "failed" => Some(Self::Failed),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    pub fn all_statuses() -> [Self; 4] {
        [Self::Pending, Self::Scraped, Self::Failed, Self::Unavailable]
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(ArticleStatus::Scraped.is_terminal());
        assert!(ArticleStatus::Unavailable.is_terminal());
        assert!(!ArticleStatus::Pending.is_terminal());
        assert!(!ArticleStatus::Failed.is_terminal());
    }

    #[test]
    fn test_is_retriable() {
        assert!(ArticleStatus::Pending.is_retriable(0, 3));
        assert!(ArticleStatus::Failed.is_retriable(2, 3));
        assert!(!ArticleStatus::Failed.is_retriable(3, 3));
        assert!(!ArticleStatus::Unavailable.is_retriable(0, 3));
        assert!(!ArticleStatus::Scraped.is_retriable(0, 3));
    }

    #[test]
    fn test_db_string_roundtrip() {
        for status in ArticleStatus::all_statuses() {
            assert_eq!(
                ArticleStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(ArticleStatus::from_db_string("processed"), None);
    }
}
