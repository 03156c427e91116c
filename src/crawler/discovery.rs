//! Archive discovery
//!
//! Walks the monthly archive listings between the configured start and end
//! dates. A month is recorded complete only after its page loop reaches a
//! terminal condition (not-found, an empty page, or the page cap). Stubs are
//! persisted page by page before that, so an interrupted walk re-runs safely.

use crate::crawler::fetcher::{FetchOutcome, RateLimitedFetcher};
use crate::extract::{url_date, ListingExtractor};
use crate::model::ArticleStub;
use crate::state::YearMonth;
use crate::storage::{with_store, CrawlStore, SharedStore, StorageResult};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How one month's walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthOutcome {
    /// Completed in an earlier run; nothing was fetched
    AlreadyComplete,
    /// Walked to a terminal condition and recorded complete
    Complete { found: usize, new: usize },
    /// A listing page could not be fetched; the month stays pending
    Incomplete { found: usize, new: usize, error: String },
}

/// Totals for one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub months_completed: usize,
    pub months_skipped: usize,
    pub months_incomplete: usize,
    pub new_stubs: usize,
    pub cancelled: bool,
}

/// Drives the month-by-month archive walk
pub struct ArchiveDiscoverer {
    fetcher: Arc<RateLimitedFetcher>,
    store: SharedStore,
    extractor: Arc<dyn ListingExtractor>,
    base_url: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    max_pages: u32,
}

impl ArchiveDiscoverer {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        store: SharedStore,
        extractor: Arc<dyn ListingExtractor>,
        base_url: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        max_pages: u32,
    ) -> Self {
        Self {
            fetcher,
            store,
            extractor,
            base_url: base_url.trim_end_matches('/').to_string(),
            start_date,
            end_date,
            max_pages: max_pages.max(1),
        }
    }

    /// Months covered by the configured date range
    pub fn months(&self) -> Vec<YearMonth> {
        YearMonth::range(self.start_date, self.end_date)
    }

    /// Listing URL for page `page` of `month`
    pub fn listing_url(&self, month: YearMonth, page: u32) -> String {
        if page <= 1 {
            format!("{}/{}", self.base_url, month.archive_path())
        } else {
            format!("{}/{}page/{}/", self.base_url, month.archive_path(), page)
        }
    }

    /// Walks every month in range, observing `cancel` between months
    pub async fn discover_all(&self, cancel: &CancellationToken) -> StorageResult<DiscoveryReport> {
        let months = self.months();
        info!(
            "Discovering articles across {} archive months ({} to {})",
            months.len(),
            self.start_date,
            self.end_date
        );

        let mut report = DiscoveryReport::default();
        for month in months {
            if cancel.is_cancelled() {
                info!("Discovery cancelled before {}", month);
                report.cancelled = true;
                break;
            }

            match self.discover_month(month).await? {
                MonthOutcome::AlreadyComplete => report.months_skipped += 1,
                MonthOutcome::Complete { new, .. } => {
                    report.months_completed += 1;
                    report.new_stubs += new;
                }
                MonthOutcome::Incomplete { new, .. } => {
                    report.months_incomplete += 1;
                    report.new_stubs += new;
                }
            }
        }

        info!(
            "Discovery finished: {} new articles, {} months completed, {} skipped, {} incomplete",
            report.new_stubs, report.months_completed, report.months_skipped, report.months_incomplete
        );
        Ok(report)
    }

    /// Walks one month's listing pages
    pub async fn discover_month(&self, month: YearMonth) -> StorageResult<MonthOutcome> {
        if with_store(&self.store, |s| s.is_archive_month_complete(month))? {
            debug!("Archive month {} already complete", month);
            return Ok(MonthOutcome::AlreadyComplete);
        }
        with_store(&self.store, |s| s.add_archive_month(month))?;

        let mut seen = HashSet::new();
        let mut new = 0;

        for page in 1..=self.max_pages {
            let url = self.listing_url(month, page);
            let html = match self.fetcher.fetch(&url).await {
                FetchOutcome::Success(html) => html,
                FetchOutcome::NotFound => {
                    debug!("Archive {} ends at page {} (not found)", month, page);
                    break;
                }
                FetchOutcome::Failed(error) => {
                    warn!("Archive {} page {} failed: {}", month, page, error);
                    return Ok(MonthOutcome::Incomplete {
                        found: seen.len(),
                        new,
                        error,
                    });
                }
            };

            let stubs = self.extractor.extract_stubs(&html, &url);
            if stubs.is_empty() {
                debug!("Archive {} ends at page {} (empty)", month, page);
                break;
            }

            let kept: Vec<ArticleStub> = stubs
                .into_iter()
                .filter(|stub| self.in_month(&stub.url, month))
                .filter(|stub| seen.insert(stub.url.clone()))
                .collect();
            let added = with_store(&self.store, |s| s.add_article_stubs(&kept))?;
            new += added;
            debug!(
                "Archive {} page {}: {} articles kept, {} new",
                month,
                page,
                kept.len(),
                added
            );

            if page == self.max_pages {
                warn!("Archive {} reached the {}-page cap", month, self.max_pages);
            }
        }

        let found = seen.len();
        with_store(&self.store, |s| s.mark_archive_month_complete(month, found))?;
        info!("Archive {}: {} articles ({} new)", month, found, new);
        Ok(MonthOutcome::Complete { found, new })
    }

    /// Whether a permalink belongs to `month` and the configured date range
    ///
    /// Links without a date in their path are kept.
    fn in_month(&self, url: &str, month: YearMonth) -> bool {
        let Some(date) = url_date(url) else {
            return true;
        };
        if date.year != month.year || date.month != month.month {
            return false;
        }
        match date.day.and_then(|_| date.to_date()) {
            Some(day) => day >= self.start_date && day <= self.end_date,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::extract::HtmlExtractor;
    use crate::storage::SqliteStore;
    use std::sync::Mutex;

    fn discoverer(start: (i32, u32, u32), end: (i32, u32, u32)) -> ArchiveDiscoverer {
        let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
        ArchiveDiscoverer::new(
            Arc::new(RateLimitedFetcher::new(&FetchConfig::default()).unwrap()),
            store,
            Arc::new(HtmlExtractor::new("https://e.com")),
            "https://e.com/",
            NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            50,
        )
    }

    #[test]
    fn test_listing_urls() {
        let d = discoverer((2020, 1, 1), (2020, 12, 31));
        let march = YearMonth::new(2020, 3).unwrap();
        assert_eq!(d.listing_url(march, 1), "https://e.com/2020/03/");
        assert_eq!(d.listing_url(march, 4), "https://e.com/2020/03/page/4/");
    }

    #[test]
    fn test_month_filter() {
        let d = discoverer((2017, 1, 20), (2017, 12, 31));
        let january = YearMonth::new(2017, 1).unwrap();

        assert!(d.in_month("https://e.com/2017/01/25/post/", january));
        assert!(!d.in_month("https://e.com/2017/01/10/early/", january));
        assert!(!d.in_month("https://e.com/2017/02/01/next/", january));
        assert!(d.in_month("https://e.com/2017/01/month-only/", january));
        assert!(d.in_month("https://e.com/undated-post/", january));
    }

    #[test]
    fn test_months_cover_range() {
        let d = discoverer((2019, 11, 15), (2020, 2, 1));
        let months: Vec<String> = d.months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2019-11", "2019-12", "2020-01", "2020-02"]);
    }

    #[tokio::test]
    async fn test_complete_month_not_refetched() {
        let d = discoverer((2020, 3, 1), (2020, 3, 31));
        let march = YearMonth::new(2020, 3).unwrap();
        with_store(&d.store, |s| {
            s.add_archive_month(march)?;
            s.mark_archive_month_complete(march, 4)
        })
        .unwrap();

        assert_eq!(d.discover_month(march).await.unwrap(), MonthOutcome::AlreadyComplete);
    }
}
