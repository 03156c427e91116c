//! Statistics reporting from the progress ledger

use crate::state::ArticleStatus;
use crate::storage::StoreStats;

/// Formats ledger statistics as a plain-text report
pub fn format_statistics(stats: &StoreStats) -> String {
    let mut out = String::new();
    out.push_str("=== Harvest Statistics ===\n\n");

    out.push_str("Articles:\n");
    out.push_str(&format!("  Total: {}\n", stats.total_articles));
    for status in ArticleStatus::all_statuses() {
        let count = stats.articles_with_status(status);
        let percentage = if stats.total_articles > 0 {
            (count as f64 / stats.total_articles as f64) * 100.0
        } else {
            0.0
        };
        out.push_str(&format!("  {}: {} ({:.1}%)\n", status, count, percentage));
    }
    out.push('\n');

    out.push_str("Archive months:\n");
    if stats.months_by_status.is_empty() {
        out.push_str("  none recorded\n");
    }
    for (status, count) in &stats.months_by_status {
        out.push_str(&format!("  {}: {}\n", status, count));
    }
    out.push('\n');

    out.push_str(&format!("Comments: {}\n", stats.total_comments));
    out.push_str(&format!(
        "Images: {} referenced, {} downloaded\n",
        stats.total_images, stats.downloaded_images
    ));
    out.push_str(&format!("Sessions: {}\n", stats.sessions));

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &StoreStats) {
    print!("{}", format_statistics(stats));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_every_status() {
        let mut stats = StoreStats {
            total_articles: 4,
            total_comments: 31,
            total_images: 2,
            downloaded_images: 1,
            sessions: 3,
            ..Default::default()
        };
        stats.articles_by_status.insert("scraped".to_string(), 3);
        stats.articles_by_status.insert("unavailable".to_string(), 1);
        stats.months_by_status.insert("complete".to_string(), 2);

        let report = format_statistics(&stats);
        assert!(report.contains("scraped: 3 (75.0%)"));
        assert!(report.contains("pending: 0 (0.0%)"));
        assert!(report.contains("complete: 2"));
        assert!(report.contains("Comments: 31"));
        assert!(report.contains("Images: 2 referenced, 1 downloaded"));
    }
}
