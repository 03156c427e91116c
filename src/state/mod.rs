//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `ArticleStatus`: lifecycle of an article (pending, scraped, failed, unavailable)
//! - `ArchiveStatus` and `YearMonth`: discovery progress per archive month
//! - `SessionStatus`: whether a crawl session is still open

mod archive_month;
mod article_status;
mod session;

pub use archive_month::{ArchiveStatus, YearMonth};
pub use article_status::ArticleStatus;
pub use session::SessionStatus;
