//! Output collaborators
//!
//! This module handles:
//! - Writing completed articles with their comment threads (JSON corpus)
//! - Downloading comment images
//! - Reporting ledger statistics

mod images;
mod json;
pub mod stats;
mod traits;

pub use images::{image_extension, image_filename, HttpImageFetcher};
pub use json::JsonArticleWriter;
pub use stats::{format_statistics, print_statistics};
pub use traits::{ArticleSink, ImageFetcher, OutputError, OutputResult};
