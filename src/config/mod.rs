//! Configuration module for Archivist
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every field has a documented default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use archivist::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("archivist.toml")).unwrap();
//! println!("Request delay: {}ms", config.fetch.request_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, FetchConfig, OutputConfig, SiteConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
