//! Configuration module for the crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use anilist_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, AuthConfig, Config, CrawlerConfig, FilesystemSinkConfig, SearchSinkConfig,
    SinksConfig, SqliteSinkConfig, DEFAULT_ENDPOINT, DEFAULT_OUTPUT_DIR,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, default_config_with_hash, load_config, load_config_with_hash,
    parse_config,
};
pub use validation::{validate, MAX_PER_PAGE, MAX_WORKERS};
