//! Strata-Crawl: a resumable hierarchical catalog crawler
//!
//! This crate crawls a hierarchically organized catalog (entities → branches
//! → sub-branches → leaf records) that can only be traversed through
//! navigational actions. The crawl can be interrupted at any point and
//! resumes exactly where it left off, without re-fetching captured data and
//! without losing discovered-but-unprocessed work.

pub mod config;
pub mod crawler;
pub mod nav;
pub mod sink;
pub mod state;

use state::CrawlScope;
use thiserror::Error;

/// Main error type for Strata-Crawl operations
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Sink error: {0}")]
    Sink(#[from] sink::SinkError),

    #[error("Navigation error: {0}")]
    Nav(#[from] nav::NavError),

    #[error(
        "Requested scope {requested} does not match checkpoint scope {persisted}; \
         rerun with --fresh to restart over the new range"
    )]
    ScopeMismatch {
        requested: CrawlScope,
        persisted: CrawlScope,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid scope '{0}': expected 'lo-hi' with lo <= hi")]
    InvalidScope(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Strata-Crawl operations
pub type Result<T> = std::result::Result<T, StrataError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunOutcome};
pub use state::{Checkpoint, LeafTarget};
