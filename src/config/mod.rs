//! Configuration loading, parsing, and validation
//!
//! The configuration is a TOML file carrying the crawl scope, pacing and
//! failure policy, user-agent identity, site URL templates with CSS
//! selectors, and the output/state paths.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, CrawlerConfig, OutputConfig, SelectorConfig, SiteConfig, UserAgentConfig,
};
pub use validation::validate;
