//! Configuration validation
//!
//! Everything that can fail mid-crawl because of a bad configuration value
//! is checked here instead, at load time: the scope string, the URL
//! templates, every CSS selector, the pacing bounds, and the output paths.

use crate::config::types::Config;
use crate::state::CrawlScope;
use crate::ConfigError;

/// Validates a parsed configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scope(&config.crawler.scope)?;
    validate_pause("action-pause-ms", config.crawler.action_pause_ms)?;
    validate_pause("entity-pause-ms", config.crawler.entity_pause_ms)?;

    if config.crawler.page_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "page-timeout-secs must be at least 1".to_string(),
        ));
    }
    if config.crawler.max_consecutive_nav_failures == 0 {
        return Err(ConfigError::Validation(
            "max-consecutive-nav-failures must be at least 1".to_string(),
        ));
    }

    validate_url_template("entity-url", &config.site.entity_url)?;
    validate_url_template("catalog-url", &config.site.catalog_url)?;
    validate_selectors(config)?;
    validate_output(config)?;

    Ok(())
}

fn validate_scope(scope: &str) -> Result<(), ConfigError> {
    scope
        .parse::<CrawlScope>()
        .map_err(|_| ConfigError::InvalidScope(scope.to_string()))?;
    Ok(())
}

fn validate_pause(name: &str, bounds: [u64; 2]) -> Result<(), ConfigError> {
    if bounds[0] > bounds[1] {
        return Err(ConfigError::Validation(format!(
            "{}: lower bound {} exceeds upper bound {}",
            name, bounds[0], bounds[1]
        )));
    }
    Ok(())
}

fn validate_url_template(name: &str, template: &str) -> Result<(), ConfigError> {
    if !template.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "{}: template '{}' is missing the {{id}} placeholder",
            name, template
        )));
    }

    let sample = template.replace("{id}", "1");
    url::Url::parse(&sample).map_err(|e| {
        ConfigError::Validation(format!("{}: '{}' is not a valid URL: {}", name, template, e))
    })?;
    Ok(())
}

fn validate_selectors(config: &Config) -> Result<(), ConfigError> {
    let s = &config.site.selectors;
    let required = [&s.entity_name, &s.branch, &s.sub_branch, &s.leaf_block, &s.leaf_name];
    let optional = [
        &s.entity_emblem,
        &s.entity_tags,
        &s.entity_description,
        &s.entity_website,
        &s.leaf_portrait,
        &s.next_page,
        &s.leaf_title,
        &s.leaf_sub_branch,
        &s.leaf_summary,
        &s.leaf_detail,
        &s.leaf_detail_portrait,
    ];

    for selector in required {
        validate_selector(selector)?;
    }
    for selector in optional.into_iter().flatten() {
        validate_selector(selector)?;
    }
    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    scraper::Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;
    Ok(())
}

fn validate_output(config: &Config) -> Result<(), ConfigError> {
    let paths = [
        ("data-dir", &config.output.data_dir),
        ("checkpoint-path", &config.output.checkpoint_path),
        ("pending-path", &config.output.pending_path),
    ];
    for (name, value) in paths {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} must not be empty", name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        CrawlerConfig, OutputConfig, SelectorConfig, SiteConfig, UserAgentConfig,
    };

    fn base_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                scope: "1-10".to_string(),
                action_pause_ms: [0, 0],
                entity_pause_ms: [0, 0],
                page_timeout_secs: 10,
                max_consecutive_nav_failures: 3,
                unfiltered_labels: vec!["全部".to_string()],
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            site: SiteConfig {
                entity_url: "https://example.com/entity/{id}/".to_string(),
                catalog_url: "https://example.com/entity/{id}/list.html".to_string(),
                selectors: SelectorConfig {
                    entity_name: "h1.name".to_string(),
                    entity_emblem: None,
                    entity_tags: None,
                    entity_description: None,
                    entity_website: None,
                    branch: "div.filters a.branch".to_string(),
                    sub_branch: "div.filters a.sub".to_string(),
                    leaf_block: "a.leaf".to_string(),
                    leaf_portrait: Some("img".to_string()),
                    next_page: None,
                    leaf_name: "span.leaf-name".to_string(),
                    leaf_title: None,
                    leaf_sub_branch: None,
                    leaf_summary: None,
                    leaf_detail: None,
                    leaf_detail_portrait: None,
                },
            },
            output: OutputConfig {
                data_dir: "./data".to_string(),
                checkpoint_path: "./checkpoint.json".to_string(),
                pending_path: "./pending.json".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_inverted_scope_rejected() {
        let mut config = base_config();
        config.crawler.scope = "10-1".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidScope(_)
        ));
    }

    #[test]
    fn test_inverted_pause_rejected() {
        let mut config = base_config();
        config.crawler.action_pause_ms = [100, 10];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_zero_failure_threshold_rejected() {
        let mut config = base_config();
        config.crawler.max_consecutive_nav_failures = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let mut config = base_config();
        config.site.entity_url = "https://example.com/entity/1/".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_template_not_a_url_rejected() {
        let mut config = base_config();
        config.site.catalog_url = "entity/{id}/list".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_required_selector_rejected() {
        let mut config = base_config();
        config.site.selectors.branch = ":::!".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidSelector { .. }
        ));
    }

    #[test]
    fn test_bad_optional_selector_rejected() {
        let mut config = base_config();
        config.site.selectors.leaf_portrait = Some(":::!".to_string());
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidSelector { .. }
        ));
    }

    #[test]
    fn test_empty_output_path_rejected() {
        let mut config = base_config();
        config.output.data_dir = "  ".to_string();
        assert!(validate(&config).is_err());
    }
}
