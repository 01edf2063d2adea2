use serde::Deserialize;

/// Main configuration structure for Strata-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub site: SiteConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Inclusive entity-id range to cover, e.g. "1-10099"
    pub scope: String,

    /// Bounds in milliseconds for the randomized pause between
    /// navigational actions; [0, 0] disables pacing
    #[serde(rename = "action-pause-ms", default = "default_action_pause")]
    pub action_pause_ms: [u64; 2],

    /// Bounds in milliseconds for the randomized pause between entities
    #[serde(rename = "entity-pause-ms", default = "default_entity_pause")]
    pub entity_pause_ms: [u64; 2],

    /// Timeout for a single page load, in seconds
    #[serde(rename = "page-timeout-secs", default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Consecutive navigation-primitive failures tolerated before the run
    /// aborts
    #[serde(
        rename = "max-consecutive-nav-failures",
        default = "default_max_nav_failures"
    )]
    pub max_consecutive_nav_failures: u32,

    /// Branch/sub-branch labels meaning "no filter / show all"; such a
    /// filter is never selected because it would enumerate the same leaves
    /// as every other filter combined
    #[serde(rename = "unfiltered-labels", default = "default_unfiltered_labels")]
    pub unfiltered_labels: Vec<String>,
}

fn default_action_pause() -> [u64; 2] {
    [1500, 3500]
}

fn default_entity_pause() -> [u64; 2] {
    [5000, 15000]
}

fn default_page_timeout() -> u64 {
    10
}

fn default_max_nav_failures() -> u32 {
    3
}

fn default_unfiltered_labels() -> Vec<String> {
    vec!["全部".to_string(), "不限".to_string()]
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Catalog source configuration
///
/// URL templates carry an `{id}` placeholder for the entity id. All document
/// structure lives here as CSS selectors; none of it is baked into code.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Template for an entity's own page
    #[serde(rename = "entity-url")]
    pub entity_url: String,

    /// Template for an entity's leaf listing page
    #[serde(rename = "catalog-url")]
    pub catalog_url: String,

    pub selectors: SelectorConfig,
}

/// CSS selectors describing the catalog's pages
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Entity name on the entity page
    #[serde(rename = "entity-name")]
    pub entity_name: String,

    /// Entity emblem/logo image
    #[serde(rename = "entity-emblem")]
    pub entity_emblem: Option<String>,

    /// Entity tag elements (joined with commas)
    #[serde(rename = "entity-tags")]
    pub entity_tags: Option<String>,

    /// Entity description block
    #[serde(rename = "entity-description")]
    pub entity_description: Option<String>,

    /// Entity website element
    #[serde(rename = "entity-website")]
    pub entity_website: Option<String>,

    /// Branch filter anchors on the listing page
    pub branch: String,

    /// Sub-branch filter anchors on the listing page
    #[serde(rename = "sub-branch")]
    pub sub_branch: String,

    /// Leaf block anchors on the listing page
    #[serde(rename = "leaf-block")]
    pub leaf_block: String,

    /// Portrait image inside a leaf block
    #[serde(rename = "leaf-portrait")]
    pub leaf_portrait: Option<String>,

    /// "Next page" anchor of a paginated listing
    #[serde(rename = "next-page")]
    pub next_page: Option<String>,

    /// Leaf name on the detail page
    #[serde(rename = "leaf-name")]
    pub leaf_name: String,

    /// Leaf title/rank on the detail page
    #[serde(rename = "leaf-title")]
    pub leaf_title: Option<String>,

    /// Sub-branch affiliation shown on the detail page
    #[serde(rename = "leaf-sub-branch")]
    pub leaf_sub_branch: Option<String>,

    /// Summary block on the detail page
    #[serde(rename = "leaf-summary")]
    pub leaf_summary: Option<String>,

    /// Detail/expertise block on the detail page
    #[serde(rename = "leaf-detail")]
    pub leaf_detail: Option<String>,

    /// Portrait image on the detail page
    #[serde(rename = "leaf-detail-portrait")]
    pub leaf_detail_portrait: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the CSV output streams
    #[serde(rename = "data-dir")]
    pub data_dir: String,

    /// Path of the checkpoint document
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Path of the pending-queue document
    #[serde(rename = "pending-path")]
    pub pending_path: String,
}
