//! HTTP-backed navigation driver and page fetcher
//!
//! Models the single stateful browsing session over plain HTTP: the driver
//! holds at most one "current page" (the entity's leaf listing with the
//! filters applied so far). Selecting a branch or sub-branch follows the
//! filter anchor's href from a fresh enumeration of the current page, so a
//! selection index that no longer resolves reports `Stale` instead of acting
//! on a shifted element set. Where the source paginates its listing, leaf
//! discovery walks the "next page" anchors until they run out.
//!
//! All document structure comes from the configured CSS selectors; nothing
//! site-specific is baked in here.

use crate::config::{Config, SelectorConfig, SiteConfig};
use crate::nav::{
    EntitySummary, FetchOutcome, LeafCandidate, LeafFields, NavError, NavResult,
    NavigationDriver, OpenOutcome, PageFetcher, ParentContext, SelectOutcome,
};
use crate::state::LeafTarget;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Image attributes checked for a usable source, in precedence order
const IMAGE_ATTRS: [&str; 4] = ["src", "data-src", "data-original", "data-url"];

/// The listing page the session currently sits on
#[derive(Debug, Clone)]
struct CurrentPage {
    url: Url,
    body: String,
}

/// Compiled form of [`SelectorConfig`]
struct Selectors {
    entity_name: Selector,
    entity_emblem: Option<Selector>,
    entity_tags: Option<Selector>,
    entity_description: Option<Selector>,
    entity_website: Option<Selector>,
    branch: Selector,
    sub_branch: Selector,
    leaf_block: Selector,
    leaf_portrait: Option<Selector>,
    next_page: Option<Selector>,
    leaf_name: Selector,
    leaf_title: Option<Selector>,
    leaf_sub_branch: Option<Selector>,
    leaf_summary: Option<Selector>,
    leaf_detail: Option<Selector>,
    leaf_detail_portrait: Option<Selector>,
}

impl Selectors {
    fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            entity_name: compile(&config.entity_name)?,
            entity_emblem: compile_opt(config.entity_emblem.as_deref())?,
            entity_tags: compile_opt(config.entity_tags.as_deref())?,
            entity_description: compile_opt(config.entity_description.as_deref())?,
            entity_website: compile_opt(config.entity_website.as_deref())?,
            branch: compile(&config.branch)?,
            sub_branch: compile(&config.sub_branch)?,
            leaf_block: compile(&config.leaf_block)?,
            leaf_portrait: compile_opt(config.leaf_portrait.as_deref())?,
            next_page: compile_opt(config.next_page.as_deref())?,
            leaf_name: compile(&config.leaf_name)?,
            leaf_title: compile_opt(config.leaf_title.as_deref())?,
            leaf_sub_branch: compile_opt(config.leaf_sub_branch.as_deref())?,
            leaf_summary: compile_opt(config.leaf_summary.as_deref())?,
            leaf_detail: compile_opt(config.leaf_detail.as_deref())?,
            leaf_detail_portrait: compile_opt(config.leaf_detail_portrait.as_deref())?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn compile_opt(selector: Option<&str>) -> Result<Option<Selector>, ConfigError> {
    selector.map(compile).transpose()
}

/// Result of one page load
enum GetOutcome {
    Ok { url: Url, body: String },
    NotFound,
    Timeout,
}

/// HTTP implementation of [`NavigationDriver`] and [`PageFetcher`]
pub struct HttpNavigator {
    client: Client,
    site: SiteConfig,
    selectors: Selectors,
    current: Option<CurrentPage>,
}

impl HttpNavigator {
    /// Builds the navigator from the configuration
    ///
    /// The client carries the configured user-agent identity and page
    /// timeout; selectors are compiled once here.
    pub fn new(config: &Config) -> crate::Result<Self> {
        let ua = &config.user_agent;
        // Format: CrawlerName/Version (+ContactURL; ContactEmail)
        let user_agent = format!(
            "{}/{} (+{}; {})",
            ua.crawler_name, ua.crawler_version, ua.contact_url, ua.contact_email
        );

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.crawler.page_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            site: config.site.clone(),
            selectors: Selectors::compile(&config.site.selectors)?,
            current: None,
        })
    }

    fn url_for(&self, template: &str, entity_id: u32) -> String {
        template.replace("{id}", &entity_id.to_string())
    }

    fn current(&self) -> NavResult<&CurrentPage> {
        self.current
            .as_ref()
            .ok_or_else(|| NavError::SessionLost("no listing page is open".to_string()))
    }

    async fn get_page(&self, url: &str) -> NavResult<GetOutcome> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok(GetOutcome::Timeout),
            Err(e) if e.is_connect() => {
                return Err(NavError::SessionLost(format!("{}: {}", url, e)))
            }
            Err(e) => return Err(NavError::Timeout(format!("{}: {}", url, e))),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(GetOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(NavError::Timeout(format!("HTTP {} for {}", status, url)));
        }

        let final_url = response.url().clone();
        match response.text().await {
            Ok(body) => Ok(GetOutcome::Ok {
                url: final_url,
                body,
            }),
            Err(e) if e.is_timeout() => Ok(GetOutcome::Timeout),
            Err(e) => Err(NavError::Timeout(format!("{}: {}", url, e))),
        }
    }

    /// Follows the `index`-th filter anchor of a fresh enumeration
    async fn select_filter(&mut self, selector: &Selector, index: usize) -> NavResult<SelectOutcome> {
        let href = {
            let page = self.current()?;
            match anchor_href(&page.body, selector, index, &page.url) {
                AnchorHref::OutOfRange => return Ok(SelectOutcome::Stale),
                AnchorHref::NoTarget => return Ok(SelectOutcome::Failed),
                AnchorHref::Target(url) => url,
            }
        };

        match self.get_page(href.as_str()).await? {
            GetOutcome::Ok { url, body } => {
                self.current = Some(CurrentPage { url, body });
                Ok(SelectOutcome::Selected)
            }
            GetOutcome::NotFound => Ok(SelectOutcome::Failed),
            GetOutcome::Timeout => Err(NavError::Timeout(format!(
                "filter page '{}' did not load in time",
                href
            ))),
        }
    }
}

#[async_trait]
impl NavigationDriver for HttpNavigator {
    async fn open_entity(&mut self, entity_id: u32) -> NavResult<OpenOutcome> {
        self.current = None;

        let entity_url = self.url_for(&self.site.entity_url, entity_id);
        let name = match self.get_page(&entity_url).await? {
            GetOutcome::NotFound => return Ok(OpenOutcome::NotFound),
            GetOutcome::Timeout => return Ok(OpenOutcome::Timeout),
            GetOutcome::Ok { body, .. } => select_text(&body, &self.selectors.entity_name),
        };

        let catalog_url = self.url_for(&self.site.catalog_url, entity_id);
        match self.get_page(&catalog_url).await? {
            GetOutcome::NotFound => Ok(OpenOutcome::NotFound),
            GetOutcome::Timeout => Ok(OpenOutcome::Timeout),
            GetOutcome::Ok { url, body } => {
                self.current = Some(CurrentPage { url, body });
                Ok(OpenOutcome::Opened { name })
            }
        }
    }

    async fn list_branches(&mut self) -> NavResult<Vec<String>> {
        let page = self.current()?;
        Ok(select_labels(&page.body, &self.selectors.branch))
    }

    async fn select_branch(&mut self, index: usize) -> NavResult<SelectOutcome> {
        let selector = self.selectors.branch.clone();
        self.select_filter(&selector, index).await
    }

    async fn list_sub_branches(&mut self) -> NavResult<Vec<String>> {
        let page = self.current()?;
        Ok(select_labels(&page.body, &self.selectors.sub_branch))
    }

    async fn select_sub_branch(&mut self, index: usize) -> NavResult<SelectOutcome> {
        let selector = self.selectors.sub_branch.clone();
        self.select_filter(&selector, index).await
    }

    async fn discover_leaves(&mut self) -> NavResult<Vec<LeafCandidate>> {
        let mut page = self.current()?.clone();
        let mut visited: HashSet<String> = HashSet::from([page.url.to_string()]);
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        loop {
            let (found, next) = scrape_listing(&page.body, &page.url, &self.selectors);
            for candidate in found {
                if seen.insert(candidate.identifier.clone()) {
                    candidates.push(candidate);
                }
            }

            let Some(next_url) = next else { break };
            if !visited.insert(next_url.to_string()) {
                // Self-referencing pagination; the listing is exhausted
                break;
            }

            match self.get_page(next_url.as_str()).await? {
                GetOutcome::Ok { url, body } => page = CurrentPage { url, body },
                GetOutcome::NotFound => break,
                GetOutcome::Timeout => {
                    return Err(NavError::Timeout(format!(
                        "listing page '{}' did not load in time",
                        next_url
                    )))
                }
            }
        }

        Ok(candidates)
    }

    fn entity_page_url(&self, entity_id: u32) -> String {
        self.url_for(&self.site.entity_url, entity_id)
    }
}

#[async_trait]
impl PageFetcher for HttpNavigator {
    async fn fetch_entity_summary(
        &mut self,
        entity_id: u32,
    ) -> NavResult<FetchOutcome<EntitySummary>> {
        let url = self.url_for(&self.site.entity_url, entity_id);
        let (final_url, body) = match self.get_page(&url).await? {
            GetOutcome::NotFound => return Ok(FetchOutcome::NotFound),
            GetOutcome::Timeout => return Ok(FetchOutcome::Timeout),
            GetOutcome::Ok { url, body } => (url, body),
        };

        // A page without the entity-name element is a soft 404
        let Some(name) = select_text(&body, &self.selectors.entity_name) else {
            return Ok(FetchOutcome::NotFound);
        };

        let document = Html::parse_document(&body);
        let emblem_url = self
            .selectors
            .entity_emblem
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|el| image_source(el, &final_url));
        let tags = self.selectors.entity_tags.as_ref().and_then(|s| {
            let joined = document
                .select(s)
                .filter_map(|el| normalized_text(el))
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(joined)
        });
        let description = self
            .selectors
            .entity_description
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(normalized_text);
        let website = self
            .selectors
            .entity_website
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(normalized_text);

        Ok(FetchOutcome::Fetched(EntitySummary {
            name,
            emblem_url,
            tags,
            description,
            website,
        }))
    }

    async fn fetch_leaf_record(
        &mut self,
        target: &LeafTarget,
        _context: &ParentContext<'_>,
    ) -> NavResult<FetchOutcome<LeafFields>> {
        let (final_url, body) = match self.get_page(&target.identifier).await? {
            GetOutcome::NotFound => return Ok(FetchOutcome::NotFound),
            GetOutcome::Timeout => return Ok(FetchOutcome::Timeout),
            GetOutcome::Ok { url, body } => (url, body),
        };

        let mut fields = scrape_leaf_fields(&body, &final_url, &self.selectors);
        if fields.portrait_url.is_none() {
            fields.portrait_url = target.fallback_hint.clone();
        }
        Ok(FetchOutcome::Fetched(fields))
    }
}

/// Resolution of an indexed filter anchor
enum AnchorHref {
    Target(Url),
    NoTarget,
    OutOfRange,
}

fn anchor_href(body: &str, selector: &Selector, index: usize, base: &Url) -> AnchorHref {
    let document = Html::parse_document(body);
    match document.select(selector).nth(index) {
        None => AnchorHref::OutOfRange,
        Some(el) => el
            .value()
            .attr("href")
            .and_then(|href| base.join(href).ok())
            .map_or(AnchorHref::NoTarget, AnchorHref::Target),
    }
}

fn select_labels(body: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(body);
    document
        .select(selector)
        .map(|el| normalized_text(el).unwrap_or_default())
        .collect()
}

fn select_text(body: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(body);
    document.select(selector).next().and_then(normalized_text)
}

fn normalized_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Picks a usable image source from the attribute cascade, skipping lazy-load
/// placeholders and inline data URIs
fn image_source(element: ElementRef<'_>, base: &Url) -> Option<String> {
    for attr in IMAGE_ATTRS {
        if let Some(value) = element.value().attr(attr) {
            if value.is_empty() || value.contains("placeholder") || value.starts_with("data:") {
                continue;
            }
            if let Ok(resolved) = base.join(value) {
                return Some(resolved.to_string());
            }
        }
    }
    None
}

/// Extracts leaf candidates and the next-page link from one listing page
fn scrape_listing(
    body: &str,
    base: &Url,
    selectors: &Selectors,
) -> (Vec<LeafCandidate>, Option<Url>) {
    let document = Html::parse_document(body);

    let mut candidates = Vec::new();
    for block in document.select(&selectors.leaf_block) {
        let Some(identifier) = block
            .value()
            .attr("href")
            .and_then(|href| base.join(href).ok())
        else {
            continue;
        };

        let fallback_hint = selectors
            .leaf_portrait
            .as_ref()
            .and_then(|s| block.select(s).next())
            .and_then(|img| image_source(img, base));

        candidates.push(LeafCandidate {
            identifier: identifier.to_string(),
            fallback_hint,
        });
    }

    let next = selectors
        .next_page
        .as_ref()
        .and_then(|s| document.select(s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base.join(href).ok());

    (candidates, next)
}

fn scrape_leaf_fields(body: &str, base: &Url, selectors: &Selectors) -> LeafFields {
    let document = Html::parse_document(body);
    let first_text = |selector: &Option<Selector>| {
        selector
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(normalized_text)
    };

    LeafFields {
        name: document
            .select(&selectors.leaf_name)
            .next()
            .and_then(normalized_text),
        title: first_text(&selectors.leaf_title),
        sub_branch: first_text(&selectors.leaf_sub_branch),
        summary: first_text(&selectors.leaf_summary),
        detail: first_text(&selectors.leaf_detail),
        portrait_url: selectors
            .leaf_detail_portrait
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|img| image_source(img, base)),
    }
}
