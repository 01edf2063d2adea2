//! Integration tests for the HTTP navigation driver
//!
//! These tests mount a small mock catalog site with wiremock and drive the
//! navigator through the same motions the coordinator performs: open an
//! entity, enumerate and select filters, walk a paginated listing, and fetch
//! detail pages.

use strata_crawl::config::{
    Config, CrawlerConfig, OutputConfig, SelectorConfig, SiteConfig, UserAgentConfig,
};
use strata_crawl::nav::{
    FetchOutcome, HttpNavigator, NavigationDriver, OpenOutcome, PageFetcher, ParentContext,
    SelectOutcome,
};
use strata_crawl::state::LeafTarget;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            scope: "1-10".to_string(),
            action_pause_ms: [0, 0],
            entity_pause_ms: [0, 0],
            page_timeout_secs: 5,
            max_consecutive_nav_failures: 3,
            unfiltered_labels: vec!["全部".to_string()],
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        site: SiteConfig {
            entity_url: format!("{}/entity/{{id}}/", base_url),
            catalog_url: format!("{}/entity/{{id}}/list.html", base_url),
            selectors: SelectorConfig {
                entity_name: "h1.entity-name".to_string(),
                entity_emblem: Some("div.emblem img".to_string()),
                entity_tags: Some("ul.tags span".to_string()),
                entity_description: Some("div.description".to_string()),
                entity_website: Some("div.website".to_string()),
                branch: "div.filters a.branch".to_string(),
                sub_branch: "div.filters a.sub".to_string(),
                leaf_block: "a.leaf".to_string(),
                leaf_portrait: Some("img".to_string()),
                next_page: Some("a.next".to_string()),
                leaf_name: "span.leaf-name".to_string(),
                leaf_title: Some("span.leaf-title".to_string()),
                leaf_sub_branch: Some("div.leaf-sub".to_string()),
                leaf_summary: Some("div.leaf-summary".to_string()),
                leaf_detail: Some("div.leaf-detail".to_string()),
                leaf_detail_portrait: Some("div.portrait img".to_string()),
            },
        },
        output: OutputConfig {
            data_dir: "./data".to_string(),
            checkpoint_path: "./checkpoint.json".to_string(),
            pending_path: "./pending.json".to_string(),
        },
    }
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn entity_page() -> &'static str {
    r#"<html><body>
        <h1 class="entity-name">Alpha Center</h1>
        <div class="emblem"><img src="/img/emblem.png"></div>
        <ul class="tags"><span>public</span><span>tier-3</span></ul>
        <div class="description">A large test facility.</div>
        <div class="website">https://alpha.example.com</div>
    </body></html>"#
}

fn listing_page() -> &'static str {
    r#"<html><body>
        <div class="filters">
            <a class="branch" href="/entity/1/all.html">全部</a>
            <a class="branch" href="/entity/1/internal.html">Internal</a>
            <a class="branch" href="/entity/1/surgery.html">Surgery</a>
        </div>
        <a class="leaf" href="/leaf/a"><img data-src="/img/a.jpg"><span>A</span></a>
        <a class="leaf" href="/leaf/b"><span>B</span></a>
        <a class="next" href="/entity/1/list2.html">next</a>
    </body></html>"#
}

#[tokio::test]
async fn test_open_entity_found() {
    let server = MockServer::start().await;
    mount_page(&server, "/entity/1/", entity_page()).await;
    mount_page(&server, "/entity/1/list.html", listing_page()).await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).expect("navigator construction failed");

    let outcome = nav.open_entity(1).await.unwrap();
    assert_eq!(
        outcome,
        OpenOutcome::Opened {
            name: Some("Alpha Center".to_string())
        }
    );

    let branches = nav.list_branches().await.unwrap();
    assert_eq!(branches, vec!["全部", "Internal", "Surgery"]);
}

#[tokio::test]
async fn test_open_entity_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entity/7/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    assert_eq!(nav.open_entity(7).await.unwrap(), OpenOutcome::NotFound);
}

#[tokio::test]
async fn test_select_branch_follows_filter_href() {
    let server = MockServer::start().await;
    mount_page(&server, "/entity/1/", entity_page()).await;
    mount_page(&server, "/entity/1/list.html", listing_page()).await;
    mount_page(
        &server,
        "/entity/1/internal.html",
        r#"<html><body>
            <div class="filters">
                <a class="sub" href="/entity/1/internal-cardio.html">Cardiology</a>
                <a class="sub" href="/entity/1/internal-neuro.html">Neurology</a>
            </div>
            <a class="leaf" href="/leaf/c"><span>C</span></a>
        </body></html>"#,
    )
    .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    nav.open_entity(1).await.unwrap();
    assert_eq!(nav.select_branch(1).await.unwrap(), SelectOutcome::Selected);

    // The current page is now the filtered listing
    let subs = nav.list_sub_branches().await.unwrap();
    assert_eq!(subs, vec!["Cardiology", "Neurology"]);

    // An index past the fresh enumeration reports Stale
    assert_eq!(nav.select_branch(9).await.unwrap(), SelectOutcome::Stale);
}

#[tokio::test]
async fn test_discover_leaves_walks_pagination() {
    let server = MockServer::start().await;
    mount_page(&server, "/entity/1/", entity_page()).await;
    mount_page(&server, "/entity/1/list.html", listing_page()).await;
    mount_page(
        &server,
        "/entity/1/list2.html",
        r#"<html><body>
            <a class="leaf" href="/leaf/c"><img src="/img/c.jpg"><span>C</span></a>
        </body></html>"#,
    )
    .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    nav.open_entity(1).await.unwrap();
    let candidates = nav.discover_leaves().await.unwrap();

    let ids: Vec<&str> = candidates.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            format!("{}/leaf/a", server.uri()),
            format!("{}/leaf/b", server.uri()),
            format!("{}/leaf/c", server.uri()),
        ]
    );
    assert_eq!(
        candidates[0].fallback_hint,
        Some(format!("{}/img/a.jpg", server.uri()))
    );
    assert_eq!(candidates[1].fallback_hint, None);
}

#[tokio::test]
async fn test_fetch_entity_summary_fields() {
    let server = MockServer::start().await;
    mount_page(&server, "/entity/1/", entity_page()).await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    let outcome = nav.fetch_entity_summary(1).await.unwrap();
    let FetchOutcome::Fetched(summary) = outcome else {
        panic!("expected a fetched summary");
    };
    assert_eq!(summary.name, "Alpha Center");
    assert_eq!(
        summary.emblem_url,
        Some(format!("{}/img/emblem.png", server.uri()))
    );
    assert_eq!(summary.tags, Some("public,tier-3".to_string()));
    assert_eq!(summary.description, Some("A large test facility.".to_string()));
    assert_eq!(summary.website, Some("https://alpha.example.com".to_string()));
}

#[tokio::test]
async fn test_fetch_entity_summary_soft_404() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/entity/3/",
        "<html><body><p>nothing here</p></body></html>",
    )
    .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    assert_eq!(
        nav.fetch_entity_summary(3).await.unwrap(),
        FetchOutcome::NotFound
    );
}

#[tokio::test]
async fn test_fetch_leaf_record_with_portrait_fallback() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/leaf/a",
        r#"<html><body>
            <span class="leaf-name">Dr. Chen</span>
            <span class="leaf-title">Chief</span>
            <div class="leaf-sub">Cardiology</div>
            <div class="leaf-summary">Summary text.</div>
        </body></html>"#,
    )
    .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    let target = LeafTarget {
        identifier: format!("{}/leaf/a", server.uri()),
        fallback_hint: Some("https://img.example.com/a.jpg".to_string()),
    };
    let context = ParentContext {
        entity_id: 1,
        entity_name: "Alpha Center",
        branch: "Internal",
        sub_branch: None,
    };

    let outcome = nav.fetch_leaf_record(&target, &context).await.unwrap();
    let FetchOutcome::Fetched(fields) = outcome else {
        panic!("expected fetched leaf fields");
    };
    assert_eq!(fields.name, Some("Dr. Chen".to_string()));
    assert_eq!(fields.title, Some("Chief".to_string()));
    assert_eq!(fields.sub_branch, Some("Cardiology".to_string()));
    assert_eq!(fields.summary, Some("Summary text.".to_string()));
    // No portrait on the page: the discovery-time hint fills in
    assert_eq!(
        fields.portrait_url,
        Some("https://img.example.com/a.jpg".to_string())
    );
}

#[tokio::test]
async fn test_fetch_leaf_record_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leaf/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let mut nav = HttpNavigator::new(&config).unwrap();

    let target = LeafTarget {
        identifier: format!("{}/leaf/gone", server.uri()),
        fallback_hint: None,
    };
    let context = ParentContext {
        entity_id: 1,
        entity_name: "Alpha Center",
        branch: "Internal",
        sub_branch: None,
    };

    assert_eq!(
        nav.fetch_leaf_record(&target, &context).await.unwrap(),
        FetchOutcome::NotFound
    );
}
