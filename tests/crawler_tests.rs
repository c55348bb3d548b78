mod common;

use common::test_client;
use scanhound::crawler::{Crawler, CrawlerConfig};
use scanhound::scope::Scope;

const HTML: &str = "text/html; charset=utf-8";

fn config(max_depth: usize, max_pages: usize) -> CrawlerConfig {
    CrawlerConfig {
        max_depth,
        max_pages,
        concurrency: 5,
        seed_paths: &[],
    }
}

#[tokio::test]
async fn follows_links_breadth_first_and_extracts_forms() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(r#"<a href="/a">a</a><a href="/b">b</a>"#)
        .create_async()
        .await;
    let a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(r#"<form action="/submit" method="post"><input name="q"></form>"#)
        .create_async()
        .await;
    let b = server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body("leaf")
        .create_async()
        .await;

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let pages = Crawler::new(&http, &scope, config(2, 10))
        .crawl(&format!("{base}/"))
        .await;

    root.assert_async().await;
    a.assert_async().await;
    b.assert_async().await;

    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].links.len(), 2);
    let form_page = pages.iter().find(|p| !p.forms.is_empty()).unwrap();
    assert_eq!(form_page.forms[0].method, "POST");
    assert_eq!(form_page.forms[0].inputs[0].name, "q");
}

#[tokio::test]
async fn page_cap_is_honored() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(
            r#"<a href="/p1">1</a><a href="/p2">2</a>
               <a href="/p3">3</a><a href="/p4">4</a>"#,
        )
        .create_async()
        .await;
    for i in 1..=4 {
        server
            .mock("GET", format!("/p{i}").as_str())
            .with_status(200)
            .with_header("content-type", HTML)
            .with_body("page")
            .create_async()
            .await;
    }

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let pages = Crawler::new(&http, &scope, config(3, 2))
        .crawl(&format!("{base}/"))
        .await;

    assert!(pages.len() <= 2);
}

#[tokio::test]
async fn urls_identical_after_normalization_are_fetched_once() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(r#"<a href="/a?x=1&y=2">one</a><a href="/a?y=2&x=1">two</a>"#)
        .create_async()
        .await;
    let a = server
        .mock("GET", "/a")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body("a")
        .expect(1)
        .create_async()
        .await;

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let pages = Crawler::new(&http, &scope, config(2, 10))
        .crawl(&format!("{base}/"))
        .await;

    a.assert_async().await;
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn out_of_scope_links_are_not_followed() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(r#"<a href="https://elsewhere.invalid/x">ext</a><a href="/style.css">css</a>"#)
        .create_async()
        .await;

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let pages = Crawler::new(&http, &scope, config(2, 10))
        .crawl(&format!("{base}/"))
        .await;

    // Only the root page: the external link is out of scope and the
    // stylesheet is filtered by extension.
    assert_eq!(pages.len(), 1);
}

#[tokio::test]
async fn non_html_responses_are_not_pages() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(r#"<a href="/data">data</a>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/data")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let pages = Crawler::new(&http, &scope, config(2, 10))
        .crawl(&format!("{base}/"))
        .await;

    assert_eq!(pages.len(), 1);
}

#[tokio::test]
async fn seed_paths_are_crawled_at_depth_zero() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body("root")
        .create_async()
        .await;
    let login = server
        .mock("GET", "/login")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body("login page")
        .create_async()
        .await;

    let http = test_client();
    let scope = Scope::new(&base, false, &[]);
    let crawler_config = CrawlerConfig {
        max_depth: 0,
        max_pages: 10,
        concurrency: 5,
        seed_paths: &["/login"],
    };
    let pages = Crawler::new(&http, &scope, crawler_config)
        .crawl(&format!("{base}/"))
        .await;

    login.assert_async().await;
    assert_eq!(pages.len(), 2);
}
