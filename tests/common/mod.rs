#![allow(dead_code)]

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scanhound::crawler::{CrawledPage, Form};
use scanhound::http::HttpClient;

/// Client with pacing disabled; everything under test talks to a local
/// mockito server.
pub fn test_client() -> HttpClient {
    HttpClient::unthrottled().expect("client builds")
}

pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).expect("header name"),
            HeaderValue::from_str(value).expect("header value"),
        );
    }
    headers
}

pub fn make_page(url: &str, body: &str, headers: &[(&str, &str)]) -> CrawledPage {
    CrawledPage {
        url: url.to_string(),
        status_code: 200,
        headers: header_map(headers),
        body: body.to_string(),
        forms: Vec::new(),
        links: Vec::new(),
    }
}

pub fn make_page_with_forms(url: &str, body: &str, forms: Vec<Form>) -> CrawledPage {
    CrawledPage {
        url: url.to_string(),
        status_code: 200,
        headers: HeaderMap::new(),
        body: body.to_string(),
        forms,
        links: Vec::new(),
    }
}
