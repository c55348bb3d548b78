use std::collections::{HashSet, VecDeque};

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use url::Url;

use crate::http::HttpClient;
use crate::normalize::normalize_url;
use crate::scope::Scope;

/// Well-known paths enqueued at depth 0 alongside the target, so thin entry
/// pages still surface the interesting surfaces of an application.
pub const SEED_PATHS_QUICK: &[&str] = &[
    "/", "/login", "/signin", "/register", "/signup", "/admin", "/dashboard", "/home",
    "/index.html", "/about", "/contact", "/user", "/profile",
];

pub const SEED_PATHS_FULL: &[&str] = &[
    "/", "/login", "/signin", "/register", "/signup", "/admin", "/dashboard", "/home",
    "/index.html", "/about", "/contact", "/user", "/profile", "/api", "/api/v1", "/graphql",
    "/swagger", "/api-docs", "/docs", "/logout", "/forgot-password", "/reset-password",
    "/settings", "/account", "/.well-known/security.txt", "/robots.txt", "/sitemap.xml",
    "/manager", "/administrator", "/backend", "/portal", "/app",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub name: String,
    pub input_type: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Form {
    /// Absolute action URL, resolved against the page.
    pub action: String,
    /// Uppercased method, `GET` when the form does not declare one.
    pub method: String,
    pub inputs: Vec<FormInput>,
}

/// One fetched page, immutable once emitted by the crawler.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub forms: Vec<Form>,
    pub links: Vec<String>,
}

impl CrawledPage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
            .collect()
    }

    pub fn headers_text(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("<binary>")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_depth: usize,
    pub max_pages: usize,
    pub concurrency: usize,
    pub seed_paths: &'static [&'static str],
}

/// Breadth-first crawler: dedups by normalized URL, honors depth/page caps,
/// fetches each batch in parallel and extracts links and forms from HTML
/// responses.
pub struct Crawler<'a> {
    http: &'a HttpClient,
    scope: &'a Scope,
    config: CrawlerConfig,
}

impl<'a> Crawler<'a> {
    pub fn new(http: &'a HttpClient, scope: &'a Scope, config: CrawlerConfig) -> Self {
        Self {
            http,
            scope,
            config,
        }
    }

    pub async fn crawl(&self, start_url: &str) -> Vec<CrawledPage> {
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pages: Vec<CrawledPage> = Vec::new();

        queue.push_back((start_url.to_string(), 0));
        if let Ok(origin) = Url::parse(start_url).and_then(|u| u.join("/")) {
            for seed in self.config.seed_paths {
                if let Ok(seeded) = origin.join(seed) {
                    queue.push_back((seeded.to_string(), 0));
                }
            }
        }

        while !queue.is_empty() && pages.len() < self.config.max_pages {
            let mut batch: Vec<(String, usize)> = Vec::new();
            while let Some((url, depth)) = queue.pop_front() {
                let normalized = normalize_url(&url);
                if visited.contains(&normalized)
                    || depth > self.config.max_depth
                    || !self.scope.is_in_scope(&url)
                {
                    continue;
                }
                visited.insert(normalized);
                batch.push((url, depth));
                if batch.len() >= self.config.concurrency {
                    break;
                }
            }

            if batch.is_empty() {
                break;
            }

            let fetches = batch
                .iter()
                .map(|(url, depth)| self.fetch_page(url, *depth));
            for fetched in join_all(fetches).await {
                let (page, depth) = match fetched {
                    Some(result) => result,
                    None => continue,
                };

                let links = page.links.clone();
                pages.push(page);
                if pages.len() >= self.config.max_pages {
                    break;
                }

                for link in links {
                    let norm = normalize_url(&link);
                    if !visited.contains(&norm) && self.scope.is_in_scope(&link) {
                        queue.push_back((link, depth + 1));
                    }
                }
            }
        }

        pages
    }

    async fn fetch_page(&self, url: &str, depth: usize) -> Option<(CrawledPage, usize)> {
        let resp = match self.http.get(url).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "failed to fetch page");
                return None;
            }
        };

        let content_type = resp.header("content-type").unwrap_or("").to_string();
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return None;
        }

        let links = extract_links(url, &resp.body);
        let forms = extract_forms(url, &resp.body);

        Some((
            CrawledPage {
                url: url.to_string(),
                status_code: resp.status,
                headers: resp.headers,
                body: resp.body,
                forms,
                links,
            },
            depth,
        ))
    }
}

static HREF_TAGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], link[href], area[href]").expect("selector"));
static SRC_TAGS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script[src], img[src], iframe[src], source[src], video[src], audio[src]")
        .expect("selector")
});
static DATA_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-href]").expect("selector"));
static DATA_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-src]").expect("selector"));
static SRCSET: Lazy<Selector> = Lazy::new(|| Selector::parse("[srcset]").expect("selector"));
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[http-equiv]").expect("selector"));
static FORM: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("selector"));
static FORM_FIELDS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").expect("selector"));
static META_REFRESH_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)url\s*=\s*(.+)").expect("regex"));

fn push_link(base: &Url, href: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return;
    }
    if let Ok(absolute) = base.join(href) {
        let absolute = absolute.to_string();
        if seen.insert(absolute.clone()) {
            out.push(absolute);
        }
    }
}

/// Collect candidate links from every URL-bearing attribute the crawler
/// understands, resolved against the page URL and deduplicated in document
/// order.
pub fn extract_links(base_url: &str, html: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&HREF_TAGS) {
        if let Some(href) = el.value().attr("href") {
            push_link(&base, href, &mut seen, &mut links);
        }
    }
    for el in doc.select(&SRC_TAGS) {
        if let Some(src) = el.value().attr("src") {
            push_link(&base, src, &mut seen, &mut links);
        }
    }
    for el in doc.select(&DATA_HREF) {
        if let Some(href) = el.value().attr("data-href") {
            push_link(&base, href, &mut seen, &mut links);
        }
    }
    for el in doc.select(&DATA_SRC) {
        if let Some(src) = el.value().attr("data-src") {
            push_link(&base, src, &mut seen, &mut links);
        }
    }
    for el in doc.select(&SRCSET) {
        if let Some(srcset) = el.value().attr("srcset") {
            for candidate in srcset.split(',') {
                if let Some(first) = candidate.split_whitespace().next() {
                    push_link(&base, first, &mut seen, &mut links);
                }
            }
        }
    }
    for el in doc.select(&META) {
        let equiv = el.value().attr("http-equiv").unwrap_or("");
        if !equiv.eq_ignore_ascii_case("refresh") {
            continue;
        }
        if let Some(content) = el.value().attr("content") {
            if let Some(cap) = META_REFRESH_URL.captures(content) {
                push_link(&base, cap[1].trim(), &mut seen, &mut links);
            }
        }
    }
    for el in doc.select(&FORM) {
        if let Some(action) = el.value().attr("action") {
            push_link(&base, action, &mut seen, &mut links);
        }
    }

    links
}

/// Extract forms with their resolved action, uppercased method, and inputs
/// in document order.
pub fn extract_forms(base_url: &str, html: &str) -> Vec<Form> {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let doc = Html::parse_document(html);
    let mut forms = Vec::new();

    for form_el in doc.select(&FORM) {
        let action = form_el.value().attr("action").unwrap_or("");
        let action = base
            .join(action)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| base_url.to_string());
        let method = form_el
            .value()
            .attr("method")
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let inputs = form_el
            .select(&FORM_FIELDS)
            .map(|inp| FormInput {
                name: inp.value().attr("name").unwrap_or("").to_string(),
                input_type: inp.value().attr("type").unwrap_or("text").to_string(),
                value: inp.value().attr("value").unwrap_or("").to_string(),
            })
            .collect();

        forms.push(Form {
            action,
            method,
            inputs,
        });
    }

    forms
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><head>
          <link href="/style-page.html">
          <meta http-equiv="refresh" content="5; url=/redirected">
        </head><body>
          <a href="/a">A</a>
          <a href="/a">duplicate</a>
          <a href="#frag">fragment only</a>
          <a href="javascript:void(0)">js</a>
          <a href="mailto:x@example.com">mail</a>
          <script src="/app.js"></script>
          <img src="/img.png" data-src="/lazy.html">
          <iframe src="/frame"></iframe>
          <img srcset="/small.jpg 1x, /large.jpg 2x">
          <div data-href="/data-target"></div>
          <form action="/submit" method="post">
            <input name="user" value="alice">
            <input type="password" name="pass">
            <textarea name="bio"></textarea>
          </form>
        </body></html>
    "##;

    #[test]
    fn extracts_all_link_sources() {
        let links = extract_links("https://example.com/base/", PAGE);
        assert!(links.contains(&"https://example.com/a".to_string()));
        assert!(links.contains(&"https://example.com/style-page.html".to_string()));
        assert!(links.contains(&"https://example.com/app.js".to_string()));
        assert!(links.contains(&"https://example.com/frame".to_string()));
        assert!(links.contains(&"https://example.com/lazy.html".to_string()));
        assert!(links.contains(&"https://example.com/small.jpg".to_string()));
        assert!(links.contains(&"https://example.com/data-target".to_string()));
        assert!(links.contains(&"https://example.com/redirected".to_string()));
        assert!(links.contains(&"https://example.com/submit".to_string()));
    }

    #[test]
    fn skips_pseudo_schemes_and_dedups() {
        let links = extract_links("https://example.com/", PAGE);
        assert_eq!(
            links
                .iter()
                .filter(|l| l.ends_with("/a"))
                .count(),
            1
        );
        assert!(!links.iter().any(|l| l.contains("javascript:")));
        assert!(!links.iter().any(|l| l.contains("mailto:")));
    }

    #[test]
    fn relative_links_resolve_against_page() {
        let links = extract_links("https://example.com/dir/page", "<a href='sub'>s</a>");
        assert_eq!(links, vec!["https://example.com/dir/sub".to_string()]);
    }

    #[test]
    fn form_extraction_defaults() {
        let forms = extract_forms("https://example.com/login", PAGE);
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(form.action, "https://example.com/submit");
        assert_eq!(form.method, "POST");
        assert_eq!(form.inputs.len(), 3);
        assert_eq!(form.inputs[0].name, "user");
        assert_eq!(form.inputs[0].input_type, "text");
        assert_eq!(form.inputs[0].value, "alice");
        assert_eq!(form.inputs[1].input_type, "password");
        assert_eq!(form.inputs[1].value, "");
        assert_eq!(form.inputs[2].name, "bio");
    }

    #[test]
    fn form_without_action_targets_page() {
        let forms = extract_forms("https://example.com/login", "<form><input name='q'></form>");
        assert_eq!(forms[0].action, "https://example.com/login");
        assert_eq!(forms[0].method, "GET");
    }
}
