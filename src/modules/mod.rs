use async_trait::async_trait;
use url::Url;

use crate::crawler::{CrawledPage, Form};
use crate::finding::Finding;
use crate::http::{HttpClient, HttpError, HttpResponse};
use crate::store::ScanMode;

pub mod api_misconfig;
pub mod command_injection;
pub mod cookie_security;
pub mod cors;
pub mod crlf_injection;
pub mod csrf;
pub mod directory_exposure;
pub mod graphql;
pub mod https_check;
pub mod idor;
pub mod jwt_analysis;
pub mod open_redirect;
pub mod path_traversal;
pub mod rate_limit_check;
pub mod robots_txt;
pub mod security_headers;
pub mod sensitive_files;
pub mod sqli;
pub mod ssrf;
pub mod ssti;
pub mod tls_check;
pub mod xss;
pub mod xxe;

/// A vulnerability detector. Passive detectors inspect pages the crawler
/// already fetched; active detectors send crafted follow-up requests.
/// Either hook may fail: the orchestrator logs the error and carries on
/// with the scan.
#[async_trait]
pub trait ScanModule: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Quick, ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn passive(&self, _page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    async fn active(
        &self,
        _page: &CrawledPage,
        _http: &HttpClient,
    ) -> anyhow::Result<Vec<Finding>> {
        Ok(Vec::new())
    }
}

/// The full detector set in invocation order. Order is part of the engine
/// contract: the first finding with a given dedup fingerprint wins.
pub fn all_modules() -> Vec<Box<dyn ScanModule>> {
    vec![
        Box::new(security_headers::SecurityHeaders),
        Box::new(https_check::HttpsCheck),
        Box::new(cookie_security::CookieSecurity),
        Box::new(robots_txt::RobotsTxt),
        Box::new(jwt_analysis::JwtAnalysis),
        Box::new(cors::Cors),
        Box::new(open_redirect::OpenRedirect),
        Box::new(xss::Xss),
        Box::new(sqli::Sqli),
        Box::new(ssrf::Ssrf),
        Box::new(ssti::Ssti),
        Box::new(path_traversal::PathTraversal),
        Box::new(command_injection::CommandInjection),
        Box::new(crlf_injection::CrlfInjection),
        Box::new(xxe::Xxe),
        Box::new(graphql::GraphQl),
        Box::new(csrf::Csrf),
        Box::new(idor::Idor),
        Box::new(directory_exposure::DirectoryExposure),
        Box::new(sensitive_files::SensitiveFiles),
        Box::new(api_misconfig::ApiMisconfig),
        Box::new(rate_limit_check::RateLimitCheck),
        Box::new(tls_check::TlsCheck),
    ]
}

pub fn modules_for_mode(mode: ScanMode) -> Vec<Box<dyn ScanModule>> {
    all_modules()
        .into_iter()
        .filter(|m| m.scan_modes().contains(&mode))
        .collect()
}

// ── Shared helpers for parameter-injection detectors ─────────────────────────

/// Query parameters of a URL in order, duplicates collapsed to their first
/// value.
pub(crate) fn query_pairs(url: &str) -> Vec<(String, String)> {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let mut out: Vec<(String, String)> = Vec::new();
    for (k, v) in parsed.query_pairs() {
        if !out.iter().any(|(name, _)| *name == k.as_ref()) {
            out.push((k.into_owned(), v.into_owned()));
        }
    }
    out
}

/// Rebuild `url` with `name` set to `value`, all other query parameters
/// preserved (first value each) and the fragment dropped.
pub(crate) fn with_query_param(url: &str, name: &str, value: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut pairs = query_pairs(url);
    match pairs.iter_mut().find(|(k, _)| k == name) {
        Some(pair) => pair.1 = value.to_string(),
        None => pairs.push((name.to_string(), value.to_string())),
    }

    let mut rebuilt = parsed;
    rebuilt.set_fragment(None);
    rebuilt.set_query(None);
    {
        let mut qp = rebuilt.query_pairs_mut();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
    }
    Some(rebuilt.to_string())
}

/// All named fields of a form with their default values (empty values fall
/// back to `test`), with one field overridden by the payload.
pub(crate) fn form_fields(form: &Form, override_name: &str, payload: &str) -> Vec<(String, String)> {
    form.inputs
        .iter()
        .filter(|inp| !inp.name.is_empty())
        .map(|inp| {
            if inp.name == override_name {
                (inp.name.clone(), payload.to_string())
            } else if inp.value.is_empty() {
                (inp.name.clone(), "test".to_string())
            } else {
                (inp.name.clone(), inp.value.clone())
            }
        })
        .collect()
}

/// Submit a form the way a browser would: POST with a urlencoded body, or
/// GET with the fields appended to the action's query string.
pub(crate) async fn submit_form(
    http: &HttpClient,
    form: &Form,
    fields: &[(String, String)],
) -> Result<HttpResponse, HttpError> {
    if form.method == "POST" {
        http.post_form(&form.action, fields).await
    } else {
        let query = {
            let mut ser = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in fields {
                ser.append_pair(k, v);
            }
            ser.finish()
        };
        let url = format!("{}?{}", form.action, query);
        http.get(&url).await
    }
}

/// A `...window...` excerpt of `text` around the first occurrence of
/// `marker`, used for evidence attachments.
pub(crate) fn excerpt(text: &str, marker: &str, context: usize) -> String {
    let idx = match text.find(marker) {
        Some(i) => i,
        None => return String::new(),
    };
    let mut start = idx.saturating_sub(context);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (idx + marker.len() + context).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    format!("...{}...", &text[start..end])
}
