use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{excerpt, form_fields, query_pairs, submit_form, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;

/// Unique marker that never occurs in legitimate responses; its unencoded
/// presence in a response proves reflection.
pub const XSS_CANARY: &str = "scntm7x5s";

const HTML_PAYLOADS: &[&str] = &[
    "<script>scntm7x5s</script>",
    "<img src=x onerror=scntm7x5s>",
    "<svg/onload=scntm7x5s>",
];

const ATTRIBUTE_PAYLOADS: &[&str] = &[
    "\"><img src=x onerror=scntm7x5s>",
    "\" onfocus=\"scntm7x5s\" autofocus=\"",
    "'><svg/onload=scntm7x5s>",
];

const JS_PAYLOADS: &[&str] = &[
    "';scntm7x5s;//",
    "\";scntm7x5s;//",
    "</script><script>scntm7x5s</script>",
];

const URL_PAYLOADS: &[&str] = &["javascript:scntm7x5s"];

const WAF_BYPASS_PAYLOADS: &[&str] = &[
    "<ScRiPt>scntm7x5s</ScRiPt>",
    "<details open ontoggle=scntm7x5s>",
];

const TEMPLATE_PAYLOADS: &[&str] = &["${scntm7x5s}"];

/// HTML-entity encodings of angle brackets; their presence inside the
/// reflection window means the server encoded the payload.
const ENTITY_MARKERS: &[&str] = &["&lt;", "&gt;", "&amp;", "&#60;"];
static ENTITY_HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#x3[cC];").expect("regex"));

const DOM_SOURCES: &[&str] = &[
    "location.hash",
    "location.search",
    "document.referrer",
    "window.name",
    "document.URL",
    "location.href",
];
const DOM_SINKS: &[&str] = &[
    "document.write",
    "innerHTML",
    "outerHTML",
    "eval(",
    "setTimeout",
    "setInterval",
];
static LOCATION_ASSIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"location(\.\w+)?\s*=[^=]").expect("regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReflectionContext {
    Html,
    Attribute,
    Js,
    Url,
}

/// Guess the syntactic context the parameter value lands in, from the
/// 200 characters preceding its occurrence in the baseline response.
fn guess_context(baseline: &str, original_value: &str) -> ReflectionContext {
    if original_value.is_empty() {
        return ReflectionContext::Html;
    }
    let idx = match baseline.find(original_value) {
        Some(i) => i,
        None => return ReflectionContext::Html,
    };

    let mut start = idx.saturating_sub(200);
    while !baseline.is_char_boundary(start) {
        start -= 1;
    }
    let window = &baseline[start..idx];
    let lower = window.to_ascii_lowercase();

    // An opened, unclosed <script> means the value sits in JS code.
    let last_open = lower.rfind("<script");
    let last_close = lower.rfind("</script");
    if matches!((last_open, last_close), (Some(o), Some(c)) if o > c)
        || (last_open.is_some() && last_close.is_none())
    {
        return ReflectionContext::Js;
    }

    if lower.ends_with("=\"") || lower.ends_with("='") {
        return ReflectionContext::Attribute;
    }

    let tail_start = lower.len().saturating_sub(50);
    let tail = &lower[tail_start..];
    if tail.contains("href=") || tail.contains("src=") || tail.contains("action=") {
        return ReflectionContext::Url;
    }

    ReflectionContext::Html
}

fn payloads_for(context: ReflectionContext) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = match context {
        ReflectionContext::Html => HTML_PAYLOADS.to_vec(),
        ReflectionContext::Attribute => ATTRIBUTE_PAYLOADS.to_vec(),
        ReflectionContext::Js => JS_PAYLOADS.to_vec(),
        ReflectionContext::Url => {
            let mut v = URL_PAYLOADS.to_vec();
            v.extend_from_slice(HTML_PAYLOADS);
            v
        }
    };
    out.extend_from_slice(WAF_BYPASS_PAYLOADS);
    out.extend_from_slice(TEMPLATE_PAYLOADS);
    out
}

/// True when some occurrence of the canary sits in a window free of
/// HTML-entity encoding artifacts.
fn reflected_unencoded(body: &str) -> bool {
    let mut search_from = 0;
    while let Some(pos) = body[search_from..].find(XSS_CANARY) {
        let idx = search_from + pos;
        let mut start = idx.saturating_sub(50);
        while !body.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (idx + XSS_CANARY.len() + 50).min(body.len());
        while !body.is_char_boundary(end) {
            end += 1;
        }
        let window = &body[start..end];
        if !ENTITY_MARKERS.iter().any(|m| window.contains(m)) && !ENTITY_HEX.is_match(window) {
            return true;
        }
        search_from = idx + XSS_CANARY.len();
    }
    false
}

fn reflected_finding(
    vuln_type: &str,
    affected_url: &str,
    param: &str,
    payload: &str,
    request_info: String,
    body: &str,
) -> Finding {
    Finding {
        module_name: "xss".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::High,
        cvss_score: 6.1,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string(),
        owasp_category: "A03".to_string(),
        cwe_id: "CWE-79".to_string(),
        affected_url: affected_url.to_string(),
        affected_parameter: Some(param.to_string()),
        description: format!(
            "Parameter '{param}' reflects user input without encoding, enabling XSS."
        ),
        remediation: "Encode all user input before rendering in HTML context. Implement \
                      Content-Security-Policy."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence: vec![
            Evidence::payload("XSS Payload", payload),
            Evidence::request("Test Request", request_info),
            Evidence::response("Reflected Content (excerpt)", excerpt(body, XSS_CANARY, 100)),
        ],
    }
}

/// Reflected XSS with context-selected payloads, plus a DOM source/sink
/// heuristic when nothing reflects.
pub struct Xss;

#[async_trait]
impl ScanModule for Xss {
    fn name(&self) -> &'static str {
        "xss"
    }

    fn description(&self) -> &'static str {
        "Tests for reflected Cross-Site Scripting (XSS)"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let params = query_pairs(&page.url);
        let baseline = if params.is_empty() {
            None
        } else {
            http.get(&page.url).await.ok()
        };

        for (param, original_value) in &params {
            let context = baseline
                .as_ref()
                .map(|b| guess_context(&b.body, original_value))
                .unwrap_or(ReflectionContext::Html);

            for payload in payloads_for(context) {
                let test_url = match with_query_param(&page.url, param, payload) {
                    Some(u) => u,
                    None => continue,
                };
                let resp = match http.get(&test_url).await {
                    Ok(r) => r,
                    Err(_) => continue,
                };

                if reflected_unencoded(&resp.body) {
                    findings.push(reflected_finding(
                        "Reflected XSS",
                        &page.url,
                        param,
                        payload,
                        test_url,
                        &resp.body,
                    ));
                    break;
                }
            }
        }

        for form in &page.forms {
            for input in &form.inputs {
                if input.name.is_empty() {
                    continue;
                }
                let mut found = false;
                for payload in payloads_for(ReflectionContext::Html) {
                    let fields = form_fields(form, &input.name, payload);
                    let resp = match submit_form(http, form, &fields).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                    if reflected_unencoded(&resp.body) {
                        findings.push(reflected_finding(
                            "Reflected XSS (Form)",
                            &form.action,
                            &input.name,
                            payload,
                            format!("{} {}", form.method, form.action),
                            &resp.body,
                        ));
                        found = true;
                        break;
                    }
                }
                if found {
                    break;
                }
            }
        }

        if findings.is_empty() {
            if let Some(dom) = self.dom_heuristic(page) {
                findings.push(dom);
            }
        }

        Ok(findings)
    }
}

impl Xss {
    fn dom_heuristic(&self, page: &CrawledPage) -> Option<Finding> {
        let body = &page.body;
        let source = DOM_SOURCES.iter().find(|s| body.contains(*s))?;
        let sink = DOM_SINKS
            .iter()
            .find(|s| body.contains(*s))
            .copied()
            .or_else(|| LOCATION_ASSIGN.is_match(body).then_some("location assignment"))?;

        Some(Finding {
            module_name: self.name().to_string(),
            vuln_type: "Potential DOM-based XSS".to_string(),
            severity: Severity::Medium,
            cvss_score: 6.1,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string(),
            owasp_category: "A03".to_string(),
            cwe_id: "CWE-79".to_string(),
            affected_url: page.url.clone(),
            affected_parameter: None,
            description: format!(
                "Page JavaScript reads the attacker-controllable source '{source}' and writes \
                 to the sink '{sink}'. Manual verification recommended."
            ),
            remediation: "Sanitize data read from URL fragments and other client-side sources \
                          before passing it to DOM sinks."
                .to_string(),
            confidence: Confidence::Tentative,
            evidence: vec![
                Evidence::log("DOM Source", *source),
                Evidence::log("DOM Sink", sink),
            ],
        })
    }
}
