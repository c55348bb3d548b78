use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::crawler::{CrawledPage, Form};
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const XXE_PAYLOADS: &[(&str, &str)] = &[
    (
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <!DOCTYPE root [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]>\
         <root>&xxe;</root>",
        "Classic XXE - /etc/passwd",
    ),
    (
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <!DOCTYPE root [<!ENTITY xxe SYSTEM \"file:///c:/windows/win.ini\">]>\
         <root>&xxe;</root>",
        "Classic XXE - Windows win.ini",
    ),
];

static XXE_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)root:.*:/bin/",
        r"\[extensions\]",
        r"for 16-bit app support",
        r"127\.0\.0\.1\s+localhost",
        r"(?i)daemon:.*:/usr/sbin",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("regex"))
    .collect()
});

const API_PATH_HINTS: &[&str] = &["/api/", "/soap/", "/xml/", "/upload", "/import", "/parse"];

fn indicator_match(body: &str) -> Option<&'static Regex> {
    XXE_INDICATORS.iter().find(|re| re.is_match(body))
}

/// Heuristic: the form posts to an API-shaped endpoint or uploads files.
fn form_accepts_xml(form: &Form) -> bool {
    let action = form.action.to_ascii_lowercase();
    if API_PATH_HINTS.iter().any(|hint| action.contains(hint)) {
        return true;
    }
    form.inputs.iter().any(|inp| inp.input_type == "file")
}

/// Posts external-entity XML at endpoints likely to parse XML and checks
/// for leaked file content.
pub struct Xxe;

#[async_trait]
impl ScanModule for Xxe {
    fn name(&self) -> &'static str {
        "xxe"
    }

    fn description(&self) -> &'static str {
        "Tests for XML External Entity (XXE) injection"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for form in &page.forms {
            if !form_accepts_xml(form) {
                continue;
            }
            if let Some(finding) = self.probe(&form.action, http).await {
                findings.push(finding);
                break;
            }
        }

        let path = Url::parse(&page.url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_default();
        if API_PATH_HINTS.iter().any(|hint| path.contains(hint)) {
            if let Some(finding) = self.probe(&page.url, http).await {
                findings.push(finding);
            }
        }

        Ok(findings)
    }
}

impl Xxe {
    async fn probe(&self, url: &str, http: &HttpClient) -> Option<Finding> {
        for (payload, label) in XXE_PAYLOADS {
            let resp = match http.post_body(url, payload, "application/xml").await {
                Ok(r) => r,
                Err(_) => continue,
            };
            let re = match indicator_match(&resp.body) {
                Some(re) => re,
                None => continue,
            };
            let matched = re
                .find(&resp.body)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();

            return Some(Finding {
                module_name: self.name().to_string(),
                vuln_type: "XML External Entity (XXE) Injection".to_string(),
                severity: Severity::Critical,
                cvss_score: 9.1,
                cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N".to_string(),
                owasp_category: "A05".to_string(),
                cwe_id: "CWE-611".to_string(),
                affected_url: url.to_string(),
                affected_parameter: None,
                description: format!(
                    "XXE injection via {label}: the server resolved an external XML entity and \
                     disclosed file contents."
                ),
                remediation: "Disable external entity and DTD processing in the XML parser. \
                              Never parse untrusted XML with a permissive parser."
                    .to_string(),
                confidence: Confidence::Confirmed,
                evidence: vec![
                    Evidence::payload("XXE Payload", &payload[..payload.len().min(200)]),
                    Evidence::response("File Content Disclosed", matched),
                ],
            });
        }
        None
    }
}
