use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

static SRC_RESOURCES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[src], img[src], iframe[src]").expect("selector"));
static LINK_RESOURCES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[href]").expect("selector"));

fn http_resources(body: &str) -> Vec<String> {
    let doc = Html::parse_document(body);
    let mut out = Vec::new();
    for el in doc.select(&SRC_RESOURCES) {
        if let Some(src) = el.value().attr("src") {
            if src.starts_with("http://") {
                out.push(src.to_string());
            }
        }
    }
    for el in doc.select(&LINK_RESOURCES) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with("http://") {
                out.push(href.to_string());
            }
        }
    }
    out
}

/// Flags plain-HTTP pages and HTTPS pages loading subresources over HTTP.
pub struct HttpsCheck;

#[async_trait]
impl ScanModule for HttpsCheck {
    fn name(&self) -> &'static str {
        "https_check"
    }

    fn description(&self) -> &'static str {
        "Checks for HTTPS usage and mixed content"
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let scheme = Url::parse(&page.url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_default();

        if scheme == "http" {
            findings.push(Finding {
                module_name: self.name().to_string(),
                vuln_type: "Missing HTTPS".to_string(),
                severity: Severity::Medium,
                cvss_score: 5.9,
                cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:H/I:N/A:N".to_string(),
                owasp_category: "A02".to_string(),
                cwe_id: "CWE-319".to_string(),
                affected_url: page.url.clone(),
                affected_parameter: None,
                description: "The page is served over plain HTTP, allowing potential \
                              eavesdropping and MITM attacks."
                    .to_string(),
                remediation: "Enforce HTTPS across the entire application. Redirect all HTTP \
                              traffic to HTTPS and enable HSTS."
                    .to_string(),
                confidence: Confidence::Confirmed,
                evidence: vec![],
            });
        }

        if scheme == "https" {
            let mixed = http_resources(&page.body);
            if !mixed.is_empty() {
                let preview = mixed.iter().take(10).cloned().collect::<Vec<_>>().join("\n");
                findings.push(Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "Mixed Content".to_string(),
                    severity: Severity::Low,
                    cvss_score: 3.7,
                    cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
                    owasp_category: "A02".to_string(),
                    cwe_id: "CWE-311".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: None,
                    description: format!(
                        "The HTTPS page loads {} resource(s) over plain HTTP.",
                        mixed.len()
                    ),
                    remediation: "Update all resource references to use HTTPS.".to_string(),
                    confidence: Confidence::Confirmed,
                    evidence: vec![Evidence::log("Mixed Content Resources", preview)],
                });
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn page(url: &str, body: &str) -> CrawledPage {
        CrawledPage {
            url: url.to_string(),
            status_code: 200,
            headers: HeaderMap::new(),
            body: body.to_string(),
            forms: vec![],
            links: vec![],
        }
    }

    #[tokio::test]
    async fn http_page_flagged() {
        let findings = HttpsCheck
            .passive(&page("http://example.com/", ""))
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "Missing HTTPS");
    }

    #[tokio::test]
    async fn mixed_content_detected_on_https() {
        let body = r#"<script src="http://cdn.example.com/a.js"></script>
                      <img src="https://example.com/ok.png">"#;
        let findings = HttpsCheck
            .passive(&page("https://example.com/", body))
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "Mixed Content");
    }

    #[tokio::test]
    async fn clean_https_page_passes() {
        let findings = HttpsCheck
            .passive(&page("https://example.com/", "<img src='/local.png'>"))
            .await
            .unwrap();
        assert!(findings.is_empty());
    }
}
