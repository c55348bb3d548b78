use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{query_pairs, with_query_param, ScanModule};
use crate::normalize::host_of;
use crate::scoring::cvss::Severity;

const REDIRECT_PARAMS: &[&str] = &[
    "url",
    "redirect",
    "next",
    "return",
    "returnto",
    "goto",
    "target",
    "redir",
    "destination",
    "continue",
];

const REDIRECT_PAYLOADS: &[&str] = &["https://evil.com", "//evil.com", "/\\evil.com"];

/// Swaps redirect-shaped query parameters for an external target and
/// inspects the Location header without following it.
pub struct OpenRedirect;

#[async_trait]
impl ScanModule for OpenRedirect {
    fn name(&self) -> &'static str {
        "open_redirect"
    }

    fn description(&self) -> &'static str {
        "Tests for open redirect vulnerabilities"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        for (param, _) in query_pairs(&page.url) {
            if !REDIRECT_PARAMS.contains(&param.to_ascii_lowercase().as_str()) {
                continue;
            }

            for payload in REDIRECT_PAYLOADS {
                let test_url = match with_query_param(&page.url, &param, payload) {
                    Some(u) => u,
                    None => continue,
                };
                let resp = match http.get_no_redirect(&test_url).await {
                    Ok(r) => r,
                    Err(_) => continue,
                };

                if !matches!(resp.status, 301 | 302 | 303 | 307 | 308) {
                    continue;
                }
                let location = resp.header("location").unwrap_or("").to_string();
                if !host_of(&location).contains("evil.com") {
                    continue;
                }

                return Ok(vec![Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "Open Redirect".to_string(),
                    severity: Severity::Medium,
                    cvss_score: 6.1,
                    cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string(),
                    owasp_category: "A01".to_string(),
                    cwe_id: "CWE-601".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: Some(param.clone()),
                    description: format!(
                        "Parameter '{param}' allows redirects to external domains."
                    ),
                    remediation: "Validate redirect targets against a whitelist of allowed \
                                  domains. Use relative paths when possible."
                        .to_string(),
                    confidence: Confidence::Confirmed,
                    evidence: vec![
                        Evidence::request("Test URL", test_url),
                        Evidence::response("Redirect Location", format!("Location: {location}")),
                    ],
                }]);
            }
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_names_are_matched_case_insensitively() {
        assert!(REDIRECT_PARAMS.contains(&"returnTo".to_ascii_lowercase().as_str()));
        assert!(!REDIRECT_PARAMS.contains(&"q"));
    }

    #[test]
    fn payload_host_extraction() {
        // The protocol-relative payload must still resolve to evil.com when
        // echoed into Location.
        assert!(host_of("https://evil.com/landing").contains("evil.com"));
        assert_eq!(host_of("/relative/path"), "");
    }
}
