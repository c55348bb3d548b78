use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{query_pairs, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Header we try to smuggle into the response; seeing it come back proves
/// header injection.
pub const CRLF_HEADER_NAME: &str = "X-Scntm-Crlf";
const CRLF_HEADER_VALUE: &str = "injected";

static CRLF_PAYLOADS: Lazy<Vec<String>> = Lazy::new(|| {
    let header = format!("{CRLF_HEADER_NAME}: {CRLF_HEADER_VALUE}");
    vec![
        format!("\r\n{header}"),
        format!("%0d%0a{header}"),
        format!("%0D%0A{header}"),
        format!("%0d%0a%20{header}"),
        format!("\r\n\t{header}"),
        // Unicode characters whose UTF-8 encoding ends in 0x8D/0x8A; some
        // stacks down-convert them to CR/LF.
        format!("%E5%98%8D%E5%98%8A{header}"),
        format!("\\r\\n{header}"),
        // Doubled CRLF splits into the body.
        "\r\n\r\n<html>injected</html>".to_string(),
        "%0d%0a%0d%0a<html>injected</html>".to_string(),
    ]
});

static BODY_INJECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html>injected</html>").expect("regex"));

/// CRLF / HTTP response splitting probes on query parameters.
pub struct CrlfInjection;

#[async_trait]
impl ScanModule for CrlfInjection {
    fn name(&self) -> &'static str {
        "crlf_injection"
    }

    fn description(&self) -> &'static str {
        "Tests for CRLF header injection and response splitting"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for (param, _) in query_pairs(&page.url) {
            for payload in CRLF_PAYLOADS.iter() {
                let test_url = match with_query_param(&page.url, &param, &format!("test{payload}"))
                {
                    Some(u) => u,
                    None => continue,
                };
                let resp = match http.get(&test_url).await {
                    Ok(r) => r,
                    Err(_) => continue,
                };

                if let Some(value) = resp.header(CRLF_HEADER_NAME) {
                    findings.push(Finding {
                        module_name: self.name().to_string(),
                        vuln_type: "CRLF Injection / HTTP Header Injection".to_string(),
                        severity: Severity::High,
                        cvss_score: 6.1,
                        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string(),
                        owasp_category: "A03".to_string(),
                        cwe_id: "CWE-113".to_string(),
                        affected_url: page.url.clone(),
                        affected_parameter: Some(param.clone()),
                        description: format!(
                            "Parameter '{param}' is vulnerable to CRLF injection. The injected \
                             header '{CRLF_HEADER_NAME}: {CRLF_HEADER_VALUE}' appeared in the \
                             HTTP response headers."
                        ),
                        remediation: "Strip or encode CR and LF characters before including user \
                                      input in HTTP response headers. Use framework-provided \
                                      header APIs."
                            .to_string(),
                        confidence: Confidence::Confirmed,
                        evidence: vec![
                            Evidence::payload("CRLF Payload", format!("{payload:?}")),
                            Evidence::request("Test URL", test_url),
                            Evidence::response(
                                "Injected Header",
                                format!("{CRLF_HEADER_NAME}: {value}"),
                            ),
                        ],
                    });
                    return Ok(findings);
                }

                if BODY_INJECTION.is_match(&resp.body) {
                    findings.push(Finding {
                        module_name: self.name().to_string(),
                        vuln_type: "HTTP Response Splitting".to_string(),
                        severity: Severity::High,
                        cvss_score: 6.1,
                        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string(),
                        owasp_category: "A03".to_string(),
                        cwe_id: "CWE-113".to_string(),
                        affected_url: page.url.clone(),
                        affected_parameter: Some(param.clone()),
                        description: format!(
                            "Parameter '{param}' is vulnerable to HTTP response splitting; \
                             injected markup reached the response body through CRLF sequences."
                        ),
                        remediation: "Sanitize CRLF sequences in all user-supplied data \
                                      reflected in HTTP responses."
                            .to_string(),
                        confidence: Confidence::Firm,
                        evidence: vec![
                            Evidence::payload("CRLF Payload", format!("{payload:?}")),
                            Evidence::response("Injected Content", "Injected HTML in body"),
                        ],
                    });
                    return Ok(findings);
                }
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_set_covers_encodings_and_splitting() {
        let joined = CRLF_PAYLOADS.join("|");
        assert!(joined.contains("%0d%0a"));
        assert!(joined.contains("%0D%0A"));
        assert!(joined.contains("%E5%98%8D%E5%98%8A"));
        assert!(joined.contains("<html>injected</html>"));
        assert!(CRLF_PAYLOADS.iter().any(|p| p.starts_with("\r\n")));
    }

    #[test]
    fn body_sentinel_is_case_insensitive() {
        assert!(BODY_INJECTION.is_match("<HTML>Injected</HTML>"));
    }
}
