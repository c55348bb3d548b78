use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Guessable-identifier shapes: numeric path segments and well-known id
/// query parameters.
static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/(\d{1,8})(?:/|$|\?)",
        r"[?&]id=(\d+)",
        r"[?&]user_id=(\d+)",
        r"[?&]account=(\d+)",
        r"[?&]order=(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("regex"))
    .collect()
});

/// Increments guessable IDs and compares responses: a substantial,
/// different 200 response for the neighboring ID suggests missing object
/// authorization.
pub struct Idor;

#[async_trait]
impl ScanModule for Idor {
    fn name(&self) -> &'static str {
        "idor"
    }

    fn description(&self) -> &'static str {
        "Tests for Insecure Direct Object References"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let url = &page.url;

        for pattern in ID_PATTERNS.iter() {
            let capture = match pattern.captures(url).and_then(|c| c.get(1)) {
                Some(m) => m,
                None => continue,
            };
            let original_id: u64 = match capture.as_str().parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let test_id = (original_id + 1).to_string();
            let test_url = format!(
                "{}{}{}",
                &url[..capture.start()],
                test_id,
                &url[capture.end()..]
            );

            let (original, modified) = match (http.get(url).await, http.get(&test_url).await) {
                (Ok(o), Ok(m)) => (o, m),
                _ => continue,
            };

            if original.status == 200
                && modified.status == 200
                && modified.body.len() > 100
                && modified.body != original.body
            {
                return Ok(vec![Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "Potential IDOR".to_string(),
                    severity: Severity::High,
                    cvss_score: 6.5,
                    cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:L/UI:N/S:U/C:H/I:N/A:N".to_string(),
                    owasp_category: "A01".to_string(),
                    cwe_id: "CWE-639".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: None,
                    description: format!(
                        "Incrementing the numeric identifier ({original_id} -> {test_id}) \
                         returns different content, suggesting missing object-level \
                         authorization."
                    ),
                    remediation: "Enforce authorization checks on every object access. Prefer \
                                  unpredictable identifiers (UUIDs)."
                        .to_string(),
                    confidence: Confidence::Tentative,
                    evidence: vec![
                        Evidence::request("Original URL", url.clone()),
                        Evidence::request("Manipulated URL", test_url),
                        Evidence::log(
                            "Response Sizes",
                            format!(
                                "original: {} bytes\nmodified: {} bytes",
                                original.body.len(),
                                modified.body.len()
                            ),
                        ),
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
    fn id_patterns_capture_the_identifier() {
        let url = "https://example.com/orders/1042";
        let m = ID_PATTERNS
            .iter()
            .find_map(|p| p.captures(url))
            .and_then(|c| c.get(1).map(|g| g.as_str().to_string()));
        assert_eq!(m.as_deref(), Some("1042"));

        let url = "https://example.com/profile?user_id=7";
        assert!(ID_PATTERNS.iter().any(|p| p.is_match(url)));

        let url = "https://example.com/about";
        assert!(!ID_PATTERNS.iter().any(|p| p.is_match(url)));
    }
}
