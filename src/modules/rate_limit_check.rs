use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const RATE_LIMIT_HEADERS: &[&str] = &[
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-rate-limit-limit",
    "ratelimit-limit",
    "retry-after",
];

/// Flags login pages that answer without any rate-limiting headers.
pub struct RateLimitCheck;

#[async_trait]
impl ScanModule for RateLimitCheck {
    fn name(&self) -> &'static str {
        "rate_limit_check"
    }

    fn description(&self) -> &'static str {
        "Checks whether authentication endpoints advertise rate limiting"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let resp = match http.get(&page.url).await {
            Ok(r) => r,
            Err(_) => return Ok(Vec::new()),
        };

        let has_rate_limit = RATE_LIMIT_HEADERS
            .iter()
            .any(|h| resp.header(h).is_some());
        if has_rate_limit {
            return Ok(Vec::new());
        }

        let has_login_form = page.forms.iter().any(|form| {
            form.method == "POST"
                && form
                    .inputs
                    .iter()
                    .any(|inp| inp.input_type == "password")
        });
        if !has_login_form {
            return Ok(Vec::new());
        }

        Ok(vec![Finding {
            module_name: self.name().to_string(),
            vuln_type: "Missing Rate Limiting on Authentication".to_string(),
            severity: Severity::Medium,
            cvss_score: 5.3,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
            owasp_category: "A07".to_string(),
            cwe_id: "CWE-307".to_string(),
            affected_url: page.url.clone(),
            affected_parameter: None,
            description: "No rate-limiting headers were observed on a page with an \
                          authentication form, which may allow credential brute-forcing."
                .to_string(),
            remediation: "Rate limit authentication endpoints. Add progressive delays and \
                          account lockout policies."
                .to_string(),
            confidence: Confidence::Tentative,
            evidence: vec![Evidence::response(
                "Response Headers (no rate limit headers found)",
                resp.headers_text(),
            )],
        }])
    }
}
