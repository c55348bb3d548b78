use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

struct HeaderPolicy {
    name: &'static str,
    cvss_score: f64,
    cvss_vector: &'static str,
    cwe_id: &'static str,
    remediation: &'static str,
}

const RECOMMENDED_HEADERS: &[HeaderPolicy] = &[
    HeaderPolicy {
        name: "Strict-Transport-Security",
        cvss_score: 5.4,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N",
        cwe_id: "CWE-523",
        remediation: "Add 'Strict-Transport-Security: max-age=31536000; includeSubDomains' header.",
    },
    HeaderPolicy {
        name: "X-Content-Type-Options",
        cvss_score: 3.1,
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        cwe_id: "CWE-16",
        remediation: "Add 'X-Content-Type-Options: nosniff' header.",
    },
    HeaderPolicy {
        name: "X-Frame-Options",
        cvss_score: 4.3,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:N/I:L/A:N",
        cwe_id: "CWE-1021",
        remediation: "Add 'X-Frame-Options: DENY' or 'SAMEORIGIN' header.",
    },
    HeaderPolicy {
        name: "Content-Security-Policy",
        cvss_score: 5.4,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N",
        cwe_id: "CWE-16",
        remediation: "Implement a Content-Security-Policy header with appropriate directives.",
    },
    HeaderPolicy {
        name: "X-XSS-Protection",
        cvss_score: 3.1,
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        cwe_id: "CWE-16",
        remediation: "Add 'X-XSS-Protection: 1; mode=block' header (or rely on CSP).",
    },
    HeaderPolicy {
        name: "Referrer-Policy",
        cvss_score: 3.1,
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        cwe_id: "CWE-116",
        remediation: "Add 'Referrer-Policy: strict-origin-when-cross-origin' header.",
    },
    HeaderPolicy {
        name: "Permissions-Policy",
        cvss_score: 3.1,
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        cwe_id: "CWE-16",
        remediation: "Add Permissions-Policy header to control browser features.",
    },
];

const INFO_DISCLOSURE_HEADERS: &[&str] = &["Server", "X-Powered-By", "X-AspNet-Version"];

/// Flags missing hardening headers and version-disclosing headers.
pub struct SecurityHeaders;

#[async_trait]
impl ScanModule for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn description(&self) -> &'static str {
        "Checks for missing or misconfigured security headers"
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for policy in RECOMMENDED_HEADERS {
            if page.header(policy.name).is_some() {
                continue;
            }
            findings.push(Finding {
                module_name: self.name().to_string(),
                vuln_type: format!("Missing Security Header: {}", policy.name),
                severity: Severity::from_score(policy.cvss_score),
                cvss_score: policy.cvss_score,
                cvss_vector: policy.cvss_vector.to_string(),
                owasp_category: "A05".to_string(),
                cwe_id: policy.cwe_id.to_string(),
                affected_url: page.url.clone(),
                affected_parameter: None,
                description: format!(
                    "The HTTP response is missing the '{}' security header.",
                    policy.name
                ),
                remediation: policy.remediation.to_string(),
                confidence: Confidence::Confirmed,
                evidence: vec![Evidence::response("Response Headers", page.headers_text())],
            });
        }

        for header in INFO_DISCLOSURE_HEADERS {
            let value = match page.header(header) {
                Some(v) => v.to_string(),
                None => continue,
            };
            findings.push(Finding {
                module_name: self.name().to_string(),
                vuln_type: format!("Information Disclosure: {header} Header"),
                severity: Severity::Info,
                cvss_score: 0.0,
                cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N".to_string(),
                owasp_category: "A05".to_string(),
                cwe_id: "CWE-200".to_string(),
                affected_url: page.url.clone(),
                affected_parameter: None,
                description: format!(
                    "The '{header}' header discloses server information: {value}"
                ),
                remediation: format!("Remove or suppress the '{header}' header in production."),
                confidence: Confidence::Confirmed,
                evidence: vec![Evidence::response(
                    format!("{header} Value"),
                    format!("{header}: {value}"),
                )],
            });
        }

        Ok(findings)
    }
}
