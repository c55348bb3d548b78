use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

struct FlagCheck {
    flag: &'static str,
    vuln_type: &'static str,
    cwe_id: &'static str,
    cvss_vector: &'static str,
    description: &'static str,
    remediation: &'static str,
}

const FLAG_CHECKS: &[FlagCheck] = &[
    FlagCheck {
        flag: "httponly",
        vuln_type: "Cookie Missing HttpOnly Flag",
        cwe_id: "CWE-1004",
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        description: "is missing the HttpOnly flag, making it accessible to JavaScript",
        remediation: "Add the HttpOnly flag to prevent client-side script access.",
    },
    FlagCheck {
        flag: "secure",
        vuln_type: "Cookie Missing Secure Flag",
        cwe_id: "CWE-614",
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:N/A:N",
        description: "is missing the Secure flag, allowing transmission over HTTP",
        remediation: "Add the Secure flag so the cookie is only sent over HTTPS.",
    },
    FlagCheck {
        flag: "samesite",
        vuln_type: "Cookie Missing SameSite Attribute",
        cwe_id: "CWE-1275",
        cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:N/I:L/A:N",
        description: "is missing the SameSite attribute",
        remediation: "Add 'SameSite=Lax' or 'SameSite=Strict' attribute.",
    },
];

/// Audits every Set-Cookie header for the three hardening attributes.
pub struct CookieSecurity;

#[async_trait]
impl ScanModule for CookieSecurity {
    fn name(&self) -> &'static str {
        "cookie_security"
    }

    fn description(&self) -> &'static str {
        "Checks for insecure cookie attributes"
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for cookie in page.header_values("set-cookie") {
            let cookie_name = cookie
                .split(';')
                .next()
                .and_then(|pair| pair.split('=').next())
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("unknown")
                .to_string();
            let flags = cookie.to_ascii_lowercase();

            for check in FLAG_CHECKS {
                if flags.contains(check.flag) {
                    continue;
                }
                findings.push(Finding {
                    module_name: self.name().to_string(),
                    vuln_type: check.vuln_type.to_string(),
                    severity: Severity::Low,
                    cvss_score: 3.1,
                    cvss_vector: check.cvss_vector.to_string(),
                    owasp_category: "A05".to_string(),
                    cwe_id: check.cwe_id.to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: Some(cookie_name.clone()),
                    description: format!("Cookie '{cookie_name}' {}.", check.description),
                    remediation: check.remediation.to_string(),
                    confidence: Confidence::Confirmed,
                    evidence: vec![Evidence::response("Set-Cookie Header", cookie.clone())],
                });
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    fn page_with_cookies(cookies: &[&str]) -> CrawledPage {
        let mut headers = HeaderMap::new();
        for c in cookies {
            headers.append(SET_COOKIE, HeaderValue::from_str(c).unwrap());
        }
        CrawledPage {
            url: "https://example.com/".to_string(),
            status_code: 200,
            headers,
            body: String::new(),
            forms: vec![],
            links: vec![],
        }
    }

    #[tokio::test]
    async fn bare_cookie_gets_three_findings() {
        let page = page_with_cookies(&["session=abc123"]);
        let findings = CookieSecurity.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 3);
        assert!(findings
            .iter()
            .all(|f| f.affected_parameter.as_deref() == Some("session")));
    }

    #[tokio::test]
    async fn hardened_cookie_passes() {
        let page = page_with_cookies(&["session=abc; HttpOnly; Secure; SameSite=Lax"]);
        let findings = CookieSecurity.passive(&page).await.unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn each_cookie_audited_separately() {
        let page = page_with_cookies(&[
            "a=1; HttpOnly; Secure; SameSite=Strict",
            "b=2; Secure; SameSite=Strict",
        ]);
        let findings = CookieSecurity.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "Cookie Missing HttpOnly Flag");
        assert_eq!(findings[0].affected_parameter.as_deref(), Some("b"));
    }
}
