use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const CSRF_TOKEN_NAMES: &[&str] = &[
    "csrf_token",
    "csrfmiddlewaretoken",
    "_token",
    "authenticity_token",
    "csrf",
    "__requestverificationtoken",
    "antiforgery",
    "_csrf",
];

/// A POST form carrying none of the known anti-forgery token field names is
/// reported as unprotected.
pub struct Csrf;

#[async_trait]
impl ScanModule for Csrf {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn description(&self) -> &'static str {
        "Checks for missing CSRF protection on forms"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for form in &page.forms {
            if form.method != "POST" {
                continue;
            }

            let input_names: Vec<String> = form
                .inputs
                .iter()
                .map(|inp| inp.name.to_ascii_lowercase())
                .collect();
            let has_token = input_names
                .iter()
                .any(|name| CSRF_TOKEN_NAMES.contains(&name.as_str()));
            if has_token {
                continue;
            }

            findings.push(Finding {
                module_name: self.name().to_string(),
                vuln_type: "Missing CSRF Protection".to_string(),
                severity: Severity::Medium,
                cvss_score: 4.3,
                cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:N/I:L/A:N".to_string(),
                owasp_category: "A01".to_string(),
                cwe_id: "CWE-352".to_string(),
                affected_url: form.action.clone(),
                affected_parameter: None,
                description: format!("POST form at '{}' has no CSRF token.", form.action),
                remediation: "Add a CSRF token to all state-changing forms. Use SameSite cookie \
                              attribute as defense-in-depth."
                    .to_string(),
                confidence: Confidence::Firm,
                evidence: vec![Evidence::log(
                    "Form Details",
                    format!(
                        "Method: {}\nAction: {}\nInputs: {}",
                        form.method,
                        form.action,
                        input_names.join(", ")
                    ),
                )],
            });
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{Form, FormInput};
    use reqwest::header::HeaderMap;

    fn page_with_form(method: &str, input_names: &[&str]) -> CrawledPage {
        CrawledPage {
            url: "https://example.com/login".to_string(),
            status_code: 200,
            headers: HeaderMap::new(),
            body: String::new(),
            forms: vec![Form {
                action: "https://example.com/login".to_string(),
                method: method.to_string(),
                inputs: input_names
                    .iter()
                    .map(|n| FormInput {
                        name: n.to_string(),
                        input_type: "text".to_string(),
                        value: String::new(),
                    })
                    .collect(),
            }],
            links: vec![],
        }
    }

    #[tokio::test]
    async fn unprotected_post_form_flagged() {
        let page = page_with_form("POST", &["username", "password"]);
        let findings = Csrf.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::Firm);
    }

    #[tokio::test]
    async fn token_field_counts_as_protected() {
        let page = page_with_form("POST", &["username", "password", "csrf_token"]);
        assert!(Csrf.passive(&page).await.unwrap().is_empty());

        let page = page_with_form("POST", &["username", "_TOKEN"]);
        assert!(Csrf.passive(&page).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_forms_ignored() {
        let page = page_with_form("GET", &["q"]);
        assert!(Csrf.passive(&page).await.unwrap().is_empty());
    }
}
