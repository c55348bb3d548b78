use async_trait::async_trait;
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const API_ENDPOINTS: &[&str] = &[
    "/api/",
    "/api/v1/",
    "/api/v2/",
    "/graphql",
    "/graphiql",
    "/swagger.json",
    "/openapi.json",
    "/api-docs",
    "/swagger-ui.html",
    "/_debug/",
    "/__debug__/",
];

const SPEC_ENDPOINTS: &[&str] = &["/swagger.json", "/openapi.json"];
const GRAPHQL_ENDPOINTS: &[&str] = &["/graphql", "/graphiql"];

/// Probes API documentation, GraphQL, and debug endpoints for exposure.
pub struct ApiMisconfig;

#[async_trait]
impl ScanModule for ApiMisconfig {
    fn name(&self) -> &'static str {
        "api_misconfig"
    }

    fn description(&self) -> &'static str {
        "Checks for API misconfigurations and exposed documentation"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let base = match Url::parse(&page.url) {
            Ok(u) => u,
            Err(_) => return Ok(findings),
        };

        for endpoint in API_ENDPOINTS {
            let test_url = match base.join(endpoint) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            let resp = match http.get(&test_url).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            if resp.status != 200 {
                continue;
            }

            if SPEC_ENDPOINTS.contains(endpoint) {
                if let Ok(spec) = serde_json::from_str::<serde_json::Value>(&resp.body) {
                    if spec.get("paths").is_some()
                        || spec.get("openapi").is_some()
                        || spec.get("swagger").is_some()
                    {
                        findings.push(Finding {
                            module_name: self.name().to_string(),
                            vuln_type: "Exposed API Documentation".to_string(),
                            severity: Severity::Medium,
                            cvss_score: 5.3,
                            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N"
                                .to_string(),
                            owasp_category: "A05".to_string(),
                            cwe_id: "CWE-200".to_string(),
                            affected_url: test_url.clone(),
                            affected_parameter: None,
                            description: format!(
                                "An API specification is exposed at '{endpoint}'. Attackers can \
                                 enumerate every endpoint."
                            ),
                            remediation: "Restrict API documentation to authenticated users in \
                                          production."
                                .to_string(),
                            confidence: Confidence::Confirmed,
                            evidence: vec![Evidence::response(
                                "API Spec Preview",
                                resp.body.chars().take(500).collect::<String>(),
                            )],
                        });
                    }
                }
            }

            if GRAPHQL_ENDPOINTS.contains(endpoint) {
                if let Some(finding) = self.check_introspection(&test_url, http).await {
                    findings.push(finding);
                }
            }

            if endpoint.contains("debug") {
                findings.push(Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "Debug Endpoint Exposed".to_string(),
                    severity: Severity::High,
                    cvss_score: 7.5,
                    cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N".to_string(),
                    owasp_category: "A05".to_string(),
                    cwe_id: "CWE-215".to_string(),
                    affected_url: test_url.clone(),
                    affected_parameter: None,
                    description: format!("Debug endpoint accessible at '{endpoint}'."),
                    remediation: "Disable debug endpoints in production environments.".to_string(),
                    confidence: Confidence::Firm,
                    evidence: vec![Evidence::response(
                        "Response Preview",
                        resp.body.chars().take(300).collect::<String>(),
                    )],
                });
            }
        }

        Ok(findings)
    }
}

impl ApiMisconfig {
    async fn check_introspection(&self, url: &str, http: &HttpClient) -> Option<Finding> {
        let resp = http
            .post_body(url, r#"{"query":"{__schema{types{name}}}"}"#, "application/json")
            .await
            .ok()?;
        if resp.status != 200 {
            return None;
        }
        let data: serde_json::Value = serde_json::from_str(&resp.body).ok()?;
        data.get("data")?.get("__schema")?;

        Some(Finding {
            module_name: self.name().to_string(),
            vuln_type: "GraphQL Introspection Enabled".to_string(),
            severity: Severity::Medium,
            cvss_score: 5.3,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
            owasp_category: "A05".to_string(),
            cwe_id: "CWE-200".to_string(),
            affected_url: url.to_string(),
            affected_parameter: None,
            description: "GraphQL introspection is enabled, exposing the full API schema."
                .to_string(),
            remediation: "Disable GraphQL introspection in production.".to_string(),
            confidence: Confidence::Confirmed,
            evidence: vec![Evidence::response(
                "Introspection Response",
                resp.body.chars().take(500).collect::<String>(),
            )],
        })
    }
}
