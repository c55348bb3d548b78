use async_trait::async_trait;
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const GRAPHQL_PATHS: &[&str] = &[
    "/graphql",
    "/graphiql",
    "/graphql/console",
    "/api/graphql",
    "/v1/graphql",
    "/v2/graphql",
    "/query",
    "/gql",
];

const INTROSPECTION_QUERY: &str =
    r#"{"query": "{ __schema { queryType { name } types { name } } }"}"#;

const BATCH_QUERY: &str = r#"[{"query":"{ __typename }"},{"query":"{ __typename }"},{"query":"{ __typename }"},{"query":"{ __typename }"},{"query":"{ __typename }"}]"#;

const IDE_PATHS: &[&str] = &["/graphiql", "/graphql/console", "/graphql/voyager"];

fn medium_finding(vuln_type: &str, url: &str, owasp: &str, cwe: &str) -> Finding {
    Finding {
        module_name: "graphql".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::Medium,
        cvss_score: 5.3,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
        owasp_category: owasp.to_string(),
        cwe_id: cwe.to_string(),
        affected_url: url.to_string(),
        affected_parameter: None,
        description: String::new(),
        remediation: String::new(),
        confidence: Confidence::Confirmed,
        evidence: vec![],
    }
}

/// Probes common GraphQL endpoints for enabled introspection, query
/// batching, and exposed IDEs.
pub struct GraphQl;

#[async_trait]
impl ScanModule for GraphQl {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn description(&self) -> &'static str {
        "Detects GraphQL endpoints with introspection and batching enabled"
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

        for path in GRAPHQL_PATHS {
            let endpoint = match base.join(path) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };

            let introspection = match self.test_introspection(&endpoint, http).await {
                Some(f) => f,
                None => continue,
            };
            findings.push(introspection);

            if let Some(batching) = self.test_batching(&endpoint, http).await {
                findings.push(batching);
            }
            if let Some(ide) = self.test_ide(&base, http).await {
                findings.push(ide);
            }

            // One confirmed endpoint per host covers the core checks.
            break;
        }

        Ok(findings)
    }
}

impl GraphQl {
    async fn test_introspection(&self, endpoint: &str, http: &HttpClient) -> Option<Finding> {
        let resp = http
            .post_body(endpoint, INTROSPECTION_QUERY, "application/json")
            .await
            .ok()?;
        if resp.status != 200 || !resp.body.contains("\"__schema\"") {
            return None;
        }

        let type_preview = serde_json::from_str::<serde_json::Value>(&resp.body)
            .ok()
            .and_then(|data| {
                let types = data.get("data")?.get("__schema")?.get("types")?.as_array()?.clone();
                Some(
                    types
                        .iter()
                        .take(5)
                        .filter_map(|t| t.get("name")?.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            })
            .unwrap_or_default();

        let mut finding = medium_finding("GraphQL Introspection Enabled", endpoint, "A05", "CWE-200");
        finding.description = "GraphQL introspection is enabled, exposing the full API schema. \
                               Attackers can enumerate all types, queries, mutations, and fields."
            .to_string();
        finding.remediation = "Disable introspection in production. Use field-level \
                               authorization and query depth limiting."
            .to_string();
        finding.evidence = vec![
            Evidence::request("Introspection Query", INTROSPECTION_QUERY),
            Evidence::response("Exposed Types", format!("Types found: {type_preview}...")),
        ];
        Some(finding)
    }

    async fn test_batching(&self, endpoint: &str, http: &HttpClient) -> Option<Finding> {
        let resp = http
            .post_body(endpoint, BATCH_QUERY, "application/json")
            .await
            .ok()?;
        if resp.status != 200 || !resp.body.contains("__typename") {
            return None;
        }

        let count = serde_json::from_str::<serde_json::Value>(&resp.body)
            .ok()
            .and_then(|v| v.as_array().map(|a| a.len()))
            .unwrap_or(0);
        if count < 3 {
            return None;
        }

        let mut finding =
            medium_finding("GraphQL Query Batching Enabled", endpoint, "A06", "CWE-770");
        finding.description = "GraphQL query batching is enabled. Attackers can send many \
                               queries in one request to bypass rate limits or amplify attacks."
            .to_string();
        finding.remediation = "Disable query batching or limit batch size. Implement query cost \
                               analysis."
            .to_string();
        finding.evidence = vec![Evidence::payload(
            "Batch Query",
            format!("Sent 5 queries, received {count} responses"),
        )];
        Some(finding)
    }

    async fn test_ide(&self, base: &Url, http: &HttpClient) -> Option<Finding> {
        for path in IDE_PATHS {
            let url = base.join(path).ok()?.to_string();
            let resp = match http.get(&url).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            let body_lower = resp.body.to_ascii_lowercase();
            if resp.status == 200
                && (body_lower.contains("graphiql")
                    || resp.body.contains("GraphQL IDE")
                    || body_lower.contains("voyager"))
            {
                let mut finding = medium_finding("GraphQL IDE Exposed", &url, "A05", "CWE-200");
                finding.description = "A GraphQL IDE (GraphiQL/Voyager) is publicly accessible, \
                                       letting attackers explore the API interactively."
                    .to_string();
                finding.remediation = "Disable the GraphQL IDE in production or restrict it to \
                                       authenticated internal users."
                    .to_string();
                finding.evidence = vec![Evidence::response(
                    "IDE Response",
                    format!("HTTP 200 at {url} with GraphQL IDE content"),
                )];
                return Some(finding);
            }
        }
        None
    }
}
