use async_trait::async_trait;
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

const SENSITIVE_PATH_KEYWORDS: &[&str] = &[
    "/admin",
    "/administrator",
    "/wp-admin",
    "/phpmyadmin",
    "/backup",
    "/db",
    "/database",
    "/config",
    "/conf",
    "/api/",
    "/internal",
    "/private",
    "/secret",
    "/debug",
];

/// Fetches robots.txt and reports Disallow entries that advertise sensitive
/// paths.
pub struct RobotsTxt;

#[async_trait]
impl ScanModule for RobotsTxt {
    fn name(&self) -> &'static str {
        "robots_txt"
    }

    fn description(&self) -> &'static str {
        "Analyzes robots.txt for sensitive path disclosure"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let robots_url = match Url::parse(&page.url).and_then(|u| u.join("/robots.txt")) {
            Ok(u) => u.to_string(),
            Err(_) => return Ok(Vec::new()),
        };

        let resp = match http.get(&robots_url).await {
            Ok(r) => r,
            Err(_) => return Ok(Vec::new()),
        };
        if resp.status != 200 {
            return Ok(Vec::new());
        }

        let disallowed: Vec<String> = resp
            .body
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let rest = line
                    .get(..9)
                    .filter(|prefix| prefix.eq_ignore_ascii_case("disallow:"))
                    .map(|_| line[9..].trim())?;
                (!rest.is_empty()).then(|| rest.to_string())
            })
            .collect();

        let sensitive: Vec<String> = disallowed
            .into_iter()
            .filter(|path| {
                let lower = path.to_ascii_lowercase();
                SENSITIVE_PATH_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .collect();

        if sensitive.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Finding {
            module_name: self.name().to_string(),
            vuln_type: "Sensitive Path Disclosure in robots.txt".to_string(),
            severity: Severity::Info,
            cvss_score: 0.0,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N".to_string(),
            owasp_category: "A01".to_string(),
            cwe_id: "CWE-200".to_string(),
            affected_url: robots_url,
            affected_parameter: None,
            description: format!(
                "robots.txt discloses {} potentially sensitive path(s).",
                sensitive.len()
            ),
            remediation: "Avoid listing sensitive paths in robots.txt. Use authentication and \
                          access control instead."
                .to_string(),
            confidence: Confidence::Firm,
            evidence: vec![Evidence::response(
                "Sensitive Disallow Entries",
                sensitive
                    .iter()
                    .map(|p| format!("Disallow: {p}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )],
        }])
    }
}
