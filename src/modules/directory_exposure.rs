use async_trait::async_trait;
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

const DIRECTORY_INDICATORS: &[&str] = &[
    "Index of /",
    "Directory listing for",
    "<title>Directory listing",
    "Parent Directory</a>",
];

const COMMON_DIRS: &[&str] = &[
    "/backup/", "/backups/", "/tmp/", "/temp/", "/uploads/", "/logs/", "/log/", "/.git/",
    "/.svn/", "/.env", "/config/", "/conf/", "/debug/",
];

fn listing_indicator(body: &str) -> Option<&'static str> {
    let lower = body.to_ascii_lowercase();
    DIRECTORY_INDICATORS
        .iter()
        .find(|ind| lower.contains(&ind.to_ascii_lowercase()))
        .copied()
}

fn listing_finding(vuln_type: &str, url: &str, description: String, evidence: Vec<Evidence>) -> Finding {
    Finding {
        module_name: "directory_exposure".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::Medium,
        cvss_score: 5.3,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
        owasp_category: "A05".to_string(),
        cwe_id: "CWE-548".to_string(),
        affected_url: url.to_string(),
        affected_parameter: None,
        description,
        remediation: "Disable directory listing in the web server configuration and restrict \
                      access to sensitive directories."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence,
    }
}

/// Passive directory-listing detection on crawled pages plus active probes
/// of commonly exposed directories on the page origin.
pub struct DirectoryExposure;

#[async_trait]
impl ScanModule for DirectoryExposure {
    fn name(&self) -> &'static str {
        "directory_exposure"
    }

    fn description(&self) -> &'static str {
        "Checks for directory listing and exposed directories"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        Ok(match listing_indicator(&page.body) {
            Some(indicator) => vec![listing_finding(
                "Directory Listing Enabled",
                &page.url,
                "Directory listing is enabled, exposing file structure to attackers.".to_string(),
                vec![Evidence::response("Directory Listing Indicator", indicator)],
            )],
            None => Vec::new(),
        })
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let base = match Url::parse(&page.url) {
            Ok(u) => u,
            Err(_) => return Ok(findings),
        };

        for dir in COMMON_DIRS {
            let test_url = match base.join(dir) {
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
            if listing_indicator(&resp.body).is_some() {
                findings.push(listing_finding(
                    "Exposed Directory",
                    &test_url,
                    format!("Directory listing accessible at {dir}."),
                    vec![Evidence::request("Test URL", test_url.clone())],
                ));
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicators_match_case_insensitively() {
        assert!(listing_indicator("<title>Index of /backup</title>").is_some());
        assert!(listing_indicator("<title>directory LISTING for /tmp</title>").is_some());
        assert!(listing_indicator("<html>welcome</html>").is_none());
    }
}
