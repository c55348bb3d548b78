use async_trait::async_trait;
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

const SENSITIVE_PATHS: &[(&str, &str)] = &[
    ("/.env", "Environment Configuration File"),
    ("/.git/config", "Git Configuration"),
    ("/.git/HEAD", "Git HEAD Reference"),
    ("/wp-config.php", "WordPress Configuration"),
    ("/config.php", "PHP Configuration"),
    ("/web.config", "IIS Configuration"),
    ("/.htaccess", "Apache Configuration"),
    ("/package.json", "Node.js Package Manifest"),
    ("/composer.json", "PHP Composer Manifest"),
    ("/Gemfile", "Ruby Gemfile"),
    ("/.dockerenv", "Docker Environment"),
    ("/docker-compose.yml", "Docker Compose File"),
    ("/.aws/credentials", "AWS Credentials"),
    ("/phpinfo.php", "PHP Info Page"),
    ("/server-status", "Apache Server Status"),
    ("/elmah.axd", ".NET Error Log"),
    ("/.DS_Store", "macOS Directory Store"),
    ("/crossdomain.xml", "Flash Cross-Domain Policy"),
    ("/sitemap.xml", "Sitemap (Info Disclosure)"),
    ("/debug/", "Debug Endpoint"),
];

/// Where a 200 alone would be too noisy, the body must also carry one of
/// these markers.
const CONTENT_INDICATORS: &[(&str, &[&str])] = &[
    ("/.env", &["DB_PASSWORD", "APP_KEY", "SECRET", "DATABASE_URL"]),
    ("/.git/config", &["[core]", "[remote", "repositoryformatversion"]),
    ("/.git/HEAD", &["ref: refs/heads/"]),
    ("/phpinfo.php", &["phpinfo()", "PHP Version"]),
    ("/server-status", &["Apache Server Status", "Total accesses"]),
];

const CREDENTIAL_PATHS: &[&str] = &["/.env", "/.git/config", "/.aws/credentials", "/wp-config.php"];

/// Probes an enumerated list of files that should never be reachable on a
/// production origin.
pub struct SensitiveFiles;

#[async_trait]
impl ScanModule for SensitiveFiles {
    fn name(&self) -> &'static str {
        "sensitive_files"
    }

    fn description(&self) -> &'static str {
        "Checks for exposed sensitive files and configuration"
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

        for (path, description) in SENSITIVE_PATHS {
            let test_url = match base.join(path) {
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

            if let Some((_, indicators)) =
                CONTENT_INDICATORS.iter().find(|(p, _)| p == path)
            {
                if !indicators.iter().any(|ind| resp.body.contains(ind)) {
                    continue;
                }
            }

            let credential_bearing = CREDENTIAL_PATHS.contains(path);
            let (score, vector) = if credential_bearing {
                (7.5, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N")
            } else {
                (5.3, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N")
            };

            findings.push(Finding {
                module_name: self.name().to_string(),
                vuln_type: format!("Exposed Sensitive File: {description}"),
                severity: Severity::from_score(score),
                cvss_score: score,
                cvss_vector: vector.to_string(),
                owasp_category: "A05".to_string(),
                cwe_id: "CWE-538".to_string(),
                affected_url: test_url,
                affected_parameter: None,
                description: format!("Sensitive file '{path}' is publicly accessible."),
                remediation: format!(
                    "Block access to '{path}' in the web server configuration and remove \
                     sensitive files from the web root."
                ),
                confidence: Confidence::Confirmed,
                evidence: vec![Evidence::response(
                    "Response Preview",
                    resp.body.chars().take(500).collect::<String>(),
                )],
            });
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_paths_score_high() {
        for path in CREDENTIAL_PATHS {
            assert!(SENSITIVE_PATHS.iter().any(|(p, _)| p == path));
        }
    }

    #[test]
    fn indicator_gated_paths_exist_in_main_table() {
        for (path, indicators) in CONTENT_INDICATORS {
            assert!(SENSITIVE_PATHS.iter().any(|(p, _)| p == path));
            assert!(!indicators.is_empty());
        }
    }
}
