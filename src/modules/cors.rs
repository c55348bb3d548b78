use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::normalize::host_of;
use crate::scoring::cvss::Severity;

#[derive(Debug, Clone, Copy, PartialEq)]
enum OriginKind {
    /// Plainly attacker-owned origin.
    Attacker,
    /// The literal `null` origin (sandboxed iframes, file://).
    Null,
    /// Origins exploiting sloppy host validation: target host embedded in
    /// an attacker-registrable name, IP notations, userinfo tricks.
    Confusion,
}

fn probe_origins(target_host: &str) -> Vec<(String, OriginKind)> {
    let mut origins = vec![
        ("https://evil.com".to_string(), OriginKind::Attacker),
        ("http://evil.com".to_string(), OriginKind::Attacker),
        ("null".to_string(), OriginKind::Null),
    ];
    if !target_host.is_empty() {
        // Suffix/prefix confusion: a validator matching with contains() or
        // a loose regex accepts both.
        origins.push((
            format!("https://{target_host}.evil.com"),
            OriginKind::Confusion,
        ));
        origins.push((format!("https://evil{target_host}"), OriginKind::Confusion));
        // Userinfo confusion: everything before '@' is ignored by the URL
        // parser but not by naive string checks.
        origins.push((
            format!("https://{target_host}@evil.com"),
            OriginKind::Confusion,
        ));
    }
    // Alternative IP notations for loopback.
    origins.push(("https://0x7f000001".to_string(), OriginKind::Confusion));
    origins.push(("https://2130706433".to_string(), OriginKind::Confusion));
    origins.push(("https://0177.0.0.1".to_string(), OriginKind::Confusion));
    origins
}

/// Probes the CORS policy with attacker-shaped Origin headers and grades
/// the reflection rules, worst case first.
pub struct Cors;

#[async_trait]
impl ScanModule for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn description(&self) -> &'static str {
        "Tests for CORS misconfiguration"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let target_host = host_of(&page.url);

        for (origin, kind) in probe_origins(&target_host) {
            let resp = match http
                .get_with_headers(&page.url, &[("Origin".to_string(), origin.clone())])
                .await
            {
                Ok(r) => r,
                Err(_) => continue,
            };

            let acao = resp
                .header("access-control-allow-origin")
                .unwrap_or("")
                .to_string();
            let acac = resp
                .header("access-control-allow-credentials")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);

            let cors_headers = format!(
                "Access-Control-Allow-Origin: {acao}\nAccess-Control-Allow-Credentials: {acac}"
            );
            let evidence = vec![
                Evidence::request("Test Request", format!("Origin: {origin}")),
                Evidence::response("CORS Headers", cors_headers),
            ];

            let graded: Option<(&str, f64, &str)> = if acao == "*" && acac {
                Some((
                    "CORS Wildcard with Credentials",
                    8.1,
                    "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:H/I:H/A:N",
                ))
            } else if !acao.is_empty() && acao == origin && kind != OriginKind::Null {
                if acac {
                    Some((
                        "CORS Origin Reflection with Credentials",
                        9.1,
                        "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N",
                    ))
                } else if kind == OriginKind::Confusion {
                    Some((
                        "CORS Origin Validation Bypass",
                        8.1,
                        "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:H/I:H/A:N",
                    ))
                } else {
                    Some((
                        "CORS Origin Reflection",
                        5.4,
                        "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N",
                    ))
                }
            } else if acao == "null" {
                Some((
                    "CORS Null Origin Allowed",
                    5.4,
                    "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N",
                ))
            } else {
                None
            };

            if let Some((vuln_type, score, vector)) = graded {
                return Ok(vec![Finding {
                    module_name: self.name().to_string(),
                    vuln_type: vuln_type.to_string(),
                    severity: Severity::from_score(score),
                    cvss_score: score,
                    cvss_vector: vector.to_string(),
                    owasp_category: "A05".to_string(),
                    cwe_id: "CWE-942".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: None,
                    description: format!(
                        "The CORS policy responds to the attacker-controlled origin '{origin}' \
                         with '{acao}' (credentials: {acac})."
                    ),
                    remediation: "Validate origins against an exact-match allowlist. Never \
                                  reflect the request origin, and never combine wildcard or \
                                  reflected origins with credentials."
                        .to_string(),
                    confidence: Confidence::Confirmed,
                    evidence,
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
    fn origin_matrix_covers_confusion_classes() {
        let origins = probe_origins("example.com");
        let values: Vec<&str> = origins.iter().map(|(o, _)| o.as_str()).collect();
        assert!(values.contains(&"https://evil.com"));
        assert!(values.contains(&"null"));
        assert!(values.contains(&"https://example.com.evil.com"));
        assert!(values.contains(&"https://evilexample.com"));
        assert!(values.contains(&"https://example.com@evil.com"));
        assert!(values.contains(&"https://2130706433"));
    }
}
