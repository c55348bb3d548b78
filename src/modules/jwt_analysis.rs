use std::collections::HashSet;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

static JWT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").expect("regex"));

/// Secrets seen over and over in leaked configurations; enough to prove a
/// token is forgeable without anything resembling a real brute force.
const COMMON_SECRETS: &[&str] = &[
    "secret",
    "your-256-bit-secret",
    "secretkey",
    "secret123",
    "password",
    "123456",
    "jwt-secret",
    "changeme",
    "test",
    "admin",
];

fn decode_segment(segment: &str) -> Option<serde_json::Value> {
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn crack_hs256(token: &str) -> Option<&'static str> {
    let mut parts = token.split('.');
    let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
    let message = format!("{header}.{payload}");

    for secret in COMMON_SECRETS.iter().copied() {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(message.as_bytes());
        let computed = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        if computed == signature {
            return Some(secret);
        }
    }
    None
}

/// Inspects JWTs found in response bodies and headers: `alg: none`, weak
/// symmetric algorithms, and signatures verifiable with well-known secrets.
pub struct JwtAnalysis;

#[async_trait]
impl ScanModule for JwtAnalysis {
    fn name(&self) -> &'static str {
        "jwt_analysis"
    }

    fn description(&self) -> &'static str {
        "Analyzes JWT tokens found in responses for weaknesses"
    }

    async fn passive(&self, page: &CrawledPage) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let mut haystack = page.body.clone();
        haystack.push('\n');
        haystack.push_str(&page.headers_text());

        let tokens: HashSet<&str> = JWT_PATTERN
            .find_iter(&haystack)
            .map(|m| m.as_str())
            .collect();

        for token in tokens {
            let header = match token.split('.').next().and_then(decode_segment) {
                Some(h) => h,
                None => continue,
            };
            let alg = header
                .get("alg")
                .and_then(|a| a.as_str())
                .unwrap_or("")
                .to_string();
            let header_pretty =
                serde_json::to_string_pretty(&header).unwrap_or_else(|_| header.to_string());

            if alg.eq_ignore_ascii_case("none") {
                findings.push(Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "JWT Algorithm None".to_string(),
                    severity: Severity::Critical,
                    cvss_score: 9.8,
                    cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H".to_string(),
                    owasp_category: "A02".to_string(),
                    cwe_id: "CWE-327".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: None,
                    description: "A JWT token uses the 'none' algorithm, allowing signature \
                                  bypass."
                        .to_string(),
                    remediation: "Enforce a strong algorithm (RS256 or ES256) and reject the \
                                  'none' algorithm."
                        .to_string(),
                    confidence: Confidence::Confirmed,
                    evidence: vec![Evidence::payload("JWT Header", header_pretty.clone())],
                });
                continue;
            }

            if alg == "HS256" {
                if let Some(secret) = crack_hs256(token) {
                    findings.push(Finding {
                        module_name: self.name().to_string(),
                        vuln_type: "JWT Weak Secret".to_string(),
                        severity: Severity::Critical,
                        cvss_score: 9.8,
                        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H".to_string(),
                        owasp_category: "A02".to_string(),
                        cwe_id: "CWE-321".to_string(),
                        affected_url: page.url.clone(),
                        affected_parameter: None,
                        description: format!(
                            "A JWT token is signed with the well-known secret '{secret}', \
                             allowing attackers to forge arbitrary tokens."
                        ),
                        remediation: "Sign tokens with a long random secret or switch to an \
                                      asymmetric algorithm (RS256, ES256)."
                            .to_string(),
                        confidence: Confidence::Confirmed,
                        evidence: vec![
                            Evidence::payload("JWT Header", header_pretty.clone()),
                            Evidence::log("Recovered Secret", secret),
                        ],
                    });
                    continue;
                }

                findings.push(Finding {
                    module_name: self.name().to_string(),
                    vuln_type: "JWT Weak Algorithm (HS256)".to_string(),
                    severity: Severity::Low,
                    cvss_score: 3.7,
                    cvss_vector: "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:L/I:N/A:N".to_string(),
                    owasp_category: "A02".to_string(),
                    cwe_id: "CWE-327".to_string(),
                    affected_url: page.url.clone(),
                    affected_parameter: None,
                    description: "A JWT token uses HS256 (symmetric). Consider RS256/ES256 for \
                                  better security."
                        .to_string(),
                    remediation: "Use asymmetric algorithms (RS256, ES256) for JWT signing."
                        .to_string(),
                    confidence: Confidence::Tentative,
                    evidence: vec![Evidence::payload("JWT Header", header_pretty)],
                });
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn page_with_body(body: &str) -> CrawledPage {
        CrawledPage {
            url: "https://example.com/".to_string(),
            status_code: 200,
            headers: HeaderMap::new(),
            body: body.to_string(),
            forms: vec![],
            links: vec![],
        }
    }

    fn forge(header: &str, payload: &str, secret: &str) -> String {
        let h = URL_SAFE_NO_PAD.encode(header);
        let p = URL_SAFE_NO_PAD.encode(payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{h}.{p}").as_bytes());
        let s = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{h}.{p}.{s}")
    }

    #[tokio::test]
    async fn alg_none_is_critical() {
        // Header/payload must both start with '{"' so base64url begins with eyJ.
        let h = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let p = URL_SAFE_NO_PAD.encode(r#"{"sub":"1"}"#);
        let token = format!("{h}.{p}.sig");
        let page = page_with_body(&format!("token={token}"));

        let findings = JwtAnalysis.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "JWT Algorithm None");
        assert_eq!(findings[0].cvss_score, 9.8);
    }

    #[tokio::test]
    async fn weak_secret_cracked() {
        let token = forge(r#"{"alg":"HS256","typ":"JWT"}"#, r#"{"sub":"1"}"#, "secret");
        let page = page_with_body(&format!("{{\"access_token\":\"{token}\"}}"));

        let findings = JwtAnalysis.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "JWT Weak Secret");
        assert_eq!(findings[0].confidence, Confidence::Confirmed);
    }

    #[tokio::test]
    async fn hs256_with_strong_secret_is_tentative_low() {
        let token = forge(
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":"1"}"#,
            "kYv8#2qPz!mW9xLr@4tN",
        );
        let page = page_with_body(&token);

        let findings = JwtAnalysis.passive(&page).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_type, "JWT Weak Algorithm (HS256)");
        assert_eq!(findings[0].confidence, Confidence::Tentative);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn body_without_tokens_is_clean() {
        let page = page_with_body("<html>hello</html>");
        assert!(JwtAnalysis.passive(&page).await.unwrap().is_empty());
    }
}
