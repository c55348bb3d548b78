use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{excerpt, form_fields, query_pairs, submit_form, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Marker echoed by a shell if the injected command runs.
pub const CMD_CANARY: &str = "scntm_cmd_7x9z";

const OUTPUT_PAYLOADS: &[&str] = &[
    "; echo scntm_cmd_7x9z",
    "| echo scntm_cmd_7x9z",
    "& echo scntm_cmd_7x9z",
    "`echo scntm_cmd_7x9z`",
    "$(echo scntm_cmd_7x9z)",
    "; echo scntm_cmd_7x9z #",
    "|| echo scntm_cmd_7x9z",
    "&& echo scntm_cmd_7x9z",
    "& echo scntm_cmd_7x9z &",
    "| type C:\\windows\\win.ini",
];

const TIME_PAYLOADS: &[(&str, u64)] = &[
    ("; sleep 5", 5),
    ("| sleep 5", 5),
    ("`sleep 5`", 5),
    ("$(sleep 5)", 5),
    ("& ping -n 6 127.0.0.1", 5),
    ("; sleep 5 #", 5),
];

static WINDOWS_INDICATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[extensions\]|for 16-bit app support").expect("regex"));

const VECTOR: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H";

fn command_finding(vuln_type: &str, url: &str, param: &str) -> Finding {
    Finding {
        module_name: "command_injection".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::Critical,
        cvss_score: 9.8,
        cvss_vector: VECTOR.to_string(),
        owasp_category: "A03".to_string(),
        cwe_id: "CWE-78".to_string(),
        affected_url: url.to_string(),
        affected_parameter: Some(param.to_string()),
        description: String::new(),
        remediation: "Never pass user input to shell commands. Use language APIs instead of \
                      shell calls; if a shell is unavoidable, apply allowlist validation and \
                      strict escaping."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence: vec![],
    }
}

/// OS command injection: canary-echo payloads first, then time-based blind
/// probes as a fallback.
pub struct CommandInjection;

#[async_trait]
impl ScanModule for CommandInjection {
    fn name(&self) -> &'static str {
        "command_injection"
    }

    fn description(&self) -> &'static str {
        "Tests for OS command injection vulnerabilities"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for (param, _) in query_pairs(&page.url) {
            if let Some(finding) = self.test_query_param(page, &param, http).await {
                findings.push(finding);
            }
        }

        for form in &page.forms {
            for input in &form.inputs {
                if input.name.is_empty() {
                    continue;
                }
                if let Some(finding) = self.test_form_input(form, &input.name, http).await {
                    findings.push(finding);
                    break;
                }
            }
        }

        Ok(findings)
    }
}

impl CommandInjection {
    async fn test_query_param(
        &self,
        page: &CrawledPage,
        param: &str,
        http: &HttpClient,
    ) -> Option<Finding> {
        for payload in OUTPUT_PAYLOADS {
            let test_url = with_query_param(&page.url, param, &format!("test{payload}"))?;
            let resp = match http.get(&test_url).await {
                Ok(r) => r,
                Err(_) => continue,
            };

            if resp.body.contains(CMD_CANARY) {
                let mut finding = command_finding("OS Command Injection", &page.url, param);
                finding.description = format!(
                    "Parameter '{param}' is vulnerable to OS command injection. The command \
                     output canary '{CMD_CANARY}' appeared in the response."
                );
                finding.evidence = vec![
                    Evidence::payload("Command Injection Payload", *payload),
                    Evidence::request("Test URL", test_url),
                    Evidence::response("Command Output", excerpt(&resp.body, CMD_CANARY, 80)),
                ];
                return Some(finding);
            }

            if WINDOWS_INDICATOR.is_match(&resp.body) {
                let mut finding =
                    command_finding("OS Command Injection (Windows)", &page.url, param);
                finding.description = format!(
                    "Parameter '{param}' is vulnerable to Windows command injection; win.ini \
                     content was disclosed."
                );
                finding.evidence = vec![
                    Evidence::payload("Payload", *payload),
                    Evidence::response("win.ini Content", "Windows file content in response"),
                ];
                return Some(finding);
            }
        }

        for (payload, expected_delay) in TIME_PAYLOADS {
            let test_url = with_query_param(&page.url, param, &format!("test{payload}"))?;
            let start = Instant::now();
            if http.get(&test_url).await.is_err() {
                continue;
            }
            let elapsed = start.elapsed().as_secs_f64();

            if elapsed >= (*expected_delay as f64) - 1.0 {
                let mut finding = command_finding(
                    "OS Command Injection - Blind (Time-Based)",
                    &page.url,
                    param,
                );
                finding.confidence = Confidence::Firm;
                finding.description = format!(
                    "Blind command injection in '{param}': response delayed by {elapsed:.1}s \
                     after an injected sleep."
                );
                finding.evidence = vec![
                    Evidence::payload("Time Payload", *payload),
                    Evidence::log(
                        "Response Delay",
                        format!("{elapsed:.2}s (expected {expected_delay}s)"),
                    ),
                ];
                return Some(finding);
            }
        }

        None
    }

    async fn test_form_input(
        &self,
        form: &crate::crawler::Form,
        input_name: &str,
        http: &HttpClient,
    ) -> Option<Finding> {
        for payload in &OUTPUT_PAYLOADS[..4] {
            let fields = form_fields(form, input_name, &format!("test{payload}"));
            let resp = match submit_form(http, form, &fields).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            if resp.body.contains(CMD_CANARY) {
                let mut finding =
                    command_finding("OS Command Injection (Form)", &form.action, input_name);
                finding.description = format!(
                    "Form field '{input_name}' is vulnerable to OS command injection."
                );
                finding.evidence = vec![
                    Evidence::payload("Payload", *payload),
                    Evidence::response("Command Output", excerpt(&resp.body, CMD_CANARY, 80)),
                ];
                return Some(finding);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_echo_the_canary() {
        for payload in &OUTPUT_PAYLOADS[..9] {
            assert!(payload.contains(CMD_CANARY) || payload.contains("win.ini"));
        }
    }

    #[test]
    fn windows_indicator_matches_win_ini() {
        assert!(WINDOWS_INDICATOR.is_match("; for 16-bit app support"));
        assert!(WINDOWS_INDICATOR.is_match("[extensions]"));
        assert!(!WINDOWS_INDICATOR.is_match("plain body"));
    }
}
