use async_trait::async_trait;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{excerpt, form_fields, query_pairs, submit_form, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Template expressions paired with the output a vulnerable engine renders.
/// Covers Jinja2/Twig, Freemarker/Velocity/Mako, Smarty, and ERB syntax.
const SSTI_PROBES: &[(&str, &str)] = &[
    ("{{7*7}}", "49"),
    ("{{'7'*7}}", "7777777"),
    ("${7*7}", "49"),
    ("{7*7}", "49"),
    ("<%= 7*7 %>", "49"),
    ("{{ 7*7 }}", "49"),
    ("{{7*'7'}}", "7777777"),
];

fn evaluated(body: &str, probe: &str, expected: &str, baseline: &str) -> bool {
    body.contains(expected) && !body.contains(probe) && !baseline.contains(expected)
}

fn ssti_finding(url: &str, param: &str, probe: &str, expected: &str, body: &str) -> Finding {
    Finding {
        module_name: "ssti".to_string(),
        vuln_type: "Server-Side Template Injection (SSTI)".to_string(),
        severity: Severity::Critical,
        cvss_score: 9.8,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H".to_string(),
        owasp_category: "A03".to_string(),
        cwe_id: "CWE-94".to_string(),
        affected_url: url.to_string(),
        affected_parameter: Some(param.to_string()),
        description: format!(
            "Parameter '{param}' is vulnerable to SSTI. Template expression '{probe}' was \
             evaluated to '{expected}'."
        ),
        remediation: "Never pass user input directly into template engines. Use sandboxed \
                      template environments and validate all user input."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence: vec![
            Evidence::payload("SSTI Probe", format!("{probe} -> expected '{expected}'")),
            Evidence::response("Evaluated Output", excerpt(body, expected, 80)),
        ],
    }
}

/// Math-evaluation oracle for template injection: the rendered result must
/// appear, the raw expression must not, and the result must be absent from
/// the baseline response.
pub struct Ssti;

#[async_trait]
impl ScanModule for Ssti {
    fn name(&self) -> &'static str {
        "ssti"
    }

    fn description(&self) -> &'static str {
        "Tests for Server-Side Template Injection (SSTI)"
    }

    fn scan_modes(&self) -> &'static [ScanMode] {
        &[ScanMode::Full]
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let params = query_pairs(&page.url);
        if !params.is_empty() {
            let baseline = match http.get(&page.url).await {
                Ok(r) => r,
                Err(_) => return Ok(findings),
            };

            'params: for (param, _) in &params {
                for (probe, expected) in SSTI_PROBES {
                    let test_url = match with_query_param(&page.url, param, probe) {
                        Some(u) => u,
                        None => continue,
                    };
                    let resp = match http.get(&test_url).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                    if evaluated(&resp.body, probe, expected, &baseline.body) {
                        findings.push(ssti_finding(&page.url, param, probe, expected, &resp.body));
                        continue 'params;
                    }
                }
            }
        }

        for form in &page.forms {
            'inputs: for input in &form.inputs {
                if input.name.is_empty() {
                    continue;
                }
                for (probe, expected) in &SSTI_PROBES[..3] {
                    let fields = form_fields(form, &input.name, probe);
                    let resp = match submit_form(http, form, &fields).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                    if resp.body.contains(expected) && !resp.body.contains(probe) {
                        let mut finding =
                            ssti_finding(&form.action, &input.name, probe, expected, &resp.body);
                        finding.vuln_type =
                            "Server-Side Template Injection (SSTI) - Form".to_string();
                        findings.push(finding);
                        break 'inputs;
                    }
                }
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_requires_all_three_conditions() {
        // Result present, probe gone, baseline clean: vulnerable.
        assert!(evaluated("<p>49</p>", "{{7*7}}", "49", "<p>hello</p>"));
        // Raw probe echoed back: template not evaluated.
        assert!(!evaluated("<p>{{7*7}}</p>", "{{7*7}}", "49", "<p>hello</p>"));
        // Expected value already on the baseline page: no signal.
        assert!(!evaluated("<p>49</p>", "{{7*7}}", "49", "<p>49 items</p>"));
        // Result absent entirely.
        assert!(!evaluated("<p>nope</p>", "{{7*7}}", "49", "<p>hello</p>"));
    }

    #[test]
    fn string_multiplication_probes_present() {
        assert!(SSTI_PROBES
            .iter()
            .any(|(p, e)| *p == "{{'7'*7}}" && *e == "7777777"));
    }
}
