use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::{form_fields, query_pairs, submit_form, with_query_param, ScanModule};
use crate::scoring::cvss::Severity;
use crate::store::ScanMode;

/// Parameters whose names suggest they hold file paths.
const FILE_PARAMS: &[&str] = &[
    "file", "path", "page", "template", "view", "doc", "document", "include", "dir", "folder",
    "name", "filename", "load", "read", "data", "content", "src", "source", "img", "image",
];

const TRAVERSAL_PAYLOADS: &[&str] = &[
    "../../../../etc/passwd",
    "..%2F..%2F..%2F..%2Fetc%2Fpasswd",
    "....//....//....//....//etc/passwd",
    "..%252F..%252F..%252F..%252Fetc%252Fpasswd",
    "%2e%2e%2f%2e%2e%2f%2e%2e%2f%2e%2e%2fetc%2fpasswd",
    "../../../../windows/win.ini",
    "..%2F..%2F..%2F..%2Fwindows%2Fwin.ini",
    "../../../../proc/self/environ",
    "/etc/passwd",
    "/etc/hosts",
];

static TRAVERSAL_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)root:.*:/bin/",
        r"(?i)\[extensions\]",
        r"(?i)for 16-bit app support",
        r"(?i)daemon:.*:/usr/sbin",
        r"(?i)HOME=/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("regex"))
    .collect()
});

fn indicator_match(body: &str) -> Option<&'static Regex> {
    TRAVERSAL_INDICATORS.iter().find(|re| re.is_match(body))
}

fn excerpt_match(body: &str, re: &Regex) -> String {
    match re.find(body) {
        Some(m) => {
            let mut start = m.start().saturating_sub(100);
            while !body.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = (m.end() + 100).min(body.len());
            while !body.is_char_boundary(end) {
                end += 1;
            }
            format!("...{}...", &body[start..end])
        }
        None => String::new(),
    }
}

fn traversal_finding(vuln_type: &str, url: &str, param: &str, payload: &str, body: &str, re: &Regex) -> Finding {
    Finding {
        module_name: "path_traversal".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::High,
        cvss_score: 7.5,
        cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N".to_string(),
        owasp_category: "A01".to_string(),
        cwe_id: "CWE-22".to_string(),
        affected_url: url.to_string(),
        affected_parameter: Some(param.to_string()),
        description: format!(
            "Parameter '{param}' is vulnerable to path traversal. Sensitive file content was \
             disclosed."
        ),
        remediation: "Validate and canonicalize file paths. Use an allowlist of permitted files. \
                      Never construct file paths from user input."
            .to_string(),
        confidence: Confidence::Confirmed,
        evidence: vec![
            Evidence::payload("Traversal Payload", payload),
            Evidence::response("File Content Match", excerpt_match(body, re)),
        ],
    }
}

/// Directory traversal probing on file-shaped parameters, confirmed by
/// well-known file content signatures.
pub struct PathTraversal;

#[async_trait]
impl ScanModule for PathTraversal {
    fn name(&self) -> &'static str {
        "path_traversal"
    }

    fn description(&self) -> &'static str {
        "Tests for path traversal vulnerabilities"
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
            if !FILE_PARAMS.contains(&param.to_ascii_lowercase().as_str()) {
                continue;
            }
            for payload in TRAVERSAL_PAYLOADS {
                let test_url = match with_query_param(&page.url, &param, payload) {
                    Some(u) => u,
                    None => continue,
                };
                let resp = match http.get(&test_url).await {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if let Some(re) = indicator_match(&resp.body) {
                    let mut finding = traversal_finding(
                        "Path Traversal",
                        &page.url,
                        &param,
                        payload,
                        &resp.body,
                        re,
                    );
                    finding
                        .evidence
                        .insert(1, Evidence::request("Test URL", test_url));
                    findings.push(finding);
                    return Ok(findings);
                }
            }
        }

        for form in &page.forms {
            for input in &form.inputs {
                if input.name.is_empty()
                    || !FILE_PARAMS.contains(&input.name.to_ascii_lowercase().as_str())
                {
                    continue;
                }
                for payload in &TRAVERSAL_PAYLOADS[..4] {
                    let fields = form_fields(form, &input.name, payload);
                    let resp = match submit_form(http, form, &fields).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                    if let Some(re) = indicator_match(&resp.body) {
                        findings.push(traversal_finding(
                            "Path Traversal (Form)",
                            &form.action,
                            &input.name,
                            payload,
                            &resp.body,
                            re,
                        ));
                        return Ok(findings);
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
    fn passwd_and_win_ini_signatures_match() {
        assert!(indicator_match("root:x:0:0:root:/root:/bin/bash").is_some());
        assert!(indicator_match("; for 16-bit app support\n[extensions]").is_some());
        assert!(indicator_match("daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin").is_some());
        assert!(indicator_match("HOME=/root\nPATH=/usr/bin").is_some());
        assert!(indicator_match("<html>regular page</html>").is_none());
    }

    #[test]
    fn file_params_gate() {
        assert!(FILE_PARAMS.contains(&"file"));
        assert!(FILE_PARAMS.contains(&"template"));
        assert!(!FILE_PARAMS.contains(&"q"));
    }
}
