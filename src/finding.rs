use serde::{Deserialize, Serialize};

use crate::scoring::cvss::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Tentative,
    Firm,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Payload,
    Request,
    Response,
    Log,
}

/// One reproducibility artifact attached to a finding. `order_index` values
/// are assigned contiguously when the finding batch is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub order_index: u32,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            content: content.into(),
            order_index: 0,
        }
    }

    pub fn payload(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Payload, title, content)
    }

    pub fn request(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Request, title, content)
    }

    pub fn response(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Response, title, content)
    }

    pub fn log(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Log, title, content)
    }
}

/// A vulnerability record emitted by a detector. The orchestrator owns the
/// final word on `severity` (recomputed from `cvss_score`) and on evidence
/// ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub module_name: String,
    pub vuln_type: String,
    pub severity: Severity,
    pub cvss_score: f64,
    pub cvss_vector: String,
    pub owasp_category: String,
    pub cwe_id: String,
    pub affected_url: String,
    pub affected_parameter: Option<String>,
    pub description: String,
    pub remediation: String,
    pub confidence: Confidence,
    pub evidence: Vec<Evidence>,
}

impl Finding {
    /// Dedup key: one finding survives per (module, type, url, parameter).
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.module_name,
            self.vuln_type,
            self.affected_url,
            self.affected_parameter.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(param: Option<&str>) -> Finding {
        Finding {
            module_name: "xss".into(),
            vuln_type: "Reflected XSS".into(),
            severity: Severity::High,
            cvss_score: 6.1,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".into(),
            owasp_category: "A03".into(),
            cwe_id: "CWE-79".into(),
            affected_url: "https://example.com/s".into(),
            affected_parameter: param.map(|p| p.to_string()),
            description: String::new(),
            remediation: String::new(),
            confidence: Confidence::Confirmed,
            evidence: vec![],
        }
    }

    #[test]
    fn fingerprint_treats_missing_parameter_as_empty() {
        assert_eq!(
            sample(None).fingerprint(),
            "xss:Reflected XSS:https://example.com/s:"
        );
        assert_ne!(sample(None).fingerprint(), sample(Some("q")).fingerprint());
    }

    #[test]
    fn serializes_evidence_kind_as_type() {
        let ev = Evidence::payload("Payload", "x");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "payload");
    }
}
