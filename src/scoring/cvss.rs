//! CVSS v3.1 Base Score calculator implementing the official FIRST.org
//! equations.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Base metrics parsed from a `CVSS:3.1/...` vector string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvssMetrics {
    pub attack_vector: char,       // N, A, L, P
    pub attack_complexity: char,   // L, H
    pub privileges_required: char, // N, L, H
    pub user_interaction: char,    // N, R
    pub scope: char,               // U, C
    pub confidentiality: char,     // N, L, H
    pub integrity: char,           // N, L, H
    pub availability: char,        // N, L, H
}

impl CvssMetrics {
    pub fn from_vector(vector: &str) -> anyhow::Result<Self> {
        let stripped = vector
            .strip_prefix("CVSS:3.1/")
            .with_context(|| format!("vector missing CVSS:3.1 prefix: {vector}"))?;

        let mut av = None;
        let mut ac = None;
        let mut pr = None;
        let mut ui = None;
        let mut s = None;
        let mut c = None;
        let mut i = None;
        let mut a = None;

        for component in stripped.split('/') {
            let (key, value) = component
                .split_once(':')
                .with_context(|| format!("malformed vector component: {component}"))?;
            let ch = value
                .chars()
                .next()
                .with_context(|| format!("empty value in component: {component}"))?;
            match key {
                "AV" => av = Some(ch),
                "AC" => ac = Some(ch),
                "PR" => pr = Some(ch),
                "UI" => ui = Some(ch),
                "S" => s = Some(ch),
                "C" => c = Some(ch),
                "I" => i = Some(ch),
                "A" => a = Some(ch),
                _ => {} // Temporal/environmental metrics are ignored.
            }
        }

        match (av, ac, pr, ui, s, c, i, a) {
            (
                Some(av),
                Some(ac),
                Some(pr),
                Some(ui),
                Some(s),
                Some(c),
                Some(i),
                Some(a),
            ) => Ok(Self {
                attack_vector: av,
                attack_complexity: ac,
                privileges_required: pr,
                user_interaction: ui,
                scope: s,
                confidentiality: c,
                integrity: i,
                availability: a,
            }),
            _ => bail!("vector missing base metrics: {vector}"),
        }
    }
}

fn av_value(m: char) -> f64 {
    match m {
        'N' => 0.85,
        'A' => 0.62,
        'L' => 0.55,
        _ => 0.20, // P
    }
}

fn ac_value(m: char) -> f64 {
    if m == 'L' {
        0.77
    } else {
        0.44
    }
}

fn pr_value(m: char, scope_changed: bool) -> f64 {
    match (m, scope_changed) {
        ('N', _) => 0.85,
        ('L', false) => 0.62,
        ('L', true) => 0.68,
        (_, false) => 0.27,
        (_, true) => 0.50,
    }
}

fn ui_value(m: char) -> f64 {
    if m == 'N' {
        0.85
    } else {
        0.62
    }
}

fn cia_value(m: char) -> f64 {
    match m {
        'H' => 0.56,
        'L' => 0.22,
        _ => 0.0,
    }
}

/// CVSS Roundup: smallest number with one decimal place >= the input.
/// Works on a 10^-5 integer grid to dodge binary-float edge cases, per the
/// v3.1 specification appendix.
fn roundup(value: f64) -> f64 {
    let scaled = (value * 100_000.0).round() as i64;
    if scaled % 10_000 == 0 {
        scaled as f64 / 100_000.0
    } else {
        ((scaled / 10_000) as f64 + 1.0) / 10.0
    }
}

/// CVSS v3.1 Base Score in [0.0, 10.0] with one fractional digit.
pub fn base_score(m: &CvssMetrics) -> f64 {
    let scope_changed = m.scope == 'C';

    let isc_base = 1.0
        - ((1.0 - cia_value(m.confidentiality))
            * (1.0 - cia_value(m.integrity))
            * (1.0 - cia_value(m.availability)));

    let impact = if scope_changed {
        7.52 * (isc_base - 0.029) - 3.25 * (isc_base - 0.02).powi(15)
    } else {
        6.42 * isc_base
    };

    if impact <= 0.0 {
        return 0.0;
    }

    let exploitability = 8.22
        * av_value(m.attack_vector)
        * ac_value(m.attack_complexity)
        * pr_value(m.privileges_required, scope_changed)
        * ui_value(m.user_interaction);

    if scope_changed {
        roundup((1.08 * (impact + exploitability)).min(10.0))
    } else {
        roundup((impact + exploitability).min(10.0))
    }
}

pub fn score_from_vector(vector: &str) -> anyhow::Result<f64> {
    Ok(base_score(&CvssMetrics::from_vector(vector)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a base score to its qualitative rating. Scores are compared on
    /// the one-decimal grid the scorer produces.
    pub fn from_score(score: f64) -> Self {
        let tenths = (score * 10.0).round() as i32;
        match tenths {
            0 => Severity::Info,
            1..=39 => Severity::Low,
            40..=69 => Severity::Medium,
            70..=89 => Severity::High,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
