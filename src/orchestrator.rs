use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::crawler::{Crawler, CrawlerConfig, SEED_PATHS_FULL, SEED_PATHS_QUICK};
use crate::finding::Finding;
use crate::http::{CircuitBreaker, HttpClient, HttpConfig, Throttle};
use crate::modules::modules_for_mode;
use crate::scope::Scope;
use crate::scoring::cvss::Severity;
use crate::store::{ProgressSink, ProgressUpdate, Scan, ScanMode, ScanStatus, ScanStore};

/// Distinguishes failures of the persistence port (which propagate to the
/// caller) from scan failures (which end up on the row as `failed`).
enum PhaseError {
    Store(anyhow::Error),
    Scan(anyhow::Error),
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Keep only the first finding per dedup fingerprint, preserving insertion
/// order.
pub fn deduplicate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<String> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert(f.fingerprint()))
        .collect()
}

/// The scorer has the final word on severity, and evidence order indexes
/// are made contiguous, whatever the detector produced.
pub fn finalize_findings(findings: &mut [Finding]) {
    for finding in findings.iter_mut() {
        finding.severity = Severity::from_score(finding.cvss_score);
        for (idx, evidence) in finding.evidence.iter_mut().enumerate() {
            evidence.order_index = idx as u32;
        }
    }
}

/// Drives one scan through `crawling -> scanning -> completed/failed`,
/// publishing progress at every mutation and honoring external
/// cancellation at page boundaries.
pub struct Orchestrator {
    store: Arc<dyn ScanStore>,
    progress: Arc<dyn ProgressSink>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ScanStore>,
        progress: Arc<dyn ProgressSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            progress,
            config,
        }
    }

    /// Runs the scan to a terminal state. Scan failures never surface here;
    /// only persistence-port errors do.
    pub async fn run(&self, scan_id: Uuid) -> anyhow::Result<()> {
        let mut scan = match self.store.load_scan(scan_id).await? {
            Some(scan) => scan,
            None => {
                tracing::error!(scan_id = %scan_id, "scan not found");
                return Ok(());
            }
        };

        if scan.status.is_terminal() {
            // At-least-once delivery from the task runner: nothing to do.
            tracing::info!(scan_id = %scan_id, status = ?scan.status, "scan already terminal");
            return Ok(());
        }

        match self.execute(&mut scan).await {
            Ok(Outcome::Completed) => Ok(()),
            Ok(Outcome::Cancelled) => {
                tracing::info!(scan_id = %scan_id, "scan cancelled externally");
                Ok(())
            }
            Err(PhaseError::Store(e)) => Err(e),
            Err(PhaseError::Scan(e)) => {
                tracing::error!(scan_id = %scan_id, error = %e, "scan failed");
                scan.status = ScanStatus::Failed;
                scan.error_message = Some(e.to_string());
                scan.completed_at = Some(Utc::now());
                self.store.update_scan(&scan).await?;
                self.publish(&scan).await;
                Ok(())
            }
        }
    }

    async fn execute(&self, scan: &mut Scan) -> Result<Outcome, PhaseError> {
        scan.started_at = Some(Utc::now());
        self.set_status(scan, ScanStatus::Crawling, 5).await?;

        let (max_depth, max_pages, seeds) = match scan.scan_mode {
            ScanMode::Quick => (
                self.config.max_depth_quick,
                self.config.max_pages_quick,
                SEED_PATHS_QUICK,
            ),
            ScanMode::Full => (
                self.config.max_depth_full,
                self.config.max_pages_full,
                SEED_PATHS_FULL,
            ),
        };

        let delay = scan
            .options
            .request_delay
            .unwrap_or(self.config.request_delay);
        let http = HttpClient::new(
            Throttle::new(Duration::from_secs_f64(delay.max(0.0))),
            CircuitBreaker::default(),
            HttpConfig {
                custom_headers: scan.options.custom_headers.clone(),
                ..HttpConfig::default()
            },
        )
        .map_err(PhaseError::Scan)?;

        let scope = Scope::new(
            &scan.target_url,
            scan.options.include_subdomains,
            &scan.options.exclude_patterns,
        );

        let crawler = Crawler::new(
            &http,
            &scope,
            CrawlerConfig {
                max_depth,
                max_pages,
                concurrency: self.config.concurrency,
                seed_paths: seeds,
            },
        );

        tracing::info!(target = %scan.target_url, mode = ?scan.scan_mode, "crawl starting");
        let pages = crawler.crawl(&scan.target_url).await;
        scan.pages_found = pages.len();
        self.set_status(scan, ScanStatus::Scanning, 30).await?;
        tracing::info!(pages = pages.len(), "crawl finished, detection starting");

        let modules = modules_for_mode(scan.scan_mode);
        let mut all_findings: Vec<Finding> = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            let status = self
                .store
                .refresh_status(scan.id)
                .await
                .map_err(PhaseError::Store)?;
            if status == Some(ScanStatus::Cancelled) {
                return Ok(Outcome::Cancelled);
            }

            for module in &modules {
                match module.passive(page).await {
                    Ok(findings) => all_findings.extend(findings),
                    Err(e) => {
                        tracing::warn!(module = module.name(), url = %page.url, error = %e,
                            "passive detection error");
                    }
                }
                if module.is_active() {
                    match module.active(page, &http).await {
                        Ok(findings) => all_findings.extend(findings),
                        Err(e) => {
                            tracing::warn!(module = module.name(), url = %page.url, error = %e,
                                "active detection error");
                        }
                    }
                }
            }

            scan.pages_scanned = index + 1;
            let progress = 30 + (60 * scan.pages_scanned / pages.len().max(1)) as u8;
            self.set_status(scan, ScanStatus::Scanning, progress.min(90))
                .await?;
        }

        let mut unique = deduplicate(all_findings);
        finalize_findings(&mut unique);
        tracing::info!(findings = unique.len(), "persisting deduplicated findings");
        self.store
            .save_findings(scan.id, &unique)
            .await
            .map_err(PhaseError::Store)?;

        scan.completed_at = Some(Utc::now());
        self.set_status(scan, ScanStatus::Completed, 100).await?;
        Ok(Outcome::Completed)
    }

    async fn set_status(
        &self,
        scan: &mut Scan,
        status: ScanStatus,
        progress: u8,
    ) -> Result<(), PhaseError> {
        scan.status = status;
        scan.progress_percent = progress;
        self.store
            .update_scan(scan)
            .await
            .map_err(PhaseError::Store)?;
        self.publish(scan).await;
        Ok(())
    }

    async fn publish(&self, scan: &Scan) {
        let update = ProgressUpdate {
            status: scan.status,
            progress_percent: scan.progress_percent,
            pages_found: scan.pages_found,
            pages_scanned: scan.pages_scanned,
        };
        if let Err(e) = self.progress.publish(scan.id, update).await {
            tracing::warn!(scan_id = %scan.id, error = %e, "progress publish failed");
        }
    }
}

/// Entry point used by the task runner: drives the scan with the given
/// ports and returns once the scan reaches a terminal state.
pub async fn run_scan(
    store: Arc<dyn ScanStore>,
    progress: Arc<dyn ProgressSink>,
    config: EngineConfig,
    scan_id: Uuid,
) -> anyhow::Result<()> {
    Orchestrator::new(store, progress, config).run(scan_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Confidence, Evidence, EvidenceKind};

    fn finding(module: &str, vuln: &str, url: &str, param: Option<&str>, score: f64) -> Finding {
        Finding {
            module_name: module.to_string(),
            vuln_type: vuln.to_string(),
            severity: Severity::Info,
            cvss_score: score,
            cvss_vector: String::new(),
            owasp_category: "A05".to_string(),
            cwe_id: "CWE-16".to_string(),
            affected_url: url.to_string(),
            affected_parameter: param.map(String::from),
            description: String::new(),
            remediation: String::new(),
            confidence: Confidence::Firm,
            evidence: vec![
                Evidence::new(EvidenceKind::Payload, "p", "1"),
                Evidence::new(EvidenceKind::Response, "r", "2"),
            ],
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let findings = vec![
            finding("xss", "Reflected XSS", "https://a/s", Some("q"), 6.1),
            finding("sqli", "SQLi", "https://a/s", Some("q"), 9.8),
            finding("xss", "Reflected XSS", "https://a/s", Some("q"), 1.0),
            finding("xss", "Reflected XSS", "https://a/s", Some("p"), 6.1),
        ];
        let unique = deduplicate(findings);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].cvss_score, 6.1);
        assert_eq!(unique[1].module_name, "sqli");
        assert_eq!(unique[2].affected_parameter.as_deref(), Some("p"));
    }

    #[test]
    fn finalize_recomputes_severity_and_orders_evidence() {
        let mut findings = vec![
            finding("a", "t", "u", None, 9.8),
            finding("b", "t", "u", None, 6.1),
            finding("c", "t", "u", None, 0.0),
        ];
        finalize_findings(&mut findings);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[1].severity, Severity::Medium);
        assert_eq!(findings[2].severity, Severity::Info);
        for f in &findings {
            let indexes: Vec<u32> = f.evidence.iter().map(|e| e.order_index).collect();
            assert_eq!(indexes, vec![0, 1]);
        }
    }
}
