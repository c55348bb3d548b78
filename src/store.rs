use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ScanOptions;
use crate::finding::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Quick,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Crawling,
    Scanning,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

/// The scan row shared with the outside world. The orchestrator is the only
/// writer apart from an external transition to `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub target_url: String,
    pub scan_mode: ScanMode,
    pub status: ScanStatus,
    pub progress_percent: u8,
    pub pages_found: usize,
    pub pages_scanned: usize,
    #[serde(default)]
    pub options: ScanOptions,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Scan {
    pub fn new(target_url: impl Into<String>, scan_mode: ScanMode, options: ScanOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            scan_mode,
            status: ScanStatus::Pending,
            progress_percent: 0,
            pages_found: 0,
            pages_scanned: 0,
            options,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Persistence port the orchestrator drives. Failures here are the only
/// errors `run_scan` propagates.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn load_scan(&self, id: Uuid) -> anyhow::Result<Option<Scan>>;
    async fn update_scan(&self, scan: &Scan) -> anyhow::Result<()>;
    /// Re-reads only the status field; used for cancellation polling.
    async fn refresh_status(&self, id: Uuid) -> anyhow::Result<Option<ScanStatus>>;
    async fn save_findings(&self, scan_id: Uuid, findings: &[Finding]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub status: ScanStatus,
    pub progress_percent: u8,
    pub pages_found: usize,
    pub pages_scanned: usize,
}

/// Progress port. Best-effort: the orchestrator logs and swallows publish
/// failures.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, scan_id: Uuid, update: ProgressUpdate) -> anyhow::Result<()>;
}

/// Progress sink that only traces events.
#[derive(Debug, Default)]
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn publish(&self, scan_id: Uuid, update: ProgressUpdate) -> anyhow::Result<()> {
        tracing::info!(
            scan_id = %scan_id,
            status = ?update.status,
            progress = update.progress_percent,
            pages = format!("{}/{}", update.pages_scanned, update.pages_found),
            "scan progress"
        );
        Ok(())
    }
}

/// In-memory store backing the CLI and the tests.
#[derive(Default)]
pub struct MemoryStore {
    scans: RwLock<HashMap<Uuid, Scan>>,
    findings: RwLock<HashMap<Uuid, Vec<Finding>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_scan(&self, scan: Scan) -> Uuid {
        let id = scan.id;
        self.scans.write().insert(id, scan);
        id
    }

    pub fn get_scan(&self, id: Uuid) -> Option<Scan> {
        self.scans.read().get(&id).cloned()
    }

    pub fn findings_for(&self, id: Uuid) -> Vec<Finding> {
        self.findings.read().get(&id).cloned().unwrap_or_default()
    }

    /// External cancellation, as the API layer would perform it.
    pub fn cancel(&self, id: Uuid) {
        if let Some(scan) = self.scans.write().get_mut(&id) {
            scan.status = ScanStatus::Cancelled;
        }
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn load_scan(&self, id: Uuid) -> anyhow::Result<Option<Scan>> {
        Ok(self.scans.read().get(&id).cloned())
    }

    async fn update_scan(&self, scan: &Scan) -> anyhow::Result<()> {
        self.scans.write().insert(scan.id, scan.clone());
        Ok(())
    }

    async fn refresh_status(&self, id: Uuid) -> anyhow::Result<Option<ScanStatus>> {
        Ok(self.scans.read().get(&id).map(|s| s.status))
    }

    async fn save_findings(&self, scan_id: Uuid, findings: &[Finding]) -> anyhow::Result<()> {
        self.findings
            .write()
            .insert(scan_id, findings.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
        assert!(!ScanStatus::Pending.is_terminal());
        assert!(!ScanStatus::Crawling.is_terminal());
        assert!(!ScanStatus::Scanning.is_terminal());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let scan = Scan::new("https://example.com", ScanMode::Quick, Default::default());
        let id = store.insert_scan(scan);

        let loaded = store.load_scan(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScanStatus::Pending);

        store.cancel(id);
        assert_eq!(
            store.refresh_status(id).await.unwrap(),
            Some(ScanStatus::Cancelled)
        );
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ScanMode::Full).unwrap(), "\"full\"");
        assert_eq!(
            serde_json::to_string(&ScanStatus::Crawling).unwrap(),
            "\"crawling\""
        );
    }
}
