use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use crate::cli::{Cli, Commands};
use scanhound::config::{EngineConfig, ScanOptions};
use scanhound::orchestrator::run_scan;
use scanhound::store::{MemoryStore, ProgressSink, ProgressUpdate, Scan, ScanMode, ScanStatus};
use scanhound::Severity;

/// Progress sink rendering an indicatif bar while the scan runs.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

#[async_trait]
impl ProgressSink for BarProgress {
    async fn publish(&self, _scan_id: Uuid, update: ProgressUpdate) -> anyhow::Result<()> {
        self.bar.set_position(update.progress_percent as u64);
        self.bar.set_message(format!(
            "{:?} ({}/{} pages)",
            update.status, update.pages_scanned, update.pages_found
        ));
        if update.status.is_terminal() {
            self.bar.finish_and_clear();
        }
        Ok(())
    }
}

fn parse_headers(raw: &[String]) -> HashMap<String, String> {
    raw.iter()
        .filter_map(|h| {
            let (name, value) = h.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Our crate at the requested level, external crates capped at info so
    // reqwest/hyper don't flood the terminal.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_new(format!(
        "scanhound={crate_level},reqwest=info,hyper=info"
    ))
    .unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Scan {
            target,
            mode,
            subdomains,
            exclude,
            headers,
            delay,
            out,
        } => {
            let scan_mode = match mode.as_str() {
                "full" => ScanMode::Full,
                "quick" => ScanMode::Quick,
                other => anyhow::bail!("unknown scan mode '{other}' (expected quick or full)"),
            };

            let options = ScanOptions {
                include_subdomains: subdomains,
                exclude_patterns: exclude,
                custom_headers: parse_headers(&headers),
                request_delay: delay,
            };

            let store = MemoryStore::new();
            let scan_id = store.insert_scan(Scan::new(target.clone(), scan_mode, options));

            tracing::info!(target = %target, mode = %mode, "starting scan");
            let progress = Arc::new(BarProgress::new());
            run_scan(
                store.clone(),
                progress,
                EngineConfig::from_env(),
                scan_id,
            )
            .await?;

            let scan = store
                .get_scan(scan_id)
                .context("scan row disappeared from the in-memory store")?;

            match scan.status {
                ScanStatus::Completed => {
                    let findings = store.findings_for(scan_id);
                    print_summary(&scan, &findings);
                    if let Some(path) = out {
                        let report = serde_json::json!({
                            "scan": scan,
                            "findings": findings,
                        });
                        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?)
                            .await
                            .with_context(|| format!("writing report to {path}"))?;
                        println!("Report written to {path}");
                    }
                }
                ScanStatus::Failed => {
                    anyhow::bail!(
                        "scan failed: {}",
                        scan.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
                status => {
                    println!("Scan ended in state {status:?}");
                }
            }
        }
    }

    Ok(())
}

fn print_summary(scan: &Scan, findings: &[scanhound::Finding]) {
    println!(
        "\nScan of {} complete: {} pages crawled, {} finding(s)",
        scan.target_url, scan.pages_found, findings.len()
    );

    let mut by_severity: Vec<&scanhound::Finding> = findings.iter().collect();
    by_severity.sort_by(|a, b| b.severity.cmp(&a.severity));

    for severity in [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ] {
        let count = findings.iter().filter(|f| f.severity == severity).count();
        if count > 0 {
            println!("  {severity}: {count}");
        }
    }

    for finding in by_severity {
        let param = finding
            .affected_parameter
            .as_deref()
            .map(|p| format!(" [{p}]"))
            .unwrap_or_default();
        println!(
            "  [{}] {} - {}{}",
            finding.severity, finding.vuln_type, finding.affected_url, param
        );
    }
}
