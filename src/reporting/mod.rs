use crate::orchestrator::{OperationOutcome, RunReport};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Format a finished run into a readable Markdown report.
pub fn format_run_report(report: &RunReport, operation_label: &str) -> String {
    let summary = &report.summary;
    let total = report.outcomes.len();
    let success_rate = if total > 0 {
        (summary.succeeded as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let mut out = String::new();

    out.push_str("# Wallet Fleet Run Report\n\n");
    out.push_str(&format!("**Operation**: {}\n\n", operation_label));
    out.push_str("## Summary\n\n");
    out.push_str(&format!("- **Wallets Attempted**: {}\n", total));
    out.push_str(&format!(
        "- **Succeeded**: {} ({:.2}%)\n",
        summary.succeeded, success_rate
    ));
    out.push_str(&format!("- **Failed**: {}\n", summary.failed));
    out.push_str(&format!(
        "- **Lamports Moved**: {} ({:.6} SOL)\n",
        summary.lamports_moved,
        summary.lamports_moved as f64 / LAMPORTS_PER_SOL
    ));
    out.push_str(&format!(
        "- **Net Change**: {} lamports\n",
        summary.net_lamports
    ));
    if report.cancelled {
        out.push_str("- **Cancelled**: run stopped at a batch boundary\n");
    }
    out.push('\n');

    if summary.succeeded > 0 {
        out.push_str("## Confirmed Transactions\n\n");
        for outcome in report.outcomes.iter().filter(|o| o.success()) {
            out.push_str(&format!(
                "- Wallet #{} `{}`: `{}`{}\n",
                outcome.wallet_index + 1,
                outcome.pubkey,
                outcome.signature().unwrap_or("-"),
                match outcome.balance_delta {
                    Some(delta) => format!(" ({:+} lamports)", delta),
                    None => String::new(),
                }
            ));
        }
        out.push('\n');
    }

    let failures = failure_counts(&report.outcomes);
    if !failures.is_empty() {
        out.push_str("## Failure Analysis\n\n");
        for (classification, count) in &failures {
            let percentage = (*count as f64 / summary.failed as f64) * 100.0;
            out.push_str(&format!(
                "- **{}**: {} wallet(s) ({:.1}%)\n",
                classification, count, percentage
            ));
        }
        out.push('\n');
        for outcome in report.outcomes.iter().filter(|o| !o.success()) {
            if let Some(error) = outcome.error() {
                out.push_str(&format!(
                    "- Wallet #{} `{}`: {}\n",
                    outcome.wallet_index + 1,
                    outcome.pubkey,
                    error
                ));
            }
        }
        out.push('\n');
    }

    out.push_str("---\n\n");
    out.push_str(&format!(
        "*Report generated at: {}*\n",
        chrono::Utc::now().to_rfc3339()
    ));

    out
}

/// Write a formatted report next to the wallet files.
pub async fn save_run_report(
    report: &RunReport,
    operation_label: &str,
    path: &Path,
) -> Result<()> {
    let rendered = format_run_report(report, operation_label);
    tokio::fs::write(path, rendered)
        .await
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    Ok(())
}

/// Group failed outcomes by error classification, most frequent first.
fn failure_counts(outcomes: &[OperationOutcome]) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for outcome in outcomes.iter().filter(|o| !o.success()) {
        if let Some(error) = outcome.error() {
            *counts.entry(error.classification()).or_insert(0) += 1;
        }
    }

    let mut counts: Vec<(&'static str, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    counts
}
