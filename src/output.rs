use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::ledger::LedgerStats;
use crate::reconcile::{ProgressEvent, ProgressSink, ReconcileSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &ReconcileSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_stats(stats: &LedgerStats) -> io::Result<()> {
        Self::print_json(stats)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(
                image = %event.key,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => info!(image = %event.key, "{}", event.message),
        }
    }
}

pub fn print_summary_text(summary: &ReconcileSummary) {
    println!(
        "materialized: {}  skipped: {}  failed: {}",
        summary.materialized, summary.skipped, summary.failed
    );
    if summary.planned > 0 {
        println!("planned (dry run): {}", summary.planned);
    }
    for item in summary.items.iter().filter(|item| item.action == "failed") {
        println!(
            "  failed {}: {}",
            item.path,
            item.reason.as_deref().unwrap_or("unknown")
        );
    }
}

pub fn print_stats_text(stats: &LedgerStats) {
    println!("captures: {}", stats.captures);
    println!("captures without images: {}", stats.captures_without_images);
    println!("images: {}", stats.images);
    println!("materialized: {}", stats.materialized);
    println!("pending: {}", stats.pending);
}
