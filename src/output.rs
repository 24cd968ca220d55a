use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AliasState, ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
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
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub fn print_run_summary(report: &RunReport) {
    let count = |state: AliasState| {
        report
            .items
            .iter()
            .filter(|item| item.state == state)
            .count()
    };
    let fetched = report
        .items
        .iter()
        .filter(|item| item.action == "fetched")
        .count();

    println!("kira-edges summary");
    println!("  fetched: {fetched}");
    println!("  fresh:   {}", count(AliasState::Done) - fetched);
    println!("  stale:   {}", count(AliasState::Stale));
    println!("  failed:  {}", report.failed.len());
    if report.cancelled {
        println!("  cancelled: {}", count(AliasState::Cancelled));
    }

    for item in &report.items {
        let version = item.version.as_deref().unwrap_or("-");
        println!(
            "  {}/{} {} (version {version})",
            item.source, item.alias, item.action
        );
        if let Some(error) = &item.error {
            println!("      {error}");
        }
    }

    if let Some(merged) = &report.merged {
        println!(
            "merged {} lines from {} files into {}",
            merged.stats.lines_written, merged.stats.inputs, merged.output
        );
    }
}
