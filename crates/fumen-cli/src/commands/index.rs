use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use fumen_core::schema::Database;
use fumen_etl::{Config, Indexer, ScanReport};

pub async fn run_index(config: &Config, json: bool) -> Result<()> {
    let sources = config.source_set()?;
    let indexer = Indexer::new(sources, config.indexer.clone())?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after in-flight files");
            on_interrupt.cancel();
        }
    });

    let report = indexer.run(db, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    println!("done");
    Ok(())
}

fn print_summary(report: &ScanReport) {
    println!("  Files dispatched: {}", report.files_dispatched);
    println!("  Patterns written: {}", report.patterns_written);
    println!("  New songs:        {}", report.songs_created);
    println!("  Flushes:          {}", report.flushes);

    if !report.failures.is_empty() {
        println!("\n  {} files skipped:", report.failures.len());
        for failure in &report.failures {
            println!("    {failure}");
        }
    }
}
