use anyhow::Result;
use std::path::Path;

use fumen_etl::{config, Config};

/// Show the current effective configuration.
pub fn show_config(config: &Config, config_path: &Path) {
    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    if config.source_directories.is_empty() {
        println!("  source_directories: <none>");
    } else {
        println!("  source_directories:");
        for dir in &config.source_directories {
            println!("    - {}", dir.display());
        }
    }
    println!("  file_extensions: {}", config.file_extensions.join(", "));
    println!("  database_path: {}", config.database_path.display());
    println!("  indexer.workers: {}", config.indexer.workers);
    println!("  indexer.batch_size: {}", config.indexer.batch_size);
    println!("  indexer.queue_capacity: {}", config.indexer.queue_capacity);
    match config.indexer.max_failures {
        Some(limit) => println!("  indexer.max_failures: {}", limit),
        None => println!("  indexer.max_failures: <unlimited>"),
    }
    println!("  logging.level: {:?}", config.logging.level());
    println!("  logging.coloured: {}", config.logging.coloured());
    println!("  logging.output: {:?}", config.logging.output());

    println!("\nPriority: CLI args > ENV vars (FUMEN_*) > Config file > Defaults");
}

/// Show the config file path.
pub fn show_path(config_path: &Path) {
    println!("{}", config_path.display());
}

/// Show example configuration.
pub fn show_example() {
    print!("{}", config::example_config());
}

/// Initialize config file with defaults.
pub fn init_config(config_path: &Path) -> Result<()> {
    if config::ensure_config_file(config_path)? {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to add your source_directories.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
