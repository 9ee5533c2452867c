use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fumen_etl::{config, Config};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "fumen", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/fumen/fumen.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file (default: ~/.config/fumen/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Index every chart under the configured source directories
    ///
    /// Walks each entry of `source_directories` and parses every file whose
    /// extension is listed in `file_extensions`. For each chart:
    ///
    /// - Normalizes the text to UTF-8 (Shift_JIS, EUC-KR and UTF-32 are detected)
    /// - Hashes the normalized bytes with SHA-256
    /// - Extracts #TITLE, #SUBTITLE, #ARTIST and #SUBARTIST
    /// - Upserts a pattern keyed by the hash, linked to a song per directory
    ///
    /// Re-indexing is idempotent: unchanged content keeps its row, moved
    /// content updates the row's path. Files that cannot be read or decoded
    /// are reported and skipped.
    ///
    /// Press Ctrl-C to stop early. Batches already written stay written.
    Index {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what the index contains
    Status,
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::config_file_path);
    let mut config = Config::load_from(&config_path)?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    if let Err(e) = twyg::setup(config.logging.clone()) {
        eprintln!("Failed to set up logging: {e:?}");
    }

    match cli.command {
        Commands::Index { json } => {
            commands::run_index(&config, json).await?;
        }
        Commands::Status => {
            commands::show_status(&config.database_path)?;
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommand::Show => commands::config::show_config(&config, &config_path),
            ConfigCommand::Path => commands::config::show_path(&config_path),
            ConfigCommand::Example => commands::config::show_example(),
            ConfigCommand::Init => commands::config::init_config(&config_path)?,
        },
    }

    Ok(())
}
