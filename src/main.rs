//! # Wetten Archive CLI (`wetten`)
//!
//! ## Usage
//!
//! ```bash
//! wetten --config ./config/wetten.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wetten init` | Create the SQLite database and schema |
//! | `wetten catalog` | Download and store the document catalog |
//! | `wetten sync` | Discover new versions of catalog documents |
//! | `wetten status` | Show snapshot counts per document |
//! | `wetten versions <id>` | List archived publication dates |
//! | `wetten get <id>` | Print the latest (or a dated) snapshot |
//! | `wetten serve` | Start the read-only JSON viewer |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wetten_archive::progress::ProgressMode;
use wetten_archive::sync::SyncOptions;
use wetten_archive::{catalog, config, get, migrate, models, server, status, sync};

/// Wetten Archive CLI: keeps a content-addressed history of legislation
/// documents that can only be queried by "as-of" date.
#[derive(Parser)]
#[command(name = "wetten", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wetten.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent unless `--reset` is given, which drops all archived
    /// documents and snapshots first.
    Init {
        #[arg(long)]
        reset: bool,
    },

    /// Load the document catalog.
    ///
    /// Downloads the zipped id list from `[catalog].url`, or reads it from
    /// `--file`, and upserts every entry into the documents table.
    Catalog {
        /// Local copy of the zipped id list.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Discover new versions.
    ///
    /// Scans every catalog document of the configured kind (or only the
    /// given `--id`s), resuming each from its latest archived snapshot.
    Sync {
        /// Document id to sync instead of the catalog. Repeatable.
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Maximum number of documents scanned at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show archive statistics.
    Status,

    /// List every archived publication date of a document.
    Versions {
        /// Document id (e.g. `BWBR0001840`).
        id: String,
    },

    /// Print a snapshot.
    Get {
        /// Document id (e.g. `BWBR0001840`).
        id: String,

        /// Show the version in force on this date (YYYY-MM-DD or DD-MM-YYYY).
        #[arg(long)]
        date: Option<String>,
    },

    /// Start the read-only JSON viewer on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { reset } => {
            if reset {
                tracing::warn!("resetting database");
                migrate::reset_database(&cfg).await?;
            } else {
                migrate::run_migrations(&cfg).await?;
            }
            println!("Database initialized successfully.");
        }
        Commands::Catalog { file } => {
            catalog::run_load_catalog(&cfg, file.as_deref()).await?;
        }
        Commands::Sync {
            ids,
            concurrency,
            progress,
        } => {
            if concurrency == Some(0) {
                anyhow::bail!("--concurrency must be >= 1");
            }
            let options = SyncOptions {
                ids,
                concurrency,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            sync::run_sync(&cfg, options).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Versions { id } => {
            get::run_versions(&cfg, &id).await?;
        }
        Commands::Get { id, date } => {
            let as_of = match date {
                Some(ref s) => Some(
                    models::parse_user_date(s)
                        .ok_or_else(|| anyhow::anyhow!("invalid date: {}", s))?,
                ),
                None => None,
            };
            get::run_get(&cfg, &id, as_of).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
