//! # nvd-sync CLI
//!
//! The `nvd-sync` binary initializes the database, runs synchronizations
//! against the NVD feed, browses stored records, and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! nvd-sync --config ./config/nvd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nvd-sync init` | Create the SQLite database and run schema migrations |
//! | `nvd-sync sync` | Pull the feed and upsert every record |
//! | `nvd-sync get <id>` | Show one stored record |
//! | `nvd-sync list` | List stored records with filters |
//! | `nvd-sync serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nvd_sync::config;
use nvd_sync::logging;
use nvd_sync::migrate;
use nvd_sync::progress::ProgressMode;
use nvd_sync::query::{self, CveQuery, SortField, SortOrder};
use nvd_sync::server;
use nvd_sync::sqlite_store::SqliteStore;
use nvd_sync::sync::{self, SyncMode};

/// nvd-sync: schema-tolerant synchronization of the NVD vulnerability feed.
#[derive(Parser)]
#[command(name = "nvd-sync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nvd.toml")]
    config: PathBuf,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only warnings and errors.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Synchronize the local database with the feed.
    ///
    /// Pages through the feed from the start, normalizes each record, and
    /// upserts it by CVE id. Failed pages are retried at the same offset.
    Sync {
        /// Sync mode. Only `full` is supported.
        #[arg(long, default_value = "full")]
        mode: String,

        /// Progress output on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show one stored record.
    Get {
        /// CVE id, e.g. `CVE-2021-44228`.
        id: String,
    },

    /// List stored records.
    List {
        #[arg(long)]
        year: Option<i32>,

        /// Exact CVE id.
        #[arg(long)]
        cve_id: Option<String>,

        /// Minimum CVSS v3 score.
        #[arg(long)]
        min_score: Option<f64>,

        /// Maximum CVSS v3 score.
        #[arg(long)]
        max_score: Option<f64>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        per_page: Option<u32>,

        /// `published` or `lastModified`.
        #[arg(long, default_value = "published")]
        sort_by: String,

        /// `asc` or `desc`.
        #[arg(long, default_value = "desc")]
        order: String,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.quiet, cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { mode, progress } => {
            let mode: SyncMode = mode.parse()?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();

            let run = sync::trigger_sync(&cfg, mode, reporter.as_ref()).await?;

            println!("sync {}", mode.as_str());
            println!("  processed: {}", run.processed);
            println!("  inserted:  {}", run.inserted);
            println!("  updated:   {}", run.updated);
            println!("  skipped:   {}", run.skipped());
            println!("ok");
        }
        Commands::Get { id } => {
            let store = SqliteStore::open(&cfg).await?;
            let result = query::run_get(&store, &id).await;
            store.close().await;
            result?;
        }
        Commands::List {
            year,
            cve_id,
            min_score,
            max_score,
            page,
            per_page,
            sort_by,
            order,
        } => {
            let q = CveQuery {
                page,
                per_page,
                year,
                cve_id,
                min_score,
                max_score,
                sort_by: SortField::parse(&sort_by),
                order: SortOrder::parse(&order),
            };
            let store = SqliteStore::open(&cfg).await?;
            let result = query::run_list(&store, &q).await;
            store.close().await;
            result?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
