mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::pipeline::SinkKind;

#[derive(Parser)]
#[command(name = "ssx")]
#[command(about = "shipsync operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env overlays)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Poll the shipment feed and publish updates to the queue
    Produce {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Run a single poll and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Override job.poll_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Receive queued updates and apply them exactly once
    Consume {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Process one batch and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Where shipments are applied
        #[arg(long, value_enum, default_value_t = SinkKind::Http)]
        sink: SinkKind,
    },

    /// Processing ledger inspection and repair
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },

    /// Upstream credential management
    Vault {
        #[command(subcommand)]
        cmd: VaultCmd,
    },

    /// Load fixture data into the database
    Seed {
        #[command(subcommand)]
        cmd: SeedCmd,
    },

    /// Queue table utilities
    Queue {
        #[command(subcommand)]
        cmd: QueueCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when any ledger record is PROCESSING unless --yes is provided.
    Migrate {
        /// Acknowledge that a consumer may be mid-apply against this DB.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Print one processing record
    Show {
        /// Event key (<shipment_id>-<epoch millis>)
        #[arg(long)]
        key: String,
    },

    /// List recent processing records, newest first
    List {
        /// PROCESSING | COMPLETED | FAILED
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Release a stuck PROCESSING record (PROCESSING -> FAILED) so redelivery can reclaim it
    Reset {
        #[arg(long)]
        key: String,

        /// Stored as the record's error
        #[arg(long, default_value = "operator reset")]
        reason: String,

        /// Confirm no consumer is still working on this event.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum VaultCmd {
    /// Print a fresh base64 AES-256 sealing key
    Keygen,

    /// Seal an operator-supplied credential JSON file into the store
    Seal {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        file: PathBuf,
    },

    /// Check the stored credential (refreshing if expired); prints a redacted preview only
    Token {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Refresh even if the stored credential is still valid
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
}

#[derive(Subcommand)]
enum SeedCmd {
    /// Upsert orders from a `{"orders": [...]}` JSON file
    Orders {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum QueueCmd {
    /// Pending and leased message counts for the configured topic
    Depth {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev-time secrets; absent file is fine
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = ssx_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = ssx_db::status(&pool).await?;
                    println!("db_ok={} has_ledger_table={}", s.ok, s.has_ledger_table);
                }
                DbCmd::Migrate { yes } => {
                    let n = ssx_db::count_processing(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} PROCESSING ledger record(s). Re-run with: `ssx db migrate --yes`",
                            n
                        );
                    }

                    ssx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = ssx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Produce {
            config_paths,
            once,
            interval_secs,
        } => commands::pipeline::produce(&config_paths, once, interval_secs).await?,

        Commands::Consume {
            config_paths,
            once,
            sink,
        } => commands::pipeline::consume(&config_paths, once, sink).await?,

        Commands::Ledger { cmd } => match cmd {
            LedgerCmd::Show { key } => commands::ledger::show(&key).await?,
            LedgerCmd::List { status, limit } => {
                commands::ledger::list(status.as_deref(), limit).await?
            }
            LedgerCmd::Reset { key, reason, yes } => {
                commands::ledger::reset(&key, &reason, yes).await?
            }
        },

        Commands::Vault { cmd } => match cmd {
            VaultCmd::Keygen => commands::vault::keygen(),
            VaultCmd::Seal { config_paths, file } => {
                commands::vault::seal(&config_paths, &file).await?
            }
            VaultCmd::Token {
                config_paths,
                refresh,
            } => commands::vault::token(&config_paths, refresh).await?,
        },

        Commands::Seed { cmd } => match cmd {
            SeedCmd::Orders { file } => {
                let orders = ssx_db::load_orders_fixture(&file)?;
                let store = commands::pg_store().await?;
                let n = ssx_db::seed_orders(store.as_ref(), &orders).await?;
                println!("orders_seeded={} file={}", n, file.display());
            }
        },

        Commands::Queue { cmd } => match cmd {
            QueueCmd::Depth { config_paths } => {
                commands::pipeline::queue_depth(&config_paths).await?
            }
        },
    }

    Ok(())
}
