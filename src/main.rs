// ABOUTME: CLI entry point for delta-replay
// ABOUTME: Parses commands and routes to capture, log, replay, and snapshot handlers

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use delta_replay::capture::CaptureInstaller;
use delta_replay::delta::DeltaLog;
use delta_replay::postgres;
use delta_replay::replay::{ReplayEngine, ReplayOptions};
use delta_replay::schema::{RowSchema, DEFAULT_ROW_SCHEMA};
use delta_replay::snapshot;

#[derive(Parser)]
#[command(name = "delta-replay")]
#[command(about = "Trigger-based change capture and point-in-time replay for PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the delta log and install change-capture triggers on every table
    Install {
        #[arg(long)]
        source: String,
        /// Schema whose tables are instrumented
        #[arg(long, default_value = "public")]
        schema: String,
    },
    /// Remove the triggers and functions installed by `install`
    Uninstall {
        #[arg(long)]
        source: String,
        /// Schema whose tables are cleaned up
        #[arg(long, default_value = "public")]
        schema: String,
    },
    /// Replay the delta log against a target database
    Replay {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Row shape as name:type pairs (types: integer, text, boolean); the first column is the identifier
        #[arg(long = "row-schema", default_value = DEFAULT_ROW_SCHEMA)]
        row_schema: String,
        /// Target schema consulted for table existence
        #[arg(long, default_value = "public")]
        schema: String,
        /// Create missing target tables with the fallback shape instead of skipping their deltas
        #[arg(long)]
        create_missing_tables: bool,
    },
    /// Inspect or edit the delta log before replay
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Export a table as a JSON snapshot file
    Export {
        #[arg(long)]
        source: String,
        #[arg(long)]
        table: String,
        /// Row shape as name:type pairs; must match the table
        #[arg(long = "row-schema", default_value = DEFAULT_ROW_SCHEMA)]
        row_schema: String,
        /// Output file (defaults to <table>.json)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a JSON snapshot file into a target table
    Import {
        #[arg(long)]
        target: String,
        #[arg(long)]
        table: String,
        /// Row shape as name:type pairs; must match the file
        #[arg(long = "row-schema", default_value = DEFAULT_ROW_SCHEMA)]
        row_schema: String,
        /// Input file (defaults to <table>.json)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Show the most recent deltas
    List {
        #[arg(long)]
        source: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        /// Print deltas as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a single delta before replay
    Delete {
        #[arg(long)]
        source: String,
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Install { source, schema } => {
            tracing::info!("connecting to source {}", postgres::sanitize_url(&source));
            let client = postgres::connect(&source)
                .await
                .context("Failed to connect to source database")?;

            let installed = CaptureInstaller::new(&client).install_all(&schema).await?;
            println!("Change capture installed on {} tables:", installed.len());
            for table in installed {
                println!("  {}", table);
            }
        }
        Commands::Uninstall { source, schema } => {
            tracing::info!("connecting to source {}", postgres::sanitize_url(&source));
            let client = postgres::connect(&source)
                .await
                .context("Failed to connect to source database")?;

            let removed = CaptureInstaller::new(&client).uninstall_all(&schema).await?;
            println!("Change capture removed from {} tables.", removed.len());
        }
        Commands::Replay {
            source,
            target,
            row_schema,
            schema,
            create_missing_tables,
        } => {
            let row_schema = RowSchema::parse(&row_schema)?;

            tracing::info!("connecting to source {}", postgres::sanitize_url(&source));
            let source_client = postgres::connect(&source)
                .await
                .context("Failed to connect to source database")?;
            tracing::info!("connecting to target {}", postgres::sanitize_url(&target));
            let target_client = postgres::connect(&target)
                .await
                .context("Failed to connect to target database")?;

            let options = ReplayOptions {
                target_schema: schema,
                create_missing_tables,
            };
            let stats = ReplayEngine::new(&source_client, &target_client, &row_schema, options)
                .run()
                .await?;

            println!(
                "Replay finished: {} applied ({} inserts, {} updates, {} deletes), {} skipped.",
                stats.applied, stats.inserts, stats.updates, stats.deletes, stats.skipped
            );
        }
        Commands::Log { command } => match command {
            LogCommands::List { source, limit, json } => {
                let client = postgres::connect(&source)
                    .await
                    .context("Failed to connect to source database")?;
                let log = DeltaLog::new(&client);
                let total = log.count().await?;
                let deltas = log.list_recent(limit).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&deltas)?);
                } else {
                    println!("{} of {} deltas (newest first):", deltas.len(), total);
                    for delta in deltas {
                        println!(
                            "  {}  {}  {:<6}  {}",
                            delta.id, delta.timestamp, delta.action, delta.table_name
                        );
                    }
                }
            }
            LogCommands::Delete { source, id } => {
                let client = postgres::connect(&source)
                    .await
                    .context("Failed to connect to source database")?;
                let removed = DeltaLog::new(&client).delete(id).await?;
                if removed {
                    println!("Delta {} deleted.", id);
                } else {
                    println!("Delta {} not found.", id);
                }
            }
        },
        Commands::Export {
            source,
            table,
            row_schema,
            out,
        } => {
            let row_schema = RowSchema::parse(&row_schema)?;
            let client = postgres::connect(&source)
                .await
                .context("Failed to connect to source database")?;

            let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.json", table)));
            let rows = snapshot::export_table(&client, &table, &row_schema, &path).await?;
            println!("Exported {} rows from \"{}\" to {}.", rows, table, path.display());
        }
        Commands::Import {
            target,
            table,
            row_schema,
            file,
        } => {
            let row_schema = RowSchema::parse(&row_schema)?;
            let client = postgres::connect(&target)
                .await
                .context("Failed to connect to target database")?;

            let path = file.unwrap_or_else(|| PathBuf::from(format!("{}.json", table)));
            let rows = snapshot::import_table(&client, &table, &row_schema, &path).await?;
            println!("Imported {} rows into \"{}\" from {}.", rows, table, path.display());
        }
    }

    Ok(())
}
