//! Binary entry point for barangay.
//!
//! Thin CLI over the registry service. Every command prints JSON on stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use barangay::config::{RegistryConfig, StorageBackendType};
use barangay::models::{FieldSet, ResidentId};
use barangay::reconcile::{CounterReconciler, spawn_periodic};
use barangay::{Error, RegistryService, observability};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Barangay - resident registry with self-healing aggregate counters.
#[derive(Parser)]
#[command(name = "barangay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend: memory or redis.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Key namespace.
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Register a new resident.
    Create {
        /// Field assignment, repeatable (e.g. `--field firstName=Juan`).
        #[arg(short, long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Fields as a JSON object; `--field` values are applied after.
        #[arg(long)]
        json: Option<String>,
    },

    /// Show one resident.
    Get {
        /// Resident id.
        id: String,
    },

    /// List every resident.
    List,

    /// Change fields of a resident.
    Update {
        /// Resident id.
        id: String,

        /// Field assignment, repeatable.
        #[arg(short, long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Fields as a JSON object; `--field` values are applied after.
        #[arg(long)]
        json: Option<String>,
    },

    /// Remove a resident.
    Delete {
        /// Resident id.
        id: String,
    },

    /// Show aggregate statistics.
    Stats {
        /// Recompute from every record instead of reading counters.
        #[arg(long)]
        recompute: bool,
    },

    /// Rebuild counters from the records.
    Reconcile {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,

        /// Leave orphan records and dangling ids alone.
        #[arg(long)]
        no_prune: bool,

        /// Delete orphan records on first sight instead of only reporting
        /// them. Use only while nothing else is creating residents.
        #[arg(long, conflicts_with = "no_prune")]
        delete_orphans: bool,
    },

    /// Compare counters with the records.
    Drift,

    /// Reconcile periodically until interrupted.
    Watch {
        /// Seconds between passes (overrides configuration).
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = config.logging.clone().with_verbose(cli.verbose);
    if let Err(e) = observability::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_code(&e)
        },
    }
}

/// Loads configuration and applies command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<RegistryConfig> {
    let mut config = RegistryConfig::resolve(cli.config.as_deref())?;
    if let Some(backend) = &cli.backend {
        let backend = StorageBackendType::parse(backend)
            .with_context(|| format!("unknown storage backend: {backend}"))?;
        config = config.with_backend(backend);
    }
    if let Some(namespace) = &cli.namespace {
        config = config.with_namespace(namespace.clone());
    }
    Ok(config)
}

/// Maps an error to the process exit code: 2 for missing residents.
fn exit_code(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<Error>() {
        Some(e) if e.is_not_found() => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: RegistryConfig) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackendType::Memory {
        tracing::warn!("Using the in-memory backend; data does not outlive this process");
    }
    let service = RegistryService::from_config(&config.storage)?;

    match command {
        Commands::Create { fields, json } => {
            let fields = parse_fields(json.as_deref(), &fields)?;
            print_json(&service.create_resident(fields)?)
        },
        Commands::Get { id } => print_json(&service.get_resident(&ResidentId::new(id))?),
        Commands::List => print_json(&service.list_residents()?),
        Commands::Update { id, fields, json } => {
            let fields = parse_fields(json.as_deref(), &fields)?;
            print_json(&service.update_resident(&ResidentId::new(id), fields)?)
        },
        Commands::Delete { id } => {
            let id = ResidentId::new(id);
            service.delete_resident(&id)?;
            print_json(&serde_json::json!({ "deleted": id }))
        },
        Commands::Stats { recompute } => {
            if recompute {
                print_json(&service.read_aggregates_recomputed()?)
            } else {
                print_json(&service.read_aggregates_incremental()?)
            }
        },
        Commands::Reconcile {
            dry_run,
            no_prune,
            delete_orphans,
        } => {
            let grace = if delete_orphans { 1 } else { 2 };
            let reconciler = CounterReconciler::new(service)
                .with_prune_orphans(!no_prune)
                .with_orphan_grace(grace);
            print_json(&reconciler.reconcile(dry_run)?)
        },
        Commands::Drift => print_json(&service.check_drift()?),
        Commands::Watch { interval_secs } => {
            let mut reconcile = config.reconcile;
            if let Some(secs) = interval_secs {
                reconcile.interval_secs = secs.max(1);
            }
            let handle = spawn_periodic(service, &reconcile);
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for interrupt")?;
            handle.abort();
            tracing::info!("Stopped periodic reconciliation");
            Ok(())
        },
    }
}

/// Builds a field set from an optional JSON object plus `name=value` pairs.
fn parse_fields(json: Option<&str>, assignments: &[String]) -> anyhow::Result<FieldSet> {
    let mut fields = match json {
        Some(json) => serde_json::from_str::<FieldSet>(json).context("invalid --json fields")?,
        None => FieldSet::new(),
    };
    for assignment in assignments {
        fields.parse_assignment(assignment)?;
    }
    Ok(fields)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
