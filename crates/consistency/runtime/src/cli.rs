//! `flowsync` command-line interface

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use flowsync_ledger::{LedgerSnapshot, LedgerValidation, ReplaySummary};
use flowsync_types::ExecutionId;
use tracing::debug;

use crate::config::ConsistencyConfig;
use crate::node::ConsistencyCore;
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "flowsync")]
#[command(about = "Flowsync - inspect execution ledger snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLOWSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every execution of an exported ledger snapshot
    Verify {
        /// Snapshot file written by `export_ledger`
        snapshot: PathBuf,

        /// Hex public key of a node whose signatures are accepted
        #[arg(long = "trust")]
        trust: Vec<String>,
    },

    /// Replay one execution of a snapshot and print its state hash
    Replay {
        snapshot: PathBuf,

        /// Execution to replay
        #[arg(long = "exec")]
        exec: String,

        #[arg(long = "trust")]
        trust: Vec<String>,
    },

    /// Show the effective configuration
    Config,
}

/// Run using the current process arguments.
pub async fn run() -> anyhow::Result<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    let mut config = ConsistencyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Verify { snapshot, trust } => {
            config.ledger.trusted_peers.extend(trust);
            let core = ConsistencyCore::from_config(config).await?;
            let snapshot = read_snapshot(&snapshot).await?;
            let results = verify_snapshot(&core, snapshot).await?;

            if cli.json {
                let report: Vec<_> = results.iter().map(|(_, v)| v).collect();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (exec_id, validation) in &results {
                    print_validation(exec_id, validation);
                }
            }

            let invalid = results.iter().filter(|(_, v)| !v.is_valid).count();
            if invalid > 0 {
                bail!("{} of {} executions failed validation", invalid, results.len());
            }
            Ok(())
        }
        Commands::Replay {
            snapshot,
            exec,
            trust,
        } => {
            config.ledger.trusted_peers.extend(trust);
            let core = ConsistencyCore::from_config(config).await?;
            let snapshot = read_snapshot(&snapshot).await?;
            let summary = replay_snapshot(&core, snapshot, &ExecutionId::new(exec)).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Execution:  {}", summary.exec_id);
                println!("Records:    {}/{}", summary.records_replayed, summary.total_records);
                println!("Final step: {}", summary.final_step_index);
                println!("State hash: {}", summary.final_state_hash);
            }
            Ok(())
        }
        Commands::Config => {
            let mut shown = config.clone();
            if shown.ledger.signing_seed.is_some() {
                shown.ledger.signing_seed = Some("<redacted>".into());
            }
            let core = ConsistencyCore::from_config(config).await?;
            println!("{}", toml::to_string_pretty(&shown)?);
            println!("# public key: {}", core.public_key_hex());
            Ok(())
        }
    }
}

async fn read_snapshot(path: &Path) -> anyhow::Result<LedgerSnapshot> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot = LedgerSnapshot::from_bytes(&bytes)
        .with_context(|| format!("decoding snapshot {}", path.display()))?;
    debug!(
        source_node = %snapshot.node_id,
        executions = snapshot.executions.len(),
        records = snapshot.record_count(),
        "Snapshot loaded"
    );
    Ok(snapshot)
}

/// Import `snapshot` and validate each execution it carries, in id order.
pub async fn verify_snapshot(
    core: &ConsistencyCore,
    snapshot: LedgerSnapshot,
) -> anyhow::Result<Vec<(ExecutionId, LedgerValidation)>> {
    let exec_ids: Vec<ExecutionId> = snapshot.executions.keys().cloned().collect();
    core.ledger().import_ledger(snapshot).await?;

    let mut results = Vec::with_capacity(exec_ids.len());
    for exec_id in exec_ids {
        let validation = core.ledger().validate_ledger(&exec_id).await;
        results.push((exec_id, validation));
    }
    Ok(results)
}

/// Import `snapshot` and replay `exec_id` to the end.
pub async fn replay_snapshot(
    core: &ConsistencyCore,
    snapshot: LedgerSnapshot,
    exec_id: &ExecutionId,
) -> anyhow::Result<ReplaySummary> {
    if !snapshot.executions.contains_key(exec_id) {
        bail!("snapshot has no execution {}", exec_id);
    }
    core.ledger().import_ledger(snapshot).await?;
    core.ledger().start_replay(exec_id).await?;
    while let Some(record) = core.ledger().get_next_replay_record(exec_id).await? {
        debug!(step_id = %record.step_id, actor = %record.actor, "Replayed record");
    }
    core.ledger()
        .complete_replay(exec_id)
        .await?
        .context("replay ended before completion")
}

fn print_validation(exec_id: &ExecutionId, validation: &LedgerValidation) {
    let mark = if validation.is_valid { "✓" } else { "✗" };
    println!(
        "{} {} ({} records) chain={} signatures={} causal={}",
        mark,
        exec_id,
        validation.record_count,
        validation.chain_integrity,
        validation.signature_validity,
        validation.causal_consistency
    );
    for error in &validation.errors {
        println!("    error: {}", error);
    }
    for warning in &validation.warnings {
        println!("    warning: {}", warning);
    }
}
