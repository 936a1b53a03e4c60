//! CLI for recording, estimating and replaying stochastic workloads.
//!
//! ```bash
//! # Record a transfer workload and estimate a model from it
//! db-stochastic record --output events.json --accounts 5000 --transactions 20000
//! db-stochastic estimate events.json --output simulation.json
//!
//! # Replay the model against the in-memory backend
//! db-stochastic replay simulation.json --length 1000000 --seed 7
//!
//! # Inspect a model
//! db-stochastic inspect simulation.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use db_stochastic::{
    backend::{EventProxy, MemoryBackend, StateBackend},
    generate::{uniform_registry, UniformConfig},
    logger::setup_logger,
    replay::{self, ReplayConfig, ReplaySummary},
    report::ModelReport,
    workload::{record_transfers, TransferConfig},
    EstimationModel, EventRegistryJson,
};
use eyre::{Result, WrapErr};

#[derive(Parser)]
#[command(
    name = "db-stochastic",
    version,
    about = "Stochastic workload model for state-database benchmarks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an event registry with uniform access statistics
    Generate {
        #[arg(long, short, default_value = "events.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 1_000)]
        contracts: u64,
        #[arg(long, default_value_t = 1_000)]
        keys: u64,
        #[arg(long, default_value_t = 1_000)]
        values: u64,
        #[arg(long, default_value_t = 100)]
        snapshot_depth: usize,
        #[arg(long, default_value_t = 10)]
        transaction_length: u64,
        #[arg(long, default_value_t = 10)]
        block_length: u64,
        #[arg(long, default_value_t = 300)]
        sync_period_length: u64,
    },

    /// Record a seeded ETH-transfer workload into an event registry
    Record {
        #[arg(long, short, default_value = "events.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 1_000)]
        accounts: u64,
        #[arg(long, default_value_t = 1_000)]
        transactions: u64,
        /// 0.0 = no conflicts, 1.0 = every transfer touches the same two accounts
        #[arg(long, default_value_t = 0.0)]
        conflict_factor: f64,
        #[arg(long, default_value_t = 100)]
        transactions_per_block: u64,
        #[arg(long, default_value_t = 10)]
        blocks_per_sync_period: u64,
        #[arg(long, default_value_t = 0.05)]
        revert_probability: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Estimate a simulation model from an event registry
    Estimate {
        events: PathBuf,
        #[arg(long, short, default_value = "simulation.json")]
        output: PathBuf,
    },

    /// Replay a simulation model against the in-memory backend
    Replay {
        model: PathBuf,
        /// Number of operations to replay
        #[arg(long, short, default_value_t = 10_000)]
        length: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Opcode of the initial state
        #[arg(long, default_value = "BS")]
        initial: String,
        /// Record the replayed operations into an event registry
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Print a summary of a simulation model
    Inspect { model: PathBuf },
}

fn main() -> Result<()> {
    setup_logger("info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            output,
            contracts,
            keys,
            values,
            snapshot_depth,
            transaction_length,
            block_length,
            sync_period_length,
        } => {
            let config = UniformConfig {
                num_contracts: contracts,
                num_keys: keys,
                num_values: values,
                snapshot_depth,
                transaction_length,
                block_length,
                sync_period_length,
            };
            uniform_registry(&config)
                .write_json(&output)
                .wrap_err_with(|| format!("failed to write {}", output.display()))?;
            println!("Wrote uniform registry to {}", output.display());
        }

        Commands::Record {
            output,
            accounts,
            transactions,
            conflict_factor,
            transactions_per_block,
            blocks_per_sync_period,
            revert_probability,
            seed,
        } => {
            let config = TransferConfig {
                num_accounts: accounts,
                num_transactions: transactions,
                conflict_factor,
                seed,
                transactions_per_block,
                blocks_per_sync_period,
                revert_probability,
            };
            let mut proxy = EventProxy::new(MemoryBackend::new(seed));
            let start = Instant::now();
            let summary =
                record_transfers(&config, &mut proxy).wrap_err("transfer workload failed")?;
            print_summary("record", &summary, start);
            proxy
                .registry()
                .write_json(&output)
                .wrap_err_with(|| format!("failed to write {}", output.display()))?;
            println!("Wrote event registry to {}", output.display());
        }

        Commands::Estimate { events, output } => {
            let registry = EventRegistryJson::read_json(&events)
                .wrap_err_with(|| format!("failed to read {}", events.display()))?;
            let model =
                EstimationModel::from_registry(&registry).wrap_err("estimation failed")?;
            model
                .write_json(&output)
                .wrap_err_with(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote model with {} states to {}",
                model.operations.len(),
                output.display()
            );
        }

        Commands::Replay {
            model,
            length,
            seed,
            initial,
            record,
        } => {
            let model = read_model(&model)?;
            let config = ReplayConfig {
                length,
                seed,
                initial_opcode: initial,
            };
            let mut backend = MemoryBackend::new(seed);
            match record {
                Some(output) => {
                    let mut proxy = EventProxy::new(&mut backend);
                    run_replay(&model, config, &mut proxy)?;
                    proxy
                        .registry()
                        .write_json(&output)
                        .wrap_err_with(|| format!("failed to write {}", output.display()))?;
                    println!("Wrote event registry to {}", output.display());
                }
                None => run_replay(&model, config, &mut backend)?,
            }
            let stats = backend.stats();
            println!(
                "{:>10} accounts | {:>10} reads | {:>10} writes | {:>8} reverts",
                backend.num_accounts(),
                stats.reads,
                stats.writes,
                stats.reverts
            );
        }

        Commands::Inspect { model } => {
            let model = read_model(&model)?;
            let report = ModelReport::from_model(&model).wrap_err("failed to analyse model")?;
            print!("{report}");
        }
    }
    Ok(())
}

fn read_model(path: &Path) -> Result<EstimationModel> {
    EstimationModel::read_json(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn run_replay<B: StateBackend>(
    model: &EstimationModel,
    config: ReplayConfig,
    backend: &mut B,
) -> Result<()> {
    let name = backend.name();
    let start = Instant::now();
    let summary = replay::run(model, config, backend)
        .wrap_err_with(|| format!("replay against {name} failed"))?;
    print_summary(name, &summary, start);
    Ok(())
}

fn print_summary(name: &str, summary: &ReplaySummary, start: Instant) {
    let elapsed = start.elapsed();
    let ops = summary.steps as f64 / elapsed.as_secs_f64();
    println!(
        "{:16} | {:>10} ops | {:>8} tx | {:>6} blocks | {:8.2} ms | {:10.0} ops/s",
        name,
        summary.steps,
        summary.transactions,
        summary.blocks,
        elapsed.as_secs_f64() * 1000.0,
        ops
    );
}
