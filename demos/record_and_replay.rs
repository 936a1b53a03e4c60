//! Example: record a transfer workload, estimate a model and replay it
//!
//! The replayed stream is recorded again so the statistics of the synthetic
//! workload can be compared with the recording.
//!
//! Run with: cargo run --example record_and_replay

use db_stochastic::{
    logger::setup_logger,
    replay::{self, ReplayConfig},
    workload::{record_transfers, TransferConfig},
    EstimationModel, EventProxy, EventRegistryJson, MemoryBackend,
};
use std::time::Instant;
use tempfile::tempdir;

fn main() -> eyre::Result<()> {
    setup_logger("info");
    println!("=== Record and Replay ===\n");

    let config = TransferConfig {
        num_accounts: 2_000,
        num_transactions: 5_000,
        conflict_factor: 0.25,
        ..Default::default()
    };
    let dir = tempdir()?;
    let events_path = dir.path().join("events.json");
    let model_path = dir.path().join("simulation.json");

    // Record the workload through the proxy.
    let mut proxy = EventProxy::new(MemoryBackend::new(config.seed));
    let start = Instant::now();
    let recorded = record_transfers(&config, &mut proxy)?;
    println!(
        "recorded  | {:>8} ops | {:>6} tx | {:8.2} ms",
        recorded.steps,
        recorded.transactions,
        start.elapsed().as_secs_f64() * 1000.0
    );
    proxy.registry().write_json(&events_path)?;

    // Estimate the model from the file.
    let events = EventRegistryJson::read_json(&events_path)?;
    let model = EstimationModel::from_registry(&events)?;
    model.write_json(&model_path)?;
    println!("model     | {:>8} states", model.operations.len());

    // Replay the model and record the synthetic stream.
    let mut replayed = EventProxy::new(MemoryBackend::new(7));
    let start = Instant::now();
    let summary = replay::run(
        &model,
        ReplayConfig {
            length: recorded.steps as usize,
            seed: 7,
            ..Default::default()
        },
        &mut replayed,
    )?;
    println!(
        "replayed  | {:>8} ops | {:>6} tx | {:8.2} ms",
        summary.steps,
        summary.transactions,
        start.elapsed().as_secs_f64() * 1000.0
    );

    let recorded_model = &model;
    let synthetic = EstimationModel::from_registry(&replayed.registry().to_json())?;
    println!("\n{:10} | {:>10} | {:>10}", "lambda", "recorded", "replayed");
    for (kind, a, b) in [
        ("contracts", recorded_model.contract_stats.lambda, synthetic.contract_stats.lambda),
        ("keys", recorded_model.key_stats.lambda, synthetic.key_stats.lambda),
        ("values", recorded_model.value_stats.lambda, synthetic.value_stats.lambda),
    ] {
        println!("{kind:10} | {a:>10.4} | {b:>10.4}");
    }
    Ok(())
}
