//! Example: print the report of a simulation model
//!
//! Reads the model given on the command line, or estimates one from a
//! uniform recording when no path is given.
//!
//! Run with: cargo run --example analyze_model [-- simulation.json]

use db_stochastic::{
    generate::{uniform_registry, UniformConfig},
    report::ModelReport,
    EstimationModel,
};

fn main() -> eyre::Result<()> {
    let model = match std::env::args().nth(1) {
        Some(path) => EstimationModel::read_json(path)?,
        None => {
            let config = UniformConfig {
                transaction_length: 20,
                block_length: 50,
                sync_period_length: 10,
                ..Default::default()
            };
            EstimationModel::from_registry(&uniform_registry(&config).to_json())?
        }
    };

    let report = ModelReport::from_model(&model)?;
    println!("{report}");
    Ok(())
}
