//! Estimation model: the closed-form parameters a replay runs from.
//!
//! The model keeps the opcode labels of the registry, turns the raw
//! transition counts into a row-stochastic matrix and replaces each key
//! kind's empirical distribution by the rate `λ` of a truncated exponential
//! distribution.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StochasticError};
use crate::exponential;
use crate::markov;
use crate::operation::ArgOp;
use crate::registry::EventRegistryJson;
use crate::statistics::AccessStatsJson;

/// File id of a serialised estimation model.
pub const SIMULATION_FILE_ID: &str = "simulation";

/// Estimated parameters of one key kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    /// Number of distinct keys observed.
    pub n: u64,
    /// Rate of the truncated exponential distribution over key ranks.
    pub lambda: f64,
    /// Probability of each recency-window position.
    pub queue_distribution: Vec<f64>,
}

impl KindStats {
    fn estimate(kind: &'static str, stats: &AccessStatsJson) -> Result<Self> {
        Ok(Self {
            n: stats.num_keys,
            lambda: estimate_lambda(kind, &stats.ecdf)?,
            queue_distribution: stats.queuing_distribution.clone(),
        })
    }
}

/// Closed-form workload model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationModel {
    pub file_id: String,
    /// Opcodes of the Markov chain states.
    pub operations: Vec<String>,
    /// Row-stochastic transition matrix over [`EstimationModel::operations`].
    pub stochastic_matrix: Vec<Vec<f64>>,
    pub contract_stats: KindStats,
    pub key_stats: KindStats,
    pub value_stats: KindStats,
    #[serde(default)]
    pub snapshot_lambda: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stationary_distribution: Option<Vec<f64>>,
}

impl EstimationModel {
    /// Estimates a model from a serialised event registry.
    pub fn from_registry(events: &EventRegistryJson) -> Result<Self> {
        let size = events.operations.len();
        check_square(&events.transition_matrix, size)?;
        for opcode in &events.operations {
            opcode.parse::<ArgOp>()?;
        }

        let stochastic_matrix = markov::normalize_rows(&events.transition_matrix);
        let stationary_distribution = match markov::stationary_distribution(&stochastic_matrix) {
            Ok(pi) => Some(pi),
            Err(err) => {
                warn!(%err, "no stationary distribution");
                None
            }
        };

        let model = Self {
            file_id: SIMULATION_FILE_ID.to_string(),
            operations: events.operations.clone(),
            stochastic_matrix,
            contract_stats: KindStats::estimate("contracts", &events.contracts)?,
            key_stats: KindStats::estimate("keys", &events.keys)?,
            value_stats: KindStats::estimate("values", &events.values)?,
            snapshot_lambda: estimate_lambda("snapshots", &events.snapshot_ecdf)?,
            stationary_distribution,
        };
        info!(
            states = size,
            contract_lambda = model.contract_stats.lambda,
            key_lambda = model.key_stats.lambda,
            value_lambda = model.value_stats.lambda,
            snapshot_lambda = model.snapshot_lambda,
            "estimated model"
        );
        Ok(model)
    }

    /// Checks the matrix shape and decodes every label.
    pub fn decode_operations(&self) -> Result<Vec<ArgOp>> {
        check_square(&self.stochastic_matrix, self.operations.len())?;
        self.operations.iter().map(|opcode| opcode.parse()).collect()
    }

    /// Index of the state labelled `opcode`.
    pub fn state_of(&self, opcode: &str) -> Option<usize> {
        self.operations.iter().position(|label| label == opcode)
    }

    /// Writes the model as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), states = self.operations.len(), "writing model");
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a model and checks its file id.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: Self = serde_json::from_reader(reader)?;
        if model.file_id != SIMULATION_FILE_ID {
            return Err(StochasticError::WrongFileId {
                expected: SIMULATION_FILE_ID,
                found: model.file_id,
            });
        }
        Ok(model)
    }
}

fn check_square(matrix: &[Vec<f64>], size: usize) -> Result<()> {
    if matrix.len() != size {
        return Err(StochasticError::MalformedModel(format!(
            "{} matrix rows for {size} operations",
            matrix.len()
        )));
    }
    if let Some(i) = matrix.iter().position(|row| row.len() != size) {
        return Err(StochasticError::MalformedModel(format!(
            "row {i} has {} columns, expected {size}",
            matrix[i].len()
        )));
    }
    Ok(())
}

/// An empty distribution carries no information and is sampled uniformly.
fn estimate_lambda(kind: &'static str, ecdf: &[[f64; 2]]) -> Result<f64> {
    if ecdf.is_empty() {
        warn!(kind, "empty distribution, sampling uniformly");
        return Ok(0.0);
    }
    exponential::approximate_lambda(ecdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::QUEUE_LEN;

    fn stats(ecdf: Vec<[f64; 2]>, num_keys: u64) -> AccessStatsJson {
        AccessStatsJson {
            num_keys,
            ecdf,
            queuing_distribution: vec![1.0 / QUEUE_LEN as f64; QUEUE_LEN],
        }
    }

    fn events() -> EventRegistryJson {
        EventRegistryJson {
            file_id: "events".to_string(),
            operations: vec!["BB".into(), "EB".into(), "GBr".into()],
            transition_matrix: vec![
                vec![0.0, 0.0, 4.0],
                vec![2.0, 0.0, 0.0],
                vec![0.0, 2.0, 6.0],
            ],
            contracts: stats(exponential::piecewise_linear_cdf(5.0, 1_000), 1_000),
            keys: stats(vec![], 0),
            values: stats(vec![[0.0, 0.0], [1.0, 1.0]], 10),
            snapshot_ecdf: vec![],
        }
    }

    #[test]
    fn test_stochastic_matrix() {
        let model = EstimationModel::from_registry(&events()).unwrap();
        assert_eq!(model.file_id, SIMULATION_FILE_ID);
        assert_eq!(model.operations, vec!["BB", "EB", "GBr"]);
        for row in &model.stochastic_matrix {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
        assert_eq!(model.stochastic_matrix[2], vec![0.0, 0.25, 0.75]);
    }

    #[test]
    fn test_lambdas() {
        let model = EstimationModel::from_registry(&events()).unwrap();
        assert!((model.contract_stats.lambda - 5.0).abs() < 1e-3);
        assert_eq!(model.contract_stats.n, 1_000);
        // empty and uniform distributions
        assert_eq!(model.key_stats.lambda, 0.0);
        assert!(model.value_stats.lambda.abs() < 1e-6);
        assert_eq!(model.snapshot_lambda, 0.0);
        assert_eq!(model.value_stats.queue_distribution.len(), QUEUE_LEN);
    }

    #[test]
    fn test_stationary_distribution() {
        let model = EstimationModel::from_registry(&events()).unwrap();
        let pi = model.stationary_distribution.unwrap();
        assert!((pi.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(pi[2] > pi[0]);
    }

    #[test]
    fn test_rejects_malformed_registries() {
        let mut ragged = events();
        ragged.transition_matrix[1].pop();
        assert!(matches!(
            EstimationModel::from_registry(&ragged),
            Err(StochasticError::MalformedModel(_))
        ));

        let mut bad_label = events();
        bad_label.operations[2] = "GBx".into();
        assert!(matches!(
            EstimationModel::from_registry(&bad_label),
            Err(StochasticError::InvalidOpcode(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let model = EstimationModel::from_registry(&events()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulation.json");
        model.write_json(&path).unwrap();
        assert_eq!(EstimationModel::read_json(&path).unwrap(), model);
        assert!(EventRegistryJson::read_json(&path).is_err());
    }

    #[test]
    fn test_state_lookup() {
        let model = EstimationModel::from_registry(&events()).unwrap();
        assert_eq!(model.state_of("EB"), Some(1));
        assert_eq!(model.state_of("BS"), None);
        assert_eq!(model.decode_operations().unwrap().len(), 3);
    }
}
