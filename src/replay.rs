//! Replay engine: synthesises an operation stream from an estimation model.
//!
//! The replay walks the Markov chain of the model. Each visited state is an
//! argument-encoded operation; its argument classes are turned into concrete
//! indices by the index generators:
//!
//! ```text
//!   state ──next_state──▶ state' ──decode──▶ (op, addr, key, value classes)
//!                                               │      │       │
//!                                      IndirectAccess  RandomAccess ×2
//!                                               ▼      ▼       ▼
//!                                          ReplayStep { op, address, key, value }
//! ```
//!
//! [`Replay`] is a lazy iterator; dropping it cancels the replay. [`run`]
//! drives a [`StateBackend`] with it.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, trace};

use crate::backend::{ReplayStep, StateBackend};
use crate::error::{Result, StochasticError};
use crate::estimation::{EstimationModel, KindStats};
use crate::exponential;
use crate::generator::{IndirectAccess, RandomAccess};
use crate::markov;
use crate::operation::{ArgOp, Operation};
use crate::statistics::AccessClass;

/// Steps between two progress reports of [`run`].
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Configuration of a replay stream.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Number of operations to produce.
    pub length: usize,
    /// Seed of the stream's random generator.
    pub seed: u64,
    /// Opcode of the state the chain starts in.
    pub initial_opcode: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            length: 10_000,
            seed: 42,
            initial_opcode: Operation::BeginSyncPeriod.mnemonic().to_string(),
        }
    }
}

/// Lazy stream of synthetic operations.
#[derive(Debug)]
pub struct Replay {
    operations: Vec<ArgOp>,
    matrix: Vec<Vec<f64>>,
    contracts: IndirectAccess,
    keys: RandomAccess,
    values: RandomAccess,
    snapshot_lambda: f64,
    rng: StdRng,
    state: usize,
    remaining: usize,
    started: bool,
    failed: bool,
    /// Number of snapshots taken in the current transaction and not reverted.
    snapshot_depth: usize,
    /// Contracts destroyed in the current transaction.
    suicided: Vec<u64>,
}

impl Replay {
    pub fn new(model: &EstimationModel, config: ReplayConfig) -> Result<Self> {
        let operations = model.decode_operations()?;
        let state = model
            .state_of(&config.initial_opcode)
            .ok_or_else(|| StochasticError::MissingInitialState(config.initial_opcode.clone()))?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let contracts = IndirectAccess::new(random_access(&mut rng, &model.contract_stats)?);
        let keys = random_access(&mut rng, &model.key_stats)?;
        let values = random_access(&mut rng, &model.value_stats)?;

        debug!(
            seed = config.seed,
            length = config.length,
            states = operations.len(),
            initial = %config.initial_opcode,
            "starting replay"
        );
        Ok(Self {
            operations,
            matrix: model.stochastic_matrix.clone(),
            contracts,
            keys,
            values,
            snapshot_lambda: model.snapshot_lambda,
            rng,
            state,
            remaining: config.length,
            started: false,
            failed: false,
            snapshot_depth: 0,
            suicided: Vec::new(),
        })
    }

    /// Number of live contracts.
    pub fn num_contracts(&self) -> u64 {
        self.contracts.cardinality()
    }

    fn step(&mut self, arg_op: ArgOp) -> Result<ReplayStep> {
        let rng = &mut self.rng;
        let address = require(
            "contracts",
            arg_op.address,
            self.contracts.next_index(arg_op.address, rng),
        )?;
        let key = require("keys", arg_op.key, self.keys.next_index(arg_op.key, rng))?;
        let value = require(
            "values",
            arg_op.value,
            self.values.next_index(arg_op.value, rng),
        )?;

        let mut step = ReplayStep {
            op: arg_op.op,
            address,
            key,
            value,
            snapshot_delta: None,
        };

        match arg_op.op {
            Operation::BeginBlock => self.suicided.clear(),
            Operation::BeginTransaction => {
                self.snapshot_depth = 0;
                self.suicided.clear();
            }
            Operation::Snapshot => self.snapshot_depth += 1,
            Operation::RevertToSnapshot if self.snapshot_depth > 0 => {
                let delta = exponential::discrete_sample(
                    &mut self.rng,
                    self.snapshot_lambda,
                    self.snapshot_depth as u64,
                ) as usize;
                self.snapshot_depth -= delta + 1;
                step.snapshot_delta = Some(delta);
            }
            Operation::Suicide => {
                if let Some(id) = address.filter(|&id| id != 0) {
                    if !self.suicided.contains(&id) {
                        self.suicided.push(id);
                    }
                }
            }
            Operation::EndTransaction => self.delete_suicided()?,
            _ => {}
        }
        Ok(step)
    }

    /// Removes the contracts destroyed in the finished transaction.
    ///
    /// Shrinking the contract set below the sampling floor is fatal.
    fn delete_suicided(&mut self) -> Result<()> {
        for id in std::mem::take(&mut self.suicided) {
            self.contracts.delete_index(id, &mut self.rng)?;
        }
        Ok(())
    }
}

impl Iterator for Replay {
    type Item = Result<ReplayStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }
        if self.started {
            match markov::next_state(&mut self.rng, &self.matrix, self.state) {
                Some(next) => self.state = next,
                None => {
                    self.failed = true;
                    return Some(Err(StochasticError::MalformedChain(self.state)));
                }
            }
        }
        self.started = true;
        self.remaining -= 1;

        let step = self.step(self.operations[self.state]);
        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining))
        }
    }
}

fn random_access(rng: &mut StdRng, stats: &KindStats) -> Result<RandomAccess> {
    RandomAccess::new(rng, stats.n, stats.lambda, &stats.queue_distribution)
        .ok_or(StochasticError::CardinalityTooLow(stats.n))
}

fn require(kind: &'static str, class: AccessClass, index: Option<u64>) -> Result<Option<u64>> {
    match (class, index) {
        (AccessClass::NoArg, _) => Ok(None),
        (_, Some(index)) => Ok(Some(index)),
        (AccessClass::RecentValue, None) => Err(StochasticError::EmptyRecencyDistribution(kind)),
        (_, None) => Err(StochasticError::IndexSpaceExhausted),
    }
}

/// Outcome of a replay run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub steps: u64,
    pub operations: BTreeMap<Operation, u64>,
    pub blocks: u64,
    pub transactions: u64,
    pub sync_periods: u64,
}

impl ReplaySummary {
    pub(crate) fn record(&mut self, step: &ReplayStep) {
        self.steps += 1;
        *self.operations.entry(step.op).or_insert(0) += 1;
        match step.op {
            Operation::EndBlock => self.blocks += 1,
            Operation::EndTransaction => self.transactions += 1,
            Operation::EndSyncPeriod => self.sync_periods += 1,
            _ => {}
        }
    }

    /// Number of steps with operation `op`.
    pub fn count(&self, op: Operation) -> u64 {
        self.operations.get(&op).copied().unwrap_or(0)
    }
}

/// Replays `config.length` operations of `model` against `backend`.
///
/// The backend is primed with the model's contracts first. The run stops at
/// the first replay or backend error.
pub fn run<B: StateBackend>(
    model: &EstimationModel,
    config: ReplayConfig,
    backend: &mut B,
) -> Result<ReplaySummary> {
    let replay = Replay::new(model, config)?;
    backend
        .prime(replay.num_contracts())
        .map_err(|err| StochasticError::Backend(Box::new(err)))?;

    let mut summary = ReplaySummary::default();
    for step in replay {
        let step = step?;
        trace!(%step, "dispatch");
        backend
            .dispatch(&step)
            .map_err(|err| StochasticError::Backend(Box::new(err)))?;
        summary.record(&step);
        if summary.steps % PROGRESS_INTERVAL == 0 {
            info!(steps = summary.steps, blocks = summary.blocks, "replay progress");
        }
    }
    info!(
        backend = backend.name(),
        steps = summary.steps,
        blocks = summary.blocks,
        transactions = summary.transactions,
        "replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::SIMULATION_FILE_ID;
    use crate::statistics::{MIN_CARDINALITY, QUEUE_LEN};

    fn kind(n: u64) -> KindStats {
        KindStats {
            n,
            lambda: 5.0,
            queue_distribution: vec![1.0 / QUEUE_LEN as f64; QUEUE_LEN],
        }
    }

    /// BS → BB → BT → SN → GSrq → RS → SUr → ET → EB → ES → BS
    fn cyclic_model() -> EstimationModel {
        let operations: Vec<String> = ["BS", "BB", "BT", "SN", "GSrq", "RS", "SUr", "ET", "EB", "ES"]
            .into_iter()
            .map(String::from)
            .collect();
        let n = operations.len();
        let stochastic_matrix = (0..n)
            .map(|i| {
                let mut row = vec![0.0; n];
                row[(i + 1) % n] = 1.0;
                row
            })
            .collect();
        EstimationModel {
            file_id: SIMULATION_FILE_ID.to_string(),
            operations,
            stochastic_matrix,
            contract_stats: kind(1_000),
            key_stats: kind(1_000),
            value_stats: kind(1_000),
            snapshot_lambda: 1.0,
            stationary_distribution: None,
        }
    }

    fn config(length: usize) -> ReplayConfig {
        ReplayConfig {
            length,
            seed: 7,
            ..ReplayConfig::default()
        }
    }

    #[test]
    fn test_replay_follows_chain() {
        let model = cyclic_model();
        let steps: Vec<ReplayStep> = Replay::new(&model, config(25))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(steps.len(), 25);
        let expected = model.decode_operations().unwrap();
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.op, expected[i % expected.len()].op);
        }
    }

    #[test]
    fn test_arguments_match_classes() {
        let model = cyclic_model();
        for step in Replay::new(&model, config(100)).unwrap() {
            let step = step.unwrap();
            match step.op {
                Operation::GetState => {
                    assert!(step.address.is_some_and(|a| a > 0));
                    assert!(step.key.is_some_and(|k| k > 0));
                    assert_eq!(step.value, None);
                }
                Operation::BeginBlock | Operation::EndBlock => {
                    assert_eq!((step.address, step.key, step.value), (None, None, None));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_snapshot_and_suicide_bookkeeping() {
        let model = cyclic_model();
        let mut replay = Replay::new(&model, config(100)).unwrap();
        let before = replay.num_contracts();
        let steps: Vec<ReplayStep> = replay.by_ref().collect::<Result<_>>().unwrap();
        for step in &steps {
            match step.op {
                // one snapshot per transaction, so the delta is always 0
                Operation::RevertToSnapshot => assert_eq!(step.snapshot_delta, Some(0)),
                _ => assert_eq!(step.snapshot_delta, None),
            }
        }
        // one destroyed contract per completed transaction
        let transactions = steps.iter().filter(|s| s.op == Operation::EndTransaction).count() as u64;
        assert_eq!(replay.num_contracts(), before - transactions);
    }

    #[test]
    fn test_deletion_below_floor_stops_replay() {
        // BS → BT → SUr → ET → BS
        let operations: Vec<String> = ["BS", "BT", "SUr", "ET"]
            .into_iter()
            .map(String::from)
            .collect();
        let stochastic_matrix = (0..4)
            .map(|i| {
                let mut row = vec![0.0; 4];
                row[(i + 1) % 4] = 1.0;
                row
            })
            .collect();
        let model = EstimationModel {
            operations,
            stochastic_matrix,
            contract_stats: kind(MIN_CARDINALITY),
            ..cyclic_model()
        };

        let mut replay = Replay::new(&model, config(40)).unwrap();
        let results: Vec<Result<ReplayStep>> = replay.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|step| step.is_ok()));
        assert!(matches!(
            results[3],
            Err(StochasticError::CardinalityTooLow(n)) if n == MIN_CARDINALITY - 1
        ));
        assert_eq!(replay.num_contracts(), MIN_CARDINALITY);
        assert!(replay.next().is_none());
    }

    #[test]
    fn test_missing_initial_state() {
        let model = cyclic_model();
        let config = ReplayConfig {
            initial_opcode: "FI".to_string(),
            ..ReplayConfig::default()
        };
        assert!(matches!(
            Replay::new(&model, config),
            Err(StochasticError::MissingInitialState(_))
        ));
    }

    #[test]
    fn test_malformed_chain_ends_iteration() {
        let mut model = cyclic_model();
        model.stochastic_matrix[1] = vec![0.0; 10];
        let results: Vec<Result<ReplayStep>> = Replay::new(&model, config(10)).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(results[2], Err(StochasticError::MalformedChain(1))));
    }

    #[test]
    fn test_empty_recency_distribution() {
        let mut model = cyclic_model();
        model.key_stats.queue_distribution = vec![0.0; QUEUE_LEN];
        let err = Replay::new(&model, config(10))
            .unwrap()
            .find_map(|step| step.err())
            .unwrap();
        assert!(matches!(err, StochasticError::EmptyRecencyDistribution("keys")));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let model = cyclic_model();
        let a: Vec<ReplayStep> = Replay::new(&model, config(200)).unwrap().map(|s| s.unwrap()).collect();
        let b: Vec<ReplayStep> = Replay::new(&model, config(200)).unwrap().map(|s| s.unwrap()).collect();
        assert_eq!(a, b);
    }
}
