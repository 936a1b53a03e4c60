//! Event registry: records a trace of state operations as a statistical model.
//!
//! For every operation the registry classifies its arguments against the
//! history, counts the resulting argument-encoded operation and the
//! transition from the previous one. The serialised form
//! ([`EventRegistryJson`]) restricts the transition counts to the operations
//! that were actually observed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StochasticError};
use crate::operation::{ArgOp, Operation, NUM_ARG_OPS};
use crate::statistics::simplify::visvalingam_keep;
use crate::statistics::{
    AccessClass, AccessStats, AccessStatsJson, KahanSum, NUM_DISTRIBUTION_POINTS,
};

/// File id of a serialised event registry.
pub const EVENTS_FILE_ID: &str = "events";

/// Recorder of operation frequencies, transitions and argument statistics.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    arg_op_freq: Vec<u64>,
    // sparse: a dense NUM_ARG_OPS² table would be ~290 MB
    transit_freq: HashMap<(usize, usize), u64>,
    contracts: AccessStats<Address>,
    keys: AccessStats<B256>,
    values: AccessStats<B256>,
    prev_arg_op: Option<usize>,
    snapshot_freq: HashMap<usize, u64>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            arg_op_freq: vec![0; NUM_ARG_OPS],
            transit_freq: HashMap::new(),
            contracts: AccessStats::new(),
            keys: AccessStats::new(),
            values: AccessStats::new(),
            prev_arg_op: None,
            snapshot_freq: HashMap::new(),
        }
    }

    /// Registers an operation without arguments.
    pub fn register_op(&mut self, op: Operation) -> Result<()> {
        check_arity(op, 0)?;
        self.update_freq(op, AccessClass::NoArg, AccessClass::NoArg, AccessClass::NoArg)
    }

    /// Registers an operation on a contract address.
    pub fn register_address_op(&mut self, op: Operation, address: &Address) -> Result<()> {
        check_arity(op, 1)?;
        let address_class = self.contracts.classify(address);
        self.update_freq(op, address_class, AccessClass::NoArg, AccessClass::NoArg)?;
        self.contracts.place(*address);
        Ok(())
    }

    /// Registers an operation on a storage key of a contract.
    pub fn register_key_op(&mut self, op: Operation, address: &Address, key: &B256) -> Result<()> {
        check_arity(op, 2)?;
        let address_class = self.contracts.classify(address);
        let key_class = self.keys.classify(key);
        self.update_freq(op, address_class, key_class, AccessClass::NoArg)?;
        self.contracts.place(*address);
        self.keys.place(*key);
        Ok(())
    }

    /// Registers an operation writing a storage value.
    pub fn register_value_op(
        &mut self,
        op: Operation,
        address: &Address,
        key: &B256,
        value: &B256,
    ) -> Result<()> {
        check_arity(op, 3)?;
        let address_class = self.contracts.classify(address);
        let key_class = self.keys.classify(key);
        let value_class = self.values.classify(value);
        self.update_freq(op, address_class, key_class, value_class)?;
        self.contracts.place(*address);
        self.keys.place(*key);
        self.values.place(*value);
        Ok(())
    }

    /// Registers how many snapshots a revert unwound.
    pub fn register_snapshot_delta(&mut self, delta: usize) {
        *self.snapshot_freq.entry(delta).or_insert(0) += 1;
    }

    fn update_freq(
        &mut self,
        op: Operation,
        address: AccessClass,
        key: AccessClass,
        value: AccessClass,
    ) -> Result<()> {
        let arg_op = ArgOp::new(op, address, key, value)?.encode();
        self.arg_op_freq[arg_op] += 1;
        if let Some(prev) = self.prev_arg_op {
            *self.transit_freq.entry((prev, arg_op)).or_insert(0) += 1;
        }
        self.prev_arg_op = Some(arg_op);
        Ok(())
    }

    /// Number of times `arg_op` was registered.
    pub fn frequency(&self, arg_op: usize) -> u64 {
        self.arg_op_freq.get(arg_op).copied().unwrap_or(0)
    }

    /// Number of observed transitions from `from` to `to`.
    pub fn transition(&self, from: usize, to: usize) -> u64 {
        self.transit_freq.get(&(from, to)).copied().unwrap_or(0)
    }

    /// Total number of registered operations.
    pub fn num_events(&self) -> u64 {
        self.arg_op_freq.iter().sum()
    }

    pub fn contracts(&self) -> &AccessStats<Address> {
        &self.contracts
    }

    pub fn keys(&self) -> &AccessStats<B256> {
        &self.keys
    }

    pub fn values(&self) -> &AccessStats<B256> {
        &self.values
    }

    pub(crate) fn contracts_mut(&mut self) -> &mut AccessStats<Address> {
        &mut self.contracts
    }

    pub(crate) fn keys_mut(&mut self) -> &mut AccessStats<B256> {
        &mut self.keys
    }

    pub(crate) fn values_mut(&mut self) -> &mut AccessStats<B256> {
        &mut self.values
    }

    pub(crate) fn set_frequency(&mut self, arg_op: usize, count: u64) {
        self.arg_op_freq[arg_op] = count;
    }

    pub(crate) fn set_transition(&mut self, from: usize, to: usize, count: u64) {
        self.transit_freq.insert((from, to), count);
    }

    pub(crate) fn set_snapshot_frequency(&mut self, delta: usize, count: u64) {
        self.snapshot_freq.insert(delta, count);
    }

    /// Empirical cumulative distribution of snapshot deltas.
    ///
    /// Deltas `0..=max` are spread over `x = delta / max`. Without registered
    /// deltas the result is empty.
    pub fn snapshot_ecdf(&self) -> Vec<[f64; 2]> {
        let Some(&max_delta) = self.snapshot_freq.keys().max() else {
            return Vec::new();
        };
        let total: u64 = self.snapshot_freq.values().sum();

        let mut points = Vec::with_capacity(max_delta + 3);
        points.push([0.0, 0.0]);
        let mut sum = KahanSum::new();
        for delta in 0..=max_delta {
            let freq = self.snapshot_freq.get(&delta).copied().unwrap_or(0);
            let x = if max_delta == 0 {
                0.0
            } else {
                delta as f64 / max_delta as f64
            };
            points.push([x, sum.add(freq as f64 / total as f64)]);
        }
        points.push([1.0, 1.0]);

        visvalingam_keep(points, NUM_DISTRIBUTION_POINTS)
    }

    /// Produces the serialised registry.
    pub fn to_json(&self) -> EventRegistryJson {
        let observed: Vec<usize> = (0..NUM_ARG_OPS)
            .filter(|&arg_op| self.arg_op_freq[arg_op] > 0)
            .collect();
        let column: HashMap<usize, usize> = observed
            .iter()
            .enumerate()
            .map(|(i, &arg_op)| (arg_op, i))
            .collect();

        let mut matrix = vec![vec![0.0; observed.len()]; observed.len()];
        for (&(from, to), &count) in &self.transit_freq {
            // both ends of a transition were registered, hence observed
            if let (Some(&i), Some(&j)) = (column.get(&from), column.get(&to)) {
                matrix[i][j] = count as f64;
            }
        }

        let operations = observed
            .iter()
            .filter_map(|&arg_op| ArgOp::decode(arg_op).ok())
            .map(|arg_op| arg_op.opcode())
            .collect();

        EventRegistryJson {
            file_id: EVENTS_FILE_ID.to_string(),
            operations,
            transition_matrix: matrix,
            contracts: self.contracts.to_json(),
            keys: self.keys.to_json(),
            values: self.values.to_json(),
            snapshot_ecdf: self.snapshot_ecdf(),
        }
    }

    /// Writes the serialised registry as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json();
        debug!(
            path = %path.display(),
            operations = json.operations.len(),
            events = self.num_events(),
            "writing event registry"
        );
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &json)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_arity(op: Operation, found: usize) -> Result<()> {
    if op.arity() != found {
        return Err(StochasticError::ArityMismatch {
            op,
            expected: op.arity(),
            found,
        });
    }
    Ok(())
}

/// Serialised event registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistryJson {
    pub file_id: String,
    /// Opcodes of the observed operations, in encoding order.
    pub operations: Vec<String>,
    /// Raw transition counts between observed operations.
    pub transition_matrix: Vec<Vec<f64>>,
    pub contracts: AccessStatsJson,
    pub keys: AccessStatsJson,
    pub values: AccessStatsJson,
    #[serde(default)]
    pub snapshot_ecdf: Vec<[f64; 2]>,
}

impl EventRegistryJson {
    /// Reads a serialised registry and checks its file id.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let json: Self = serde_json::from_reader(reader)?;
        if json.file_id != EVENTS_FILE_ID {
            return Err(StochasticError::WrongFileId {
                expected: EVENTS_FILE_ID,
                found: json.file_id,
            });
        }
        debug!(path = %path.display(), operations = json.operations.len(), "read event registry");
        Ok(json)
    }
}
