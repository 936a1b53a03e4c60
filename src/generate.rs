//! Synthetic recordings with uniform statistics.
//!
//! [`uniform_registry`] builds an event registry without observing a real
//! workload: every valid argument-encoded operation is emitted, keys are
//! accessed uniformly and the scoping operations follow a fixed structure:
//!
//! ```text
//!   BS → BB → BT → op … op → ET ─┬─▶ BT          (transaction_length ops per tx)
//!                                └─▶ EB ─┬─▶ BB  (block_length txs per block)
//!                                        └─▶ ES → BS
//! ```

use tracing::info;

use crate::backend::{to_address, to_hash};
use crate::operation::{ArgOp, Operation};
use crate::registry::EventRegistry;
use crate::statistics::{AccessClass, AccessStats, QUEUE_LEN};

/// Parameters of a uniform recording.
#[derive(Debug, Clone)]
pub struct UniformConfig {
    pub num_contracts: u64,
    pub num_keys: u64,
    pub num_values: u64,
    /// Snapshot deltas `0..snapshot_depth` are equally likely.
    pub snapshot_depth: usize,
    /// Mean number of operations per transaction.
    pub transaction_length: u64,
    /// Mean number of transactions per block.
    pub block_length: u64,
    /// Mean number of blocks per sync period.
    pub sync_period_length: u64,
}

impl Default for UniformConfig {
    fn default() -> Self {
        Self {
            num_contracts: 1_000,
            num_keys: 1_000,
            num_values: 1_000,
            snapshot_depth: 100,
            transaction_length: 10,
            block_length: 10,
            sync_period_length: 300,
        }
    }
}

/// Builds a registry with uniform access statistics.
pub fn uniform_registry(config: &UniformConfig) -> EventRegistry {
    let mut registry = EventRegistry::new();

    info!(
        contracts = config.num_contracts,
        keys = config.num_keys,
        values = config.num_values,
        "priming uniform registry"
    );
    touch_uniformly(registry.contracts_mut(), config.num_contracts, to_address);
    touch_uniformly(registry.keys_mut(), config.num_keys, to_hash);
    touch_uniformly(registry.values_mut(), config.num_values, to_hash);

    for delta in 0..config.snapshot_depth {
        registry.set_snapshot_frequency(delta, 1);
    }

    let scoping = |op: Operation| {
        ArgOp {
            op,
            address: AccessClass::NoArg,
            key: AccessClass::NoArg,
            value: AccessClass::NoArg,
        }
        .encode()
    };
    let [bs, bb, bt, et, eb, es] = [
        Operation::BeginSyncPeriod,
        Operation::BeginBlock,
        Operation::BeginTransaction,
        Operation::EndTransaction,
        Operation::EndBlock,
        Operation::EndSyncPeriod,
    ]
    .map(scoping);

    let body: Vec<usize> = ArgOp::all_valid()
        .filter(|arg_op| !arg_op.op.is_scoping())
        .map(|arg_op| arg_op.encode())
        .collect();
    let num_body = body.len() as u64;

    for arg_op in ArgOp::all_valid() {
        registry.set_frequency(arg_op.encode(), 1);
    }

    let body_weight = config.transaction_length.saturating_sub(1);
    // P(ET) = 1 / transaction_length from the transaction body
    for &from in body.iter().chain([&bt]) {
        for &to in &body {
            if body_weight > 0 {
                registry.set_transition(from, to, body_weight);
            }
        }
        registry.set_transition(from, et, num_body);
    }

    registry.set_transition(bs, bb, 1);
    registry.set_transition(bb, bt, 1);
    registry.set_transition(et, bt, config.block_length.saturating_sub(1));
    registry.set_transition(et, eb, 1);
    registry.set_transition(eb, bb, config.sync_period_length.saturating_sub(1));
    registry.set_transition(eb, es, 1);
    registry.set_transition(es, bs, 1);

    registry
}

/// Places keys `1..=n` in order and after each placement looks up one earlier
/// key, cycling through window positions `1..QUEUE_LEN`, so that both the
/// frequency and the recency distribution are uniform.
fn touch_uniformly<K, F>(stats: &mut AccessStats<K>, n: u64, key: F)
where
    K: Clone + Eq + std::hash::Hash + Default,
    F: Fn(u64) -> K,
{
    let span = QUEUE_LEN as u64 - 1;
    for i in 1..=n {
        stats.place(key(i));
        let distance = 1 + i % span;
        if i > distance {
            stats.classify(&key(i - distance));
        }
    }
}
