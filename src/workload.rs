//! Seeded ETH-transfer traces.
//!
//! Produces a realistic operation stream without a real chain: every
//! transaction moves value between two accounts and mirrors the move in a
//! token ledger contract. Recording the stream through an
//! [`EventProxy`](crate::backend::EventProxy) yields an event registry to
//! estimate a model from.
//!
//! One transaction:
//!
//! ```text
//!   BT  GB from  GN from  SN  SB from  AB to  SO from
//!       GS ledger[from]  SS ledger[from]  GS ledger[to]  SS ledger[to]
//!       (RS)  ET
//! ```

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::backend::{ReplayStep, StateBackend};
use crate::error::{Result, StochasticError};
use crate::operation::Operation;
use crate::replay::ReplaySummary;

/// Configuration for transfer trace generation.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Total number of accounts in the system.
    pub num_accounts: u64,
    /// Number of transactions to generate.
    pub num_transactions: u64,
    /// Conflict factor: 0.0 = no conflicts, 1.0 = all transactions touch the same two accounts.
    pub conflict_factor: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
    pub transactions_per_block: u64,
    pub blocks_per_sync_period: u64,
    /// Probability that a transfer fails and is rolled back to its snapshot.
    pub revert_probability: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            num_accounts: 1000,
            num_transactions: 1000,
            conflict_factor: 0.0,
            seed: 42,
            transactions_per_block: 100,
            blocks_per_sync_period: 10,
            revert_probability: 0.05,
        }
    }
}

impl TransferConfig {
    /// Index of the token ledger contract, just past the accounts.
    pub fn ledger(&self) -> u64 {
        self.num_accounts + 1
    }

    /// Size of the account range transfers are drawn from when they conflict.
    fn hot_account_count(&self) -> u64 {
        if self.conflict_factor > 0.0 {
            (2.0 + (1.0 - self.conflict_factor) * (self.num_accounts as f64 - 2.0)).max(2.0) as u64
        } else {
            self.num_accounts
        }
    }
}

/// Generates the transfer trace of `config` and dispatches it to `backend`.
///
/// Accounts are `1..=num_accounts`; the backend is primed with them and the
/// ledger contract first.
pub fn record_transfers<B: StateBackend>(
    config: &TransferConfig,
    backend: &mut B,
) -> Result<ReplaySummary> {
    if config.num_accounts < 2 {
        return Err(StochasticError::MalformedModel(format!(
            "transfers need at least two accounts, got {}",
            config.num_accounts
        )));
    }
    let transactions_per_block = config.transactions_per_block.max(1);
    let blocks_per_sync_period = config.blocks_per_sync_period.max(1);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let hot_account_count = config.hot_account_count();
    let ledger = config.ledger();
    debug!(hot_account_count, ledger, "transfer workload");

    let mut sink = Sink {
        backend,
        summary: ReplaySummary::default(),
    };
    sink.backend
        .prime(ledger)
        .map_err(|err| StochasticError::Backend(Box::new(err)))?;

    let mut blocks = 0;
    sink.emit(ReplayStep::new(Operation::BeginSyncPeriod))?;
    for tx in 0..config.num_transactions {
        if tx % transactions_per_block == 0 {
            if tx > 0 {
                sink.emit(ReplayStep::new(Operation::EndBlock))?;
                blocks += 1;
                if blocks % blocks_per_sync_period == 0 {
                    sink.emit(ReplayStep::new(Operation::EndSyncPeriod))?;
                    sink.emit(ReplayStep::new(Operation::BeginSyncPeriod))?;
                }
            }
            sink.emit(ReplayStep::new(Operation::BeginBlock))?;
        }

        let range = if rng.gen::<f64>() < config.conflict_factor {
            hot_account_count
        } else {
            config.num_accounts
        };
        let from = rng.gen_range(1..=range);
        let mut to = rng.gen_range(1..=range);
        while to == from {
            to = rng.gen_range(1..=range);
        }
        let from_balance = rng.gen_range(1..=config.num_accounts);
        let to_balance = rng.gen_range(1..=config.num_accounts);
        let reverted = rng.gen::<f64>() < config.revert_probability;

        let steps = [
            ReplayStep::new(Operation::BeginTransaction),
            ReplayStep::new(Operation::GetBalance).with_address(from),
            ReplayStep::new(Operation::GetNonce).with_address(from),
            ReplayStep::new(Operation::Snapshot),
            ReplayStep::new(Operation::SubBalance).with_address(from),
            ReplayStep::new(Operation::AddBalance).with_address(to),
            ReplayStep::new(Operation::SetNonce).with_address(from),
            ReplayStep::new(Operation::GetState).with_address(ledger).with_key(from),
            ReplayStep::new(Operation::SetState)
                .with_address(ledger)
                .with_key(from)
                .with_value(from_balance),
            ReplayStep::new(Operation::GetState).with_address(ledger).with_key(to),
            ReplayStep::new(Operation::SetState)
                .with_address(ledger)
                .with_key(to)
                .with_value(to_balance),
        ];
        for step in steps {
            sink.emit(step)?;
        }
        if reverted {
            sink.emit(ReplayStep::new(Operation::RevertToSnapshot).with_snapshot_delta(0))?;
        }
        sink.emit(ReplayStep::new(Operation::EndTransaction))?;
    }
    if config.num_transactions > 0 {
        sink.emit(ReplayStep::new(Operation::EndBlock))?;
    }
    sink.emit(ReplayStep::new(Operation::EndSyncPeriod))?;

    let summary = sink.summary;
    info!(
        steps = summary.steps,
        transactions = summary.transactions,
        reverts = summary.count(Operation::RevertToSnapshot),
        "transfer workload recorded"
    );
    Ok(summary)
}

struct Sink<'a, B> {
    backend: &'a mut B,
    summary: ReplaySummary,
}

impl<B: StateBackend> Sink<'_, B> {
    fn emit(&mut self, step: ReplayStep) -> Result<()> {
        self.backend
            .dispatch(&step)
            .map_err(|err| StochasticError::Backend(Box::new(err)))?;
        self.summary.record(&step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{to_address, EventProxy, MemoryBackend};
    use crate::operation::ArgOp;

    fn config() -> TransferConfig {
        TransferConfig {
            num_accounts: 50,
            num_transactions: 40,
            conflict_factor: 0.0,
            seed: 123,
            transactions_per_block: 10,
            blocks_per_sync_period: 2,
            revert_probability: 0.0,
        }
    }

    #[test]
    fn test_scopes() {
        let mut backend = MemoryBackend::new(1);
        let summary = record_transfers(&config(), &mut backend).unwrap();

        assert_eq!(summary.transactions, 40);
        assert_eq!(summary.blocks, 4);
        assert_eq!(summary.sync_periods, 2);
        assert_eq!(summary.count(Operation::BeginSyncPeriod), 2);
        assert_eq!(summary.count(Operation::SetState), 80);
        assert_eq!(backend.stats().transactions, 40);
        assert_eq!(backend.stats().blocks, 4);
        // accounts plus the ledger
        assert!(backend.exists(&to_address(51)));
    }

    #[test]
    fn test_reverts() {
        let mut config = config();
        config.revert_probability = 1.0;
        let mut backend = MemoryBackend::new(2);
        let summary = record_transfers(&config, &mut backend).unwrap();
        assert_eq!(summary.count(Operation::RevertToSnapshot), 40);
        assert_eq!(backend.stats().reverts, 40);
    }

    #[test]
    fn test_full_conflict_uses_two_accounts() {
        let mut config = config();
        config.conflict_factor = 1.0;
        let mut proxy = EventProxy::new(MemoryBackend::new(3));
        record_transfers(&config, &mut proxy).unwrap();

        let registry = proxy.registry();
        // the ledger plus the two hot accounts
        assert_eq!(registry.contracts().counting().len(), 3);
        let id = |opcode: &str| opcode.parse::<ArgOp>().unwrap().encode();
        assert_eq!(registry.frequency(id("SBp")), 40);
        assert_eq!(registry.frequency(id("ABn")), 1);
        assert_eq!(registry.frequency(id("ABq")), 39);
    }

    #[test]
    fn test_deterministic() {
        let record = || {
            let mut proxy = EventProxy::new(MemoryBackend::new(4));
            record_transfers(&config(), &mut proxy).unwrap();
            proxy.registry().to_json()
        };
        assert_eq!(record(), record());
    }

    #[test]
    fn test_rejects_single_account() {
        let mut config = config();
        config.num_accounts = 1;
        assert!(record_transfers(&config, &mut MemoryBackend::new(5)).is_err());
    }
}
