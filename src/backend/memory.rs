//! In-memory reference backend on top of revm's `CacheDB`.
//!
//! Accounts and storage live in the `CacheDB` cache. While snapshots are
//! active, every write records its before-image in the journal frame of the
//! innermost snapshot, so reverts can restore the state:
//!
//! ```text
//!   SN        SN        SN            RS(delta = 1)
//!   [f0]  →  [f0 f1] → [f0 f1 f2]  →  [f0]        (f2 then f1 undone)
//! ```

use std::collections::{HashMap, HashSet};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use rand::{rngs::StdRng, Rng, SeedableRng};
use revm::{
    bytecode::Bytecode,
    database::{CacheDB, EmptyDB},
    primitives::KECCAK_EMPTY,
    state::AccountInfo,
};
use thiserror::Error;
use tracing::debug;

use super::{ReplayStep, StateBackend};
use crate::operation::Operation;

/// Upper bound of a balance increment.
pub const ADD_BALANCE_RANGE: u64 = 100_000;

/// Upper bound of a nonce.
pub const SET_NONCE_RANGE: u64 = 1_000_000;

/// Maximum contract code size (EIP-170).
pub const MAX_CODE_SIZE: usize = 24_576;

/// Failure of the memory backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A revert unwinds more snapshots than are active.
    #[error("cannot revert {delta} snapshots beyond the innermost one, {depth} active")]
    InvalidSnapshot { delta: usize, depth: usize },

    /// A step lacks an argument its operation needs.
    #[error("operation {op} is missing its {argument} argument")]
    MissingArgument { op: Operation, argument: &'static str },
}

/// Access counters of a [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub reads: u64,
    pub writes: u64,
    pub reverts: u64,
    pub transactions: u64,
    pub blocks: u64,
}

#[derive(Debug)]
enum JournalEntry {
    Account {
        address: Address,
        previous: Option<AccountInfo>,
    },
    Storage {
        address: Address,
        slot: U256,
        previous: Option<U256>,
    },
    Transient {
        address: Address,
        slot: U256,
        previous: Option<U256>,
    },
    Suicide(Address),
}

/// State backend keeping all state in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    db: CacheDB<EmptyDB>,
    /// One frame per active snapshot, innermost last.
    journal: Vec<Vec<JournalEntry>>,
    /// Storage values at the start of the current transaction.
    committed: HashMap<(Address, U256), U256>,
    transient: HashMap<(Address, U256), U256>,
    suicided: HashSet<Address>,
    rng: StdRng,
    stats: BackendStats,
}

impl MemoryBackend {
    /// Creates an empty backend; `seed` drives balances, nonces and code.
    pub fn new(seed: u64) -> Self {
        Self {
            db: CacheDB::new(EmptyDB::default()),
            journal: Vec::new(),
            committed: HashMap::new(),
            transient: HashMap::new(),
            suicided: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
            stats: BackendStats::default(),
        }
    }

    pub fn db(&self) -> &CacheDB<EmptyDB> {
        &self.db
    }

    pub fn stats(&self) -> &BackendStats {
        &self.stats
    }

    /// Number of active snapshots.
    pub fn snapshot_depth(&self) -> usize {
        self.journal.len()
    }

    pub fn num_accounts(&self) -> usize {
        self.db.cache.accounts.len()
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.db.cache.accounts.contains_key(address)
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.info(address).map(|info| info.balance).unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.info(address).map(|info| info.nonce).unwrap_or_default()
    }

    /// Current value of a storage slot.
    pub fn storage(&self, address: &Address, key: &B256) -> U256 {
        self.slot_value(address, to_slot(key)).unwrap_or_default()
    }

    /// Value of a storage slot at the start of the current transaction.
    pub fn committed_storage(&self, address: &Address, key: &B256) -> U256 {
        let slot = to_slot(key);
        self.committed
            .get(&(*address, slot))
            .copied()
            .or_else(|| self.slot_value(address, slot))
            .unwrap_or_default()
    }

    pub fn transient_storage(&self, address: &Address, key: &B256) -> U256 {
        self.transient
            .get(&(*address, to_slot(key)))
            .copied()
            .unwrap_or_default()
    }

    pub fn code_size(&self, address: &Address) -> usize {
        self.code(address).map(|code| code.len()).unwrap_or(0)
    }

    pub fn has_suicided(&self, address: &Address) -> bool {
        self.suicided.contains(address)
    }

    fn info(&self, address: &Address) -> Option<&AccountInfo> {
        self.db.cache.accounts.get(address).map(|account| &account.info)
    }

    fn slot_value(&self, address: &Address, slot: U256) -> Option<U256> {
        self.db
            .cache
            .accounts
            .get(address)
            .and_then(|account| account.storage.get(&slot).copied())
    }

    fn code(&self, address: &Address) -> Option<Bytecode> {
        let info = self.info(address)?;
        info.code
            .clone()
            .or_else(|| self.db.cache.contracts.get(&info.code_hash).cloned())
    }

    fn record(&mut self, entry: JournalEntry) {
        if let Some(frame) = self.journal.last_mut() {
            frame.push(entry);
        }
    }

    /// Journals the account's info and returns it for modification.
    fn account_mut(&mut self, address: Address) -> &mut AccountInfo {
        if !self.journal.is_empty() {
            let previous = self.info(&address).cloned();
            self.record(JournalEntry::Account { address, previous });
        }
        self.stats.writes += 1;
        &mut self.db.cache.accounts.entry(address).or_default().info
    }

    fn set_storage(&mut self, address: Address, key: &B256, value: &B256) {
        let slot = to_slot(key);
        let previous = self.slot_value(&address, slot);
        self.committed
            .entry((address, slot))
            .or_insert_with(|| previous.unwrap_or_default());
        if !self.journal.is_empty() {
            self.record(JournalEntry::Storage {
                address,
                slot,
                previous,
            });
        }
        self.stats.writes += 1;
        self.db
            .cache
            .accounts
            .entry(address)
            .or_default()
            .storage
            .insert(slot, to_slot(value));
    }

    fn set_transient(&mut self, address: Address, key: &B256, value: &B256) {
        let slot = to_slot(key);
        let previous = self.transient.insert((address, slot), to_slot(value));
        self.record(JournalEntry::Transient {
            address,
            slot,
            previous,
        });
        self.stats.writes += 1;
    }

    fn revert(&mut self, delta: usize) -> Result<(), BackendError> {
        let depth = self.journal.len();
        if delta >= depth {
            return Err(BackendError::InvalidSnapshot { delta, depth });
        }
        for frame in self.journal.split_off(depth - delta - 1).into_iter().rev() {
            for entry in frame.into_iter().rev() {
                self.undo(entry);
            }
        }
        self.stats.reverts += 1;
        Ok(())
    }

    fn undo(&mut self, entry: JournalEntry) {
        let accounts = &mut self.db.cache.accounts;
        match entry {
            JournalEntry::Account {
                address,
                previous: Some(info),
            } => accounts.entry(address).or_default().info = info,
            JournalEntry::Account {
                address,
                previous: None,
            } => {
                accounts.remove(&address);
            }
            JournalEntry::Storage {
                address,
                slot,
                previous,
            } => {
                if let Some(account) = accounts.get_mut(&address) {
                    match previous {
                        Some(value) => {
                            account.storage.insert(slot, value);
                        }
                        None => {
                            account.storage.remove(&slot);
                        }
                    }
                }
            }
            JournalEntry::Transient {
                address,
                slot,
                previous,
            } => match previous {
                Some(value) => {
                    self.transient.insert((address, slot), value);
                }
                None => {
                    self.transient.remove(&(address, slot));
                }
            },
            JournalEntry::Suicide(address) => {
                self.suicided.remove(&address);
            }
        }
    }

    /// Removes destroyed accounts.
    fn finalise(&mut self) {
        for address in self.suicided.drain() {
            self.db.cache.accounts.remove(&address);
        }
    }

    fn end_transaction(&mut self) {
        self.finalise();
        self.journal.clear();
        self.committed.clear();
        self.transient.clear();
        self.stats.transactions += 1;
    }

    fn random_code(&mut self) -> (B256, Bytecode) {
        let size = self.rng.gen_range(1..MAX_CODE_SIZE);
        let mut code = vec![0u8; size];
        self.rng.fill(code.as_mut_slice());
        // 0xEF starts a delegation designator, not legacy code
        if code[0] == 0xEF {
            code[0] = 0x00;
        }
        (keccak256(&code), Bytecode::new_raw(Bytes::from(code)))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StateBackend for MemoryBackend {
    type Error = BackendError;

    fn dispatch(&mut self, step: &ReplayStep) -> Result<(), Self::Error> {
        let op = step.op;
        let address = || {
            step.contract()
                .ok_or(BackendError::MissingArgument { op, argument: "address" })
        };
        let key = || {
            step.storage_key()
                .ok_or(BackendError::MissingArgument { op, argument: "key" })
        };
        let value = || {
            step.storage_value()
                .ok_or(BackendError::MissingArgument { op, argument: "value" })
        };

        match op {
            Operation::BeginSyncPeriod
            | Operation::EndSyncPeriod
            | Operation::BeginBlock => {}
            Operation::EndBlock => self.stats.blocks += 1,
            Operation::BeginTransaction => self.journal.clear(),
            Operation::EndTransaction => self.end_transaction(),
            Operation::Finalise => self.finalise(),
            Operation::Snapshot => self.journal.push(Vec::new()),
            Operation::RevertToSnapshot => {
                // without an active snapshot there is nothing to revert
                if let Some(delta) = step.snapshot_delta {
                    self.revert(delta)?;
                }
            }

            Operation::CreateAccount => {
                let info = self.account_mut(address()?);
                // the balance survives re-creation
                *info = AccountInfo {
                    balance: info.balance,
                    ..AccountInfo::default()
                };
            }
            Operation::AddBalance => {
                let amount = U256::from(self.rng.gen_range(0..ADD_BALANCE_RANGE));
                let info = self.account_mut(address()?);
                info.balance = info.balance.saturating_add(amount);
            }
            Operation::SubBalance => {
                let address = address()?;
                let balance = self.balance(&address);
                if !balance.is_zero() {
                    let amount = U256::from(self.rng.gen_range(0..ADD_BALANCE_RANGE)).min(balance);
                    self.account_mut(address).balance = balance - amount;
                }
            }
            Operation::SetNonce => {
                let nonce = self.rng.gen_range(0..SET_NONCE_RANGE);
                self.account_mut(address()?).nonce = nonce;
            }
            Operation::SetCode => {
                let address = address()?;
                let (code_hash, code) = self.random_code();
                self.db.cache.contracts.insert(code_hash, code.clone());
                let info = self.account_mut(address);
                info.code_hash = code_hash;
                info.code = Some(code);
            }
            Operation::Suicide => {
                let address = address()?;
                if self.exists(&address) {
                    self.account_mut(address).balance = U256::ZERO;
                }
                if self.suicided.insert(address) {
                    self.record(JournalEntry::Suicide(address));
                }
            }
            Operation::SetState => {
                let (address, key, value) = (address()?, key()?, value()?);
                self.set_storage(address, &key, &value);
            }
            Operation::SetTransientState => {
                let (address, key, value) = (address()?, key()?, value()?);
                self.set_transient(address, &key, &value);
            }

            Operation::Exist => {
                self.exists(&address()?);
            }
            Operation::Empty => {
                self.info(&address()?).map_or(true, AccountInfo::is_empty);
            }
            Operation::GetBalance => {
                self.balance(&address()?);
            }
            Operation::GetNonce => {
                self.nonce(&address()?);
            }
            Operation::GetCodeHash => {
                self.info(&address()?)
                    .map_or(KECCAK_EMPTY, |info| info.code_hash);
            }
            Operation::GetCode | Operation::GetCodeSize => {
                self.code_size(&address()?);
            }
            Operation::HasSuicided => {
                self.has_suicided(&address()?);
            }
            Operation::GetState => {
                let (address, key) = (address()?, key()?);
                self.storage(&address, &key);
            }
            Operation::GetCommittedState => {
                let (address, key) = (address()?, key()?);
                self.committed_storage(&address, &key);
            }
            Operation::GetTransientState => {
                let (address, key) = (address()?, key()?);
                self.transient_storage(&address, &key);
            }
        }
        if !matches!(
            op,
            Operation::CreateAccount
                | Operation::AddBalance
                | Operation::SubBalance
                | Operation::SetNonce
                | Operation::SetCode
                | Operation::Suicide
                | Operation::SetState
                | Operation::SetTransientState
        ) && op.arity() > 0
        {
            self.stats.reads += 1;
        }
        Ok(())
    }

    fn prime(&mut self, num_contracts: u64) -> Result<(), Self::Error> {
        for index in 1..=num_contracts {
            let info = AccountInfo {
                balance: U256::from(self.rng.gen_range(0..ADD_BALANCE_RANGE)),
                ..AccountInfo::default()
            };
            self.db.insert_account_info(super::to_address(index), info);
        }
        debug!(accounts = num_contracts, "primed memory backend");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn to_slot(hash: &B256) -> U256 {
    U256::from_be_bytes(hash.0)
}
