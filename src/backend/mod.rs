//! State backends: the boundary a replay dispatches its operations to.
//!
//! A backend receives [`ReplayStep`]s, which name their arguments by index.
//! Indices are turned into state keys with [`to_address`] and [`to_hash`];
//! index 0 is the zero address/hash.
//!
//! - [`MemoryBackend`]: reference backend on top of revm's in-memory `CacheDB`
//! - [`EventProxy`]: records every step into an event registry and forwards it
//!
//! # Implementing a New Backend
//!
//! ```ignore
//! use db_stochastic::backend::{ReplayStep, StateBackend};
//!
//! pub struct MyBackend { /* ... */ }
//!
//! impl StateBackend for MyBackend {
//!     type Error = std::io::Error;
//!
//!     fn dispatch(&mut self, step: &ReplayStep) -> Result<(), Self::Error> {
//!         // apply step.op to the database under test
//!         todo!()
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "my-backend"
//!     }
//! }
//! ```

mod memory;
mod proxy;

pub use memory::{BackendError, MemoryBackend};
pub use proxy::EventProxy;

use std::fmt;

use alloy_primitives::{Address, B256};

use crate::operation::Operation;

/// One operation of a trace, with its arguments as indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStep {
    pub op: Operation,
    /// Contract index.
    pub address: Option<u64>,
    /// Storage-key index.
    pub key: Option<u64>,
    /// Storage-value index.
    pub value: Option<u64>,
    /// For a revert: how many snapshots beyond the most recent one are unwound.
    pub snapshot_delta: Option<usize>,
}

impl ReplayStep {
    /// A step without arguments.
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            address: None,
            key: None,
            value: None,
            snapshot_delta: None,
        }
    }

    pub fn with_address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_snapshot_delta(mut self, delta: usize) -> Self {
        self.snapshot_delta = Some(delta);
        self
    }

    /// Contract address argument.
    pub fn contract(&self) -> Option<Address> {
        self.address.map(to_address)
    }

    /// Storage-key argument.
    pub fn storage_key(&self) -> Option<B256> {
        self.key.map(to_hash)
    }

    /// Storage-value argument.
    pub fn storage_value(&self) -> Option<B256> {
        self.value.map(to_hash)
    }
}

impl fmt::Display for ReplayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op.mnemonic())?;
        if let Some(address) = self.address {
            write!(f, " addr-idx: {address}")?;
        }
        if let Some(key) = self.key {
            write!(f, " key-idx: {key}")?;
        }
        if let Some(value) = self.value {
            write!(f, " value-idx: {value}")?;
        }
        if let Some(delta) = self.snapshot_delta {
            write!(f, " delta: {delta}")?;
        }
        Ok(())
    }
}

/// Converts a contract index to an address (big-endian in the low-order bytes).
pub fn to_address(index: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&index.to_be_bytes());
    Address::from(bytes)
}

/// Converts a key or value index to a hash (big-endian in the low-order bytes).
pub fn to_hash(index: u64) -> B256 {
    B256::left_padding_from(&index.to_be_bytes())
}

/// A state database driven by a replay.
pub trait StateBackend {
    /// Error reported by the database under test.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Applies one operation.
    fn dispatch(&mut self, step: &ReplayStep) -> Result<(), Self::Error>;

    /// Creates contracts `1..=num_contracts` before the replay starts.
    fn prime(&mut self, num_contracts: u64) -> Result<(), Self::Error> {
        let _ = num_contracts;
        Ok(())
    }

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str {
        "unknown"
    }
}

impl<B: StateBackend + ?Sized> StateBackend for &mut B {
    type Error = B::Error;

    fn dispatch(&mut self, step: &ReplayStep) -> Result<(), Self::Error> {
        (**self).dispatch(step)
    }

    fn prime(&mut self, num_contracts: u64) -> Result<(), Self::Error> {
        (**self).prime(num_contracts)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_conversion() {
        assert_eq!(to_address(0), Address::ZERO);
        assert_eq!(to_hash(0), B256::ZERO);
        assert_eq!(to_address(1).as_slice()[19], 1);
        assert_eq!(to_hash(0x0102).as_slice()[30..], [1, 2]);
        assert_ne!(to_address(1), to_address(256));
    }

    #[test]
    fn test_step_display() {
        let step = ReplayStep::new(Operation::SetState)
            .with_address(3)
            .with_key(4)
            .with_value(5);
        assert_eq!(step.to_string(), "SS addr-idx: 3 key-idx: 4 value-idx: 5");
        assert_eq!(step.contract(), Some(to_address(3)));
        assert_eq!(ReplayStep::new(Operation::BeginBlock).to_string(), "BB");
    }
}
