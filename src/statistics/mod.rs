//! Access statistics for contract addresses, storage keys and storage values.
//!
//! Every key seen by the recorder is labelled with an [`AccessClass`] that
//! describes how "fresh" it is relative to the recorded history:
//!
//! - [`AccessClass::ZeroValue`]: the all-zero key (never tracked)
//! - [`AccessClass::NewValue`]: never observed before
//! - [`AccessClass::PreviousValue`]: the most recent access of this kind
//! - [`AccessClass::RecentValue`]: inside the recency window, but not the head
//! - [`AccessClass::RandomValue`]: observed before, outside the recency window
//!
//! [`AccessStats`] composes a [`Queuing`] recency window with a [`Counting`]
//! frequency table to produce these labels.

mod counting;
mod queuing;
pub mod simplify;

pub use counting::Counting;
pub use queuing::Queuing;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Length of the recency window.
///
/// Fixed at compile time so that position-frequency vectors have a constant
/// width across recordings, models and index generators.
pub const QUEUE_LEN: usize = 32;

/// Number of points kept in an empirical cumulative distribution.
pub const NUM_DISTRIBUTION_POINTS: usize = 100;

/// Smallest index-set cardinality an index generator accepts.
///
/// Sampling a [`AccessClass::RandomValue`] rejects indices inside the recency
/// window, so the set must be substantially larger than the window.
pub const MIN_CARDINALITY: u64 = 10 * QUEUE_LEN as u64;

/// Number of access classes (including [`AccessClass::NoArg`]).
pub const NUM_CLASSES: usize = 6;

/// Classification of a simulation argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccessClass {
    /// The operation has no argument in this slot.
    NoArg = 0,
    /// The all-zero key.
    ZeroValue = 1,
    /// A key never observed before.
    NewValue = 2,
    /// The immediately preceding key of this kind.
    PreviousValue = 3,
    /// A key inside the recency window other than the head.
    RecentValue = 4,
    /// A known key outside the recency window.
    RandomValue = 5,
}

impl AccessClass {
    /// All classes in id order.
    pub const ALL: [AccessClass; NUM_CLASSES] = [
        AccessClass::NoArg,
        AccessClass::ZeroValue,
        AccessClass::NewValue,
        AccessClass::PreviousValue,
        AccessClass::RecentValue,
        AccessClass::RandomValue,
    ];

    /// Numeric id used by the Horner encoding.
    pub fn id(self) -> usize {
        self as usize
    }

    /// Looks a class up by its numeric id.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Opcode letter of the class; `NoArg` has none.
    pub fn mnemonic(self) -> Option<char> {
        match self {
            AccessClass::NoArg => None,
            AccessClass::ZeroValue => Some('z'),
            AccessClass::NewValue => Some('n'),
            AccessClass::PreviousValue => Some('p'),
            AccessClass::RecentValue => Some('q'),
            AccessClass::RandomValue => Some('r'),
        }
    }

    /// Parses an opcode letter.
    pub fn from_mnemonic(c: char) -> Option<Self> {
        match c {
            'z' => Some(AccessClass::ZeroValue),
            'n' => Some(AccessClass::NewValue),
            'p' => Some(AccessClass::PreviousValue),
            'q' => Some(AccessClass::RecentValue),
            'r' => Some(AccessClass::RandomValue),
            _ => None,
        }
    }
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessClass::NoArg => "no-arg",
            AccessClass::ZeroValue => "zero",
            AccessClass::NewValue => "new",
            AccessClass::PreviousValue => "previous",
            AccessClass::RecentValue => "recent",
            AccessClass::RandomValue => "random",
        };
        f.write_str(name)
    }
}

/// Serialized access statistics of one key kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatsJson {
    /// Number of distinct keys observed.
    pub num_keys: u64,
    /// Empirical cumulative distribution of key frequencies.
    pub ecdf: Vec<[f64; 2]>,
    /// Probability of finding a key at each recency-window position.
    pub queuing_distribution: Vec<f64>,
}

/// Classifier for one key kind.
///
/// The zero key (`K::default()`) is a sentinel: it classifies as
/// [`AccessClass::ZeroValue`] and is never placed into either structure.
#[derive(Debug, Clone)]
pub struct AccessStats<K> {
    counting: Counting<K>,
    queuing: Queuing<K>,
}

impl<K> AccessStats<K>
where
    K: Clone + Eq + Hash + Default,
{
    pub fn new() -> Self {
        Self {
            counting: Counting::new(),
            queuing: Queuing::new(),
        }
    }

    /// Classifies `key` against the history placed so far.
    ///
    /// Must be called before [`AccessStats::place`] for the same access.
    /// A hit in the recency window is counted towards the position
    /// distribution.
    pub fn classify(&mut self, key: &K) -> AccessClass {
        if *key == K::default() {
            return AccessClass::ZeroValue;
        }
        match self.queuing.find(key) {
            Some(0) => AccessClass::PreviousValue,
            Some(_) => AccessClass::RecentValue,
            None if self.counting.exists(key) => AccessClass::RandomValue,
            None => AccessClass::NewValue,
        }
    }

    /// Records an access of `key`.
    pub fn place(&mut self, key: K) {
        if key == K::default() {
            return;
        }
        // keys still inside the window are not counted twice
        if self.queuing.position(&key).is_none() {
            self.counting.place(key.clone());
        }
        self.queuing.place(key);
    }

    pub fn counting(&self) -> &Counting<K> {
        &self.counting
    }

    pub fn queuing(&self) -> &Queuing<K> {
        &self.queuing
    }

    /// Produces the serialized form (ECDF and recency distribution).
    pub fn to_json(&self) -> AccessStatsJson {
        AccessStatsJson {
            num_keys: self.counting.len() as u64,
            ecdf: self.counting.ecdf(),
            queuing_distribution: self.queuing.distribution(),
        }
    }
}

impl<K> Default for AccessStats<K>
where
    K: Clone + Eq + Hash + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Kahan compensated accumulator; [`KahanSum::add`] returns the running sum.
///
/// Accumulated probabilities can mix very small and very large terms; the
/// compensation keeps the running sum from drifting.
pub(crate) struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    pub(crate) fn new() -> Self {
        Self {
            sum: 0.0,
            compensation: 0.0,
        }
    }

    pub(crate) fn add(&mut self, value: f64) -> f64 {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
        self.sum
    }

    pub(crate) fn sum(&self) -> f64 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn address(i: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&i.to_be_bytes());
        Address::from(bytes)
    }

    #[test]
    fn test_zero_value_is_never_tracked() {
        let mut stats = AccessStats::<Address>::new();
        assert_eq!(stats.classify(&Address::ZERO), AccessClass::ZeroValue);
        stats.place(Address::ZERO);
        assert_eq!(stats.classify(&Address::ZERO), AccessClass::ZeroValue);
        assert_eq!(stats.counting().len(), 0);
        assert_eq!(stats.queuing().position(&Address::ZERO), None);
    }

    #[test]
    fn test_classification_sequence() {
        let mut stats = AccessStats::<B256>::new();
        let a = B256::repeat_byte(1);
        let b = B256::repeat_byte(2);

        assert_eq!(stats.classify(&a), AccessClass::NewValue);
        stats.place(a);
        assert_eq!(stats.classify(&a), AccessClass::PreviousValue);
        stats.place(a);

        assert_eq!(stats.classify(&b), AccessClass::NewValue);
        stats.place(b);
        assert_eq!(stats.classify(&b), AccessClass::PreviousValue);
        assert_eq!(stats.classify(&a), AccessClass::RecentValue);
        stats.place(a);
        assert_eq!(stats.classify(&a), AccessClass::PreviousValue);
    }

    #[test]
    fn test_most_recent_key_is_previous() {
        let mut stats = AccessStats::<Address>::new();
        for i in [5u64, 3, 9, 3, 1, 77, 5, 5, 12] {
            stats.place(address(i));
            assert_eq!(stats.classify(&address(i)), AccessClass::PreviousValue);
        }
    }

    #[test]
    fn test_window_eviction() {
        let k = 5;
        let mut stats = AccessStats::<Address>::new();
        for i in 1..=(QUEUE_LEN + k) as u64 {
            stats.place(address(i));
        }
        for i in 1..=k as u64 {
            assert_eq!(stats.classify(&address(i)), AccessClass::RandomValue);
        }
        assert_eq!(
            stats.classify(&address(k as u64 + 1)),
            AccessClass::RecentValue
        );
        assert_eq!(stats.classify(&address(10_000)), AccessClass::NewValue);
    }

    #[test]
    fn test_keys_in_window_are_counted_once() {
        let mut stats = AccessStats::<Address>::new();
        stats.place(address(1));
        stats.place(address(2));
        stats.place(address(1));
        assert_eq!(stats.counting().frequency(&address(1)), 1);

        // push address 1 out of the window and bring it back
        for i in 100..100 + QUEUE_LEN as u64 {
            stats.place(address(i));
        }
        stats.place(address(1));
        assert_eq!(stats.counting().frequency(&address(1)), 2);
    }

    #[test]
    fn test_json_has_full_window_width() {
        let mut stats = AccessStats::<Address>::new();
        stats.place(address(1));
        stats.classify(&address(1));
        let json = stats.to_json();
        assert_eq!(json.num_keys, 1);
        assert_eq!(json.queuing_distribution.len(), QUEUE_LEN);
        assert_eq!(json.queuing_distribution[0], 1.0);
        assert_eq!(json.ecdf.first(), Some(&[0.0, 0.0]));
        assert_eq!(json.ecdf.last(), Some(&[1.0, 1.0]));
    }

    #[test]
    fn test_class_mnemonics_round_trip() {
        for class in AccessClass::ALL {
            match class.mnemonic() {
                Some(c) => assert_eq!(AccessClass::from_mnemonic(c), Some(class)),
                None => assert_eq!(class, AccessClass::NoArg),
            }
            assert_eq!(AccessClass::from_id(class.id()), Some(class));
        }
    }
}
