//! Dense index generator with a private recency window.

use std::collections::VecDeque;

use rand::Rng;

use crate::error::{Result, StochasticError};
use crate::exponential;
use crate::statistics::{AccessClass, KahanSum, MIN_CARDINALITY, QUEUE_LEN};

/// Exponential draws tried for a random index before falling back to uniform draws.
const MAX_EXPONENTIAL_DRAWS: usize = 1_000;

/// Samples indices of a key set of cardinality `n`.
///
/// Internally the generator works on slots `0..n`; the external index of a
/// slot is `slot + 1`.
#[derive(Debug, Clone)]
pub struct RandomAccess {
    num_elem: u64,
    lambda: f64,
    /// Most recent slot first; always holds `QUEUE_LEN` slots.
    queue: VecDeque<u64>,
    qpdf: Vec<f64>,
}

impl RandomAccess {
    /// Creates a generator for `num_elem` keys.
    ///
    /// `qpdf` is the recency-position distribution (padded or cut to the
    /// window length). Returns `None` if `num_elem` is below
    /// [`MIN_CARDINALITY`].
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        num_elem: u64,
        lambda: f64,
        qpdf: &[f64],
    ) -> Option<Self> {
        if num_elem < MIN_CARDINALITY {
            return None;
        }
        let queue = (0..QUEUE_LEN).map(|_| rng.gen_range(0..num_elem)).collect();
        let mut qpdf = qpdf.to_vec();
        qpdf.resize(QUEUE_LEN, 0.0);
        Some(Self {
            num_elem,
            lambda,
            queue,
            qpdf,
        })
    }

    /// Current number of keys.
    pub fn cardinality(&self) -> u64 {
        self.num_elem
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Slot accessed last.
    pub(crate) fn last_slot(&self) -> u64 {
        self.queue[0]
    }

    /// Returns the index of the next access of class `class`.
    ///
    /// `None` for [`AccessClass::NoArg`], for a recent access when the
    /// recency distribution has no mass beyond the head and when the index
    /// space is exhausted.
    pub fn next_index<R: Rng + ?Sized>(&mut self, class: AccessClass, rng: &mut R) -> Option<u64> {
        let slot = match class {
            AccessClass::NoArg => return None,
            AccessClass::ZeroValue => return Some(0),
            AccessClass::NewValue => {
                let slot = self.num_elem;
                self.num_elem = self.num_elem.checked_add(1)?;
                slot
            }
            AccessClass::PreviousValue => self.last_slot(),
            AccessClass::RecentValue => {
                let position = self.recent_position(rng)?;
                self.queue[position]
            }
            AccessClass::RandomValue => self.random_slot(rng),
        };
        self.place(slot);
        Some(slot + 1)
    }

    /// Removes one key from the set.
    ///
    /// The set shrinks from the top; window entries that fell out of range
    /// are replaced by fresh samples. Fails without changing the state if
    /// `index` is zero or out of range, or if the set would drop below
    /// [`MIN_CARDINALITY`].
    pub fn delete_index<R: Rng + ?Sized>(&mut self, index: u64, rng: &mut R) -> Result<()> {
        if index == 0 {
            return Err(StochasticError::ZeroIndex);
        }
        if index > self.num_elem {
            return Err(StochasticError::IndexOutOfRange {
                index,
                cardinality: self.num_elem,
            });
        }
        let remaining = self.num_elem - 1;
        if remaining < MIN_CARDINALITY {
            return Err(StochasticError::CardinalityTooLow(remaining));
        }

        self.num_elem = remaining;
        for i in 0..self.queue.len() {
            if self.queue[i] >= remaining {
                self.queue[i] = exponential::discrete_sample(rng, self.lambda, remaining);
            }
        }
        Ok(())
    }

    fn place(&mut self, slot: u64) {
        self.queue.push_front(slot);
        self.queue.truncate(QUEUE_LEN);
    }

    fn in_queue(&self, slot: u64) -> bool {
        self.queue.contains(&slot)
    }

    /// Draws a slot outside the recency window.
    fn random_slot<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        for _ in 0..MAX_EXPONENTIAL_DRAWS {
            let slot = exponential::discrete_sample(rng, self.lambda, self.num_elem);
            if !self.in_queue(slot) {
                return slot;
            }
        }
        // a steep distribution keeps hitting the window; the set is at least
        // ten windows large, so uniform draws terminate quickly
        loop {
            let slot = rng.gen_range(0..self.num_elem);
            if !self.in_queue(slot) {
                return slot;
            }
        }
    }

    /// Draws a window position in `1..QUEUE_LEN` from the recency distribution
    /// conditioned on not hitting the head.
    fn recent_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let factor = 1.0 - self.qpdf[0];
        if factor <= 0.0 {
            return None;
        }
        let last = (1..QUEUE_LEN).rev().find(|&i| self.qpdf[i] > 0.0)?;

        let r: f64 = rng.gen();
        let mut sum = KahanSum::new();
        for i in 1..QUEUE_LEN {
            if r <= sum.add(self.qpdf[i] / factor) {
                return Some(i);
            }
        }
        Some(last)
    }
}
