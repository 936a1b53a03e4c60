//! Stable-id index generator for key sets with deletions in the middle.

use rand::Rng;

use super::RandomAccess;
use crate::error::{Result, StochasticError};
use crate::statistics::AccessClass;

/// Maps the dense slots of a [`RandomAccess`] to logical ids.
///
/// The translation table is ordered by slot: entry `i` is the id living in
/// slot `i`. Deleting an id removes its entry and shifts the higher slots
/// down, so ids keep their rank. Ids are issued from a counter and are never
/// handed out twice.
#[derive(Debug, Clone)]
pub struct IndirectAccess {
    random_access: RandomAccess,
    translation: Vec<u64>,
    next_id: u64,
}

impl IndirectAccess {
    pub fn new(random_access: RandomAccess) -> Self {
        let n = random_access.cardinality();
        Self {
            translation: (1..=n).collect(),
            next_id: n + 1,
            random_access,
        }
    }

    /// Number of live ids.
    pub fn cardinality(&self) -> u64 {
        self.random_access.cardinality()
    }

    /// Returns the id of the next access of class `class`.
    pub fn next_index<R: Rng + ?Sized>(&mut self, class: AccessClass, rng: &mut R) -> Option<u64> {
        let index = self.random_access.next_index(class, rng)?;
        match class {
            AccessClass::NewValue => {
                let id = self.next_id;
                self.next_id = id.checked_add(1)?;
                self.translation.push(id);
                Some(id)
            }
            _ if index == 0 => Some(0),
            _ => self.translation.get((index - 1) as usize).copied(),
        }
    }

    /// Deletes a logical id.
    pub fn delete_index<R: Rng + ?Sized>(&mut self, id: u64, rng: &mut R) -> Result<()> {
        if id == 0 {
            return Err(StochasticError::ZeroIndex);
        }
        let slot = self
            .translation
            .iter()
            .position(|&live| live == id)
            .ok_or(StochasticError::UnknownIndex(id))?;
        self.random_access.delete_index(slot as u64 + 1, rng)?;
        self.translation.remove(slot);
        Ok(())
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: u64) -> bool {
        self.translation.contains(&id)
    }
}
