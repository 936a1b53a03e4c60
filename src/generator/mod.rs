//! Index generators used by the replay engine.
//!
//! Given an [`AccessClass`](crate::statistics::AccessClass), a generator
//! returns the index of the next key to access. Indices are external: `0` is
//! the zero key and `1..=n` address the `n` live keys of the set.
//!
//! - [`RandomAccess`] serves storage keys and values. Its index set only grows
//!   or shrinks at the top, so indices are dense.
//! - [`IndirectAccess`] serves contract addresses. Contracts can be deleted
//!   anywhere in the set, so it hands out stable logical ids on top of a
//!   [`RandomAccess`] and never reuses them.

mod indirect_access;
mod random_access;

pub use indirect_access::IndirectAccess;
pub use random_access::RandomAccess;
