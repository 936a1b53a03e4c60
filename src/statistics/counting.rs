//! Frequency table over all distinct keys ever placed.

use std::collections::HashMap;
use std::hash::Hash;

use super::simplify::visvalingam_keep;
use super::{KahanSum, NUM_DISTRIBUTION_POINTS};

/// Counts how often each key was placed.
#[derive(Debug, Clone)]
pub struct Counting<K> {
    freq: HashMap<K, u64>,
}

impl<K: Eq + Hash> Counting<K> {
    pub fn new() -> Self {
        Self {
            freq: HashMap::new(),
        }
    }

    pub fn place(&mut self, key: K) {
        *self.freq.entry(key).or_insert(0) += 1;
    }

    pub fn exists(&self, key: &K) -> bool {
        self.freq.contains_key(key)
    }

    pub fn frequency(&self, key: &K) -> u64 {
        self.freq.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// Empirical cumulative distribution of key frequencies.
    ///
    /// See [`Counting::ecdf_with_points`]; keeps [`NUM_DISTRIBUTION_POINTS`].
    pub fn ecdf(&self) -> Vec<[f64; 2]> {
        self.ecdf_with_points(NUM_DISTRIBUTION_POINTS)
    }

    /// Empirical cumulative distribution reduced to at most `num_points` points.
    ///
    /// Keys are ranked by descending frequency; the `i`-th key sits at
    /// `x = (i + 0.5) / n` with the accumulated probability of all keys up to
    /// and including it. The curve always starts at `(0, 0)` and ends at
    /// `(1, 1)`. Without keys the result is empty.
    pub fn ecdf_with_points(&self, num_points: usize) -> Vec<[f64; 2]> {
        let num_keys = self.freq.len();
        if num_keys == 0 {
            return Vec::new();
        }

        let mut frequencies: Vec<u64> = self.freq.values().copied().collect();
        frequencies.sort_unstable_by(|a, b| b.cmp(a));
        let total: u64 = frequencies.iter().sum();

        let mut points = Vec::with_capacity(num_keys + 2);
        points.push([0.0, 0.0]);
        let mut sum = KahanSum::new();
        for (i, &freq) in frequencies.iter().enumerate() {
            let x = (i as f64 + 0.5) / num_keys as f64;
            let y = sum.add(freq as f64 / total as f64);
            points.push([x, y]);
        }
        points.push([1.0, 1.0]);

        visvalingam_keep(points, num_points)
    }
}

impl<K: Eq + Hash> Default for Counting<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_and_exists() {
        let mut counting = Counting::new();
        assert!(!counting.exists(&1u32));
        counting.place(1u32);
        counting.place(1u32);
        counting.place(2u32);
        assert!(counting.exists(&1));
        assert!(counting.exists(&2));
        assert!(!counting.exists(&3));
        assert_eq!(counting.frequency(&1), 2);
        assert_eq!(counting.len(), 2);
    }

    #[test]
    fn test_empty_ecdf() {
        let counting = Counting::<u32>::new();
        assert!(counting.ecdf().is_empty());
    }

    #[test]
    fn test_single_key_ecdf() {
        let mut counting = Counting::new();
        counting.place(42u32);
        assert_eq!(counting.ecdf(), vec![[0.0, 0.0], [0.5, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn test_ecdf_ranks_by_frequency() {
        let mut counting = Counting::new();
        for _ in 0..3 {
            counting.place(1u32);
        }
        counting.place(2u32);
        let ecdf = counting.ecdf();
        assert_eq!(ecdf.len(), 4);
        assert_eq!(ecdf[1], [0.25, 0.75]);
        assert_eq!(ecdf[2], [0.75, 1.0]);
    }

    #[test]
    fn test_ecdf_shape() {
        let mut counting = Counting::new();
        for key in 0..5_000u64 {
            // a skewed frequency profile
            for _ in 0..(1 + 5_000 / (key + 1)) {
                counting.place(key);
            }
        }
        let ecdf = counting.ecdf();
        assert!(ecdf.len() <= NUM_DISTRIBUTION_POINTS);
        assert_eq!(ecdf.first(), Some(&[0.0, 0.0]));
        assert_eq!(ecdf.last(), Some(&[1.0, 1.0]));
        for pair in ecdf.windows(2) {
            assert!(pair[0][0] <= pair[1][0]);
            assert!(pair[0][1] <= pair[1][1]);
        }
    }
}
