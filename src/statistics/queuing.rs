//! Fixed-capacity recency window.
//!
//! A ring buffer of the last [`QUEUE_LEN`] placed keys. Lookups scan from the
//! head (most recent) toward the tail and report the distance from the head.
//! Successful lookups are tallied per position so that the recorder can emit
//! the distribution of recency positions.
//!
//! ```text
//!   slots:  [k3, k4, k0, k1, k2]      head = 1 (k4 placed last)
//!   find(k4) = 0, find(k3) = 1, find(k2) = 2, ...
//! ```

use super::QUEUE_LEN;

/// Recency window over keys of type `K`.
///
/// Placing a key that is already present does not remove the older slot;
/// lookups stop at the first (most recent) occurrence, so only the head
/// position matters for classification.
#[derive(Debug, Clone)]
pub struct Queuing<K> {
    slots: Vec<Option<K>>,
    head: usize,
    position_freq: [u64; QUEUE_LEN],
}

impl<K: PartialEq> Queuing<K> {
    pub fn new() -> Self {
        Self {
            slots: (0..QUEUE_LEN).map(|_| None).collect(),
            // first placement lands in slot 0
            head: QUEUE_LEN - 1,
            position_freq: [0; QUEUE_LEN],
        }
    }

    /// Places `key` at the head, overwriting the oldest entry once full.
    pub fn place(&mut self, key: K) {
        self.head = (self.head + 1) % QUEUE_LEN;
        self.slots[self.head] = Some(key);
    }

    /// Finds `key` and counts the hit towards the position distribution.
    ///
    /// Returns the distance from the head (0 = placed last).
    pub fn find(&mut self, key: &K) -> Option<usize> {
        let pos = self.position(key)?;
        self.position_freq[pos] += 1;
        Some(pos)
    }

    /// Finds `key` without accounting.
    pub fn position(&self, key: &K) -> Option<usize> {
        (0..QUEUE_LEN).find(|&distance| {
            let slot = (self.head + QUEUE_LEN - distance) % QUEUE_LEN;
            self.slots[slot].as_ref() == Some(key)
        })
    }

    /// Hit counts per position.
    pub fn position_frequencies(&self) -> &[u64; QUEUE_LEN] {
        &self.position_freq
    }

    /// Relative hit frequency per position; all zeros without hits.
    pub fn distribution(&self) -> Vec<f64> {
        let total: u64 = self.position_freq.iter().sum();
        if total == 0 {
            return vec![0.0; QUEUE_LEN];
        }
        self.position_freq
            .iter()
            .map(|&freq| freq as f64 / total as f64)
            .collect()
    }
}

impl<K: PartialEq> Default for Queuing<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue() {
        let mut queue = Queuing::<u64>::new();
        assert_eq!(queue.find(&0), None);
        assert!(queue.distribution().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_find_positions() {
        let mut queue = Queuing::new();
        queue.place(0u64);
        assert_eq!(queue.find(&0), Some(0));
        assert_eq!(queue.find(&1), None);

        queue.place(1);
        assert_eq!(queue.find(&1), Some(0));
        assert_eq!(queue.find(&0), Some(1));
    }

    #[test]
    fn test_oldest_entry_is_overwritten() {
        let mut queue = Queuing::new();
        for i in 0..=QUEUE_LEN as u64 {
            queue.place(i);
        }
        assert_eq!(queue.find(&0), None);
        assert_eq!(queue.find(&1), Some(QUEUE_LEN - 1));
        assert_eq!(queue.find(&(QUEUE_LEN as u64)), Some(0));

        queue.place(QUEUE_LEN as u64 + 1);
        assert_eq!(queue.find(&1), None);
        assert_eq!(queue.find(&2), Some(QUEUE_LEN - 1));
    }

    #[test]
    fn test_duplicate_placement_reports_most_recent() {
        let mut queue = Queuing::new();
        queue.place(7u64);
        queue.place(8);
        queue.place(7);
        assert_eq!(queue.position(&7), Some(0));
        assert_eq!(queue.position(&8), Some(1));
    }

    #[test]
    fn test_position_does_not_count() {
        let mut queue = Queuing::new();
        queue.place(3u64);
        queue.position(&3);
        assert_eq!(queue.position_frequencies()[0], 0);
        queue.find(&3);
        assert_eq!(queue.position_frequencies()[0], 1);
    }

    #[test]
    fn test_distribution() {
        let mut queue = Queuing::<i64>::new();
        for i in 0..300i64 {
            queue.place(i);
            assert_eq!(queue.find(&i), Some(0));
            queue.find(&(i - 1));
            queue.find(&(i - 2));
            queue.find(&(i - 3));
        }
        let distribution = queue.distribution();
        assert_eq!(distribution.len(), QUEUE_LEN);

        // 300 hits at the head, 299/298/297 hits at positions 1..=3
        let total = (300 + 299 + 298 + 297) as f64;
        assert!((distribution[0] - 300.0 / total).abs() < 1e-15);
        assert!((distribution[3] - 297.0 / total).abs() < 1e-15);
        assert!(distribution[4..].iter().all(|&p| p == 0.0));
        assert!((distribution.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
