//! Visvalingam–Whyatt line simplification.
//!
//! Repeatedly removes the interior point whose triangle with its two
//! neighbours has the smallest area until only the requested number of points
//! remain. The first and the last point are always kept.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, PartialEq)]
struct Candidate {
    area: f64,
    index: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // reversed: BinaryHeap pops the smallest area first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .area
            .total_cmp(&self.area)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn triangle_area(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs() / 2.0
}

/// Reduces `points` to at most `keep` points (never fewer than two).
pub fn visvalingam_keep(points: Vec<[f64; 2]>, keep: usize) -> Vec<[f64; 2]> {
    let n = points.len();
    let keep = keep.max(2);
    if n <= keep {
        return points;
    }

    let mut prev: Vec<usize> = (0..n).map(|i| i.wrapping_sub(1)).collect();
    let mut next: Vec<usize> = (1..=n).collect();
    let mut area = vec![f64::INFINITY; n];
    let mut removed = vec![false; n];
    let mut heap = BinaryHeap::with_capacity(n);

    for i in 1..n - 1 {
        area[i] = triangle_area(points[i - 1], points[i], points[i + 1]);
        heap.push(Candidate { area: area[i], index: i });
    }

    let mut remaining = n;
    while remaining > keep {
        let Some(Candidate { area: smallest, index }) = heap.pop() else {
            break;
        };
        // skip stale heap entries
        if removed[index] || smallest.to_bits() != area[index].to_bits() {
            continue;
        }
        removed[index] = true;
        remaining -= 1;

        let (p, q) = (prev[index], next[index]);
        next[p] = q;
        prev[q] = p;

        // neighbours never drop below the area just removed
        for j in [p, q] {
            if j == 0 || j == n - 1 {
                continue;
            }
            let updated = triangle_area(points[prev[j]], points[j], points[next[j]]).max(smallest);
            area[j] = updated;
            heap.push(Candidate { area: updated, index: j });
        }
    }

    points
        .into_iter()
        .zip(removed)
        .filter_map(|(point, gone)| (!gone).then_some(point))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_lines_are_untouched() {
        let line = vec![[0.0, 0.0], [0.5, 0.7], [1.0, 1.0]];
        assert_eq!(visvalingam_keep(line.clone(), 10), line);
    }

    #[test]
    fn test_collinear_points_go_first() {
        let line = vec![[0.0, 0.0], [0.25, 0.25], [0.5, 0.9], [0.75, 0.95], [1.0, 1.0]];
        let simplified = visvalingam_keep(line, 3);
        assert_eq!(simplified, vec![[0.0, 0.0], [0.5, 0.9], [1.0, 1.0]]);
    }

    #[test]
    fn test_keeps_endpoints_and_budget() {
        let line: Vec<[f64; 2]> = (0..=1000)
            .map(|i| {
                let x = i as f64 / 1000.0;
                [x, 1.0 - (1.0 - x).powi(4)]
            })
            .collect();
        let simplified = visvalingam_keep(line, 50);
        assert_eq!(simplified.len(), 50);
        assert_eq!(simplified[0], [0.0, 0.0]);
        assert_eq!(simplified[49], [1.0, 1.0]);
        assert!(simplified.windows(2).all(|w| w[0][0] < w[1][0]));
    }
}
