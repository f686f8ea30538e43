//! Bounded-memory merging digest for streaming quantile estimation.
//!
//! A `MergingDigest` summarizes an unbounded stream of weighted samples in a
//! fixed number of centroids, supporting approximate quantile queries whose
//! cost is independent of how many samples were ever inserted. Incoming
//! samples land in a small buffer and are periodically merged into the
//! centroid list, keeping insertion O(1) amortized.
//!
//! The centroid budget is governed by the `compression` parameter: a
//! centroid near quantile `q` may hold at most `4 * n * q * (1 - q) /
//! compression` weight, so resolution concentrates at the tails where
//! latency analysis needs it.

use std::cmp::Ordering;
use std::mem;

#[derive(Debug, Clone, Copy)]
struct Centroid {
    mean: f64,
    weight: f64,
}

/// Streaming quantile summary with a fixed centroid budget.
#[derive(Debug, Clone)]
pub struct MergingDigest {
    compression: f64,
    centroids: Vec<Centroid>,
    buffer: Vec<Centroid>,
    merged_weight: f64,
    buffered_weight: f64,
    min: f64,
    max: f64,
}

impl MergingDigest {
    /// Creates a digest with the given compression (centroid budget).
    ///
    /// Values below 20 are raised to 20; below that the summary degrades too
    /// far to be useful.
    pub fn new(compression: f64) -> Self {
        let compression = if compression.is_finite() {
            compression.max(20.0)
        } else {
            20.0
        };
        let buffer_capacity = compression as usize * 4;
        Self {
            compression,
            centroids: Vec::new(),
            buffer: Vec::with_capacity(buffer_capacity),
            merged_weight: 0.0,
            buffered_weight: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// The compression this digest was created with.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Inserts a weighted sample. Non-finite values and non-positive weights
    /// are ignored.
    pub fn add(&mut self, value: f64, weight: f64) {
        if !value.is_finite() || !weight.is_finite() || weight <= 0.0 {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.buffer.push(Centroid {
            mean: value,
            weight,
        });
        self.buffered_weight += weight;
        if self.buffer.len() >= self.buffer.capacity() {
            self.compress();
        }
    }

    /// Total weight inserted so far.
    pub fn count(&self) -> f64 {
        self.merged_weight + self.buffered_weight
    }

    /// Returns whether no samples have been inserted.
    pub fn is_empty(&self) -> bool {
        self.count() == 0.0
    }

    /// Smallest sample seen, if any.
    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Largest sample seen, if any.
    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Folds another digest into this one.
    pub fn merge(&mut self, other: &MergingDigest) {
        for centroid in other.centroids.iter().chain(other.buffer.iter()) {
            self.min = self.min.min(centroid.mean);
            self.max = self.max.max(centroid.mean);
            self.buffer.push(*centroid);
            self.buffered_weight += centroid.weight;
        }
        self.compress();
    }

    /// Approximate value at quantile `q` (clamped to [0, 1]), or `None` when
    /// the digest is empty.
    ///
    /// The result always lies within `[min, max]` of the inserted samples.
    pub fn quantile(&mut self, q: f64) -> Option<f64> {
        self.compress();
        if self.centroids.is_empty() {
            return None;
        }
        if self.centroids.len() == 1 {
            return Some(self.centroids[0].mean);
        }

        let q = q.clamp(0.0, 1.0);
        let target = q * self.merged_weight;

        // Piecewise-linear interpolation between centroid midpoints, pinned
        // to the observed extremes at either end.
        let mut cumulative = 0.0;
        let mut previous_position = 0.0;
        let mut previous_mean = self.min;
        for centroid in &self.centroids {
            let position = cumulative + centroid.weight / 2.0;
            if target <= position {
                let span = position - previous_position;
                let t = if span > 0.0 {
                    (target - previous_position) / span
                } else {
                    1.0
                };
                let value = previous_mean + t * (centroid.mean - previous_mean);
                return Some(value.clamp(self.min, self.max));
            }
            previous_position = position;
            previous_mean = centroid.mean;
            cumulative += centroid.weight;
        }
        Some(self.max)
    }

    /// Merges the buffer into the centroid list, enforcing the weight limit
    /// derived from the compression.
    fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let mut all = mem::take(&mut self.centroids);
        all.append(&mut self.buffer);
        all.sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap_or(Ordering::Equal));

        let total = self.merged_weight + self.buffered_weight;
        let mut merged: Vec<Centroid> = Vec::new();
        let mut weight_before = 0.0;
        for centroid in all {
            match merged.last_mut() {
                Some(last) => {
                    let proposed = last.weight + centroid.weight;
                    let midpoint_q = (weight_before + proposed / 2.0) / total;
                    let limit =
                        4.0 * total * midpoint_q * (1.0 - midpoint_q) / self.compression;
                    if proposed <= limit.max(1.0) {
                        last.mean += (centroid.mean - last.mean) * centroid.weight / proposed;
                        last.weight = proposed;
                    } else {
                        weight_before += last.weight;
                        merged.push(centroid);
                    }
                }
                None => merged.push(centroid),
            }
        }

        self.centroids = merged;
        self.merged_weight = total;
        self.buffered_weight = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest_has_no_quantile() {
        let mut digest = MergingDigest::new(100.0);
        assert!(digest.is_empty());
        assert_eq!(digest.quantile(0.5), None);
        assert_eq!(digest.min(), None);
        assert_eq!(digest.max(), None);
    }

    #[test]
    fn test_single_sample() {
        let mut digest = MergingDigest::new(100.0);
        digest.add(0.42, 1.0);
        assert_eq!(digest.quantile(0.0), Some(0.42));
        assert_eq!(digest.quantile(0.5), Some(0.42));
        assert_eq!(digest.quantile(1.0), Some(0.42));
    }

    #[test]
    fn test_quantile_within_inserted_bounds() {
        let mut digest = MergingDigest::new(50.0);
        // Deterministic but scrambled insertion order.
        for i in 0..10_000u64 {
            let value = ((i * 2_654_435_761) % 10_000) as f64 / 100.0;
            digest.add(value, 1.0);
        }
        let min = digest.min().unwrap();
        let max = digest.max().unwrap();
        for q in [0.0, 0.001, 0.01, 0.25, 0.5, 0.75, 0.95, 0.99, 0.999, 1.0] {
            let value = digest.quantile(q).unwrap();
            assert!(
                value >= min && value <= max,
                "quantile({q}) = {value} escaped [{min}, {max}]"
            );
        }
    }

    #[test]
    fn test_quantile_accuracy_on_uniform_stream() {
        let mut digest = MergingDigest::new(100.0);
        for i in 1..=10_000 {
            digest.add(i as f64, 1.0);
        }
        let median = digest.quantile(0.5).unwrap();
        assert!((median - 5_000.0).abs() < 250.0, "median was {median}");
        let p95 = digest.quantile(0.95).unwrap();
        assert!((p95 - 9_500.0).abs() < 250.0, "p95 was {p95}");
    }

    #[test]
    fn test_quantiles_are_monotone() {
        let mut digest = MergingDigest::new(100.0);
        for i in 0..5_000u64 {
            digest.add(((i * 48_271) % 5_000) as f64, 1.0);
        }
        let mut previous = f64::NEG_INFINITY;
        for i in 0..=20 {
            let value = digest.quantile(i as f64 / 20.0).unwrap();
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_memory_stays_bounded() {
        let mut digest = MergingDigest::new(100.0);
        for i in 0..100_000 {
            digest.add((i % 977) as f64, 1.0);
        }
        // Force a flush so the buffer does not hide anything.
        let _ = digest.quantile(0.5);
        assert!(digest.centroids.len() < 2_000);
        assert!((digest.count() - 100_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_combines_streams() {
        let mut left = MergingDigest::new(100.0);
        let mut right = MergingDigest::new(100.0);
        for i in 0..1_000 {
            left.add(i as f64, 1.0);
            right.add((i + 1_000) as f64, 1.0);
        }
        left.merge(&right);
        assert!((left.count() - 2_000.0).abs() < f64::EPSILON);
        assert_eq!(left.min(), Some(0.0));
        assert_eq!(left.max(), Some(1_999.0));
        let median = left.quantile(0.5).unwrap();
        assert!((median - 1_000.0).abs() < 100.0, "median was {median}");
    }

    #[test]
    fn test_ignores_junk_samples() {
        let mut digest = MergingDigest::new(100.0);
        digest.add(f64::NAN, 1.0);
        digest.add(f64::INFINITY, 1.0);
        digest.add(1.0, 0.0);
        digest.add(1.0, -3.0);
        assert!(digest.is_empty());
    }

    #[test]
    fn test_weighted_samples_shift_quantiles() {
        let mut digest = MergingDigest::new(100.0);
        digest.add(1.0, 9.0);
        digest.add(10.0, 1.0);
        let median = digest.quantile(0.5).unwrap();
        assert!(median < 5.0, "median {median} should lean toward the heavy sample");
    }
}
