//! Fixed-capacity trailing window of raw samples.
//!
//! Where the merging digest gives stable long-horizon quantiles, the window
//! gives the controller a responsive, low-lag error signal: it holds only
//! the most recent samples and computes their quantile exactly, so a fresh
//! latency spike is visible immediately instead of being smoothed away by
//! history.

/// Ring buffer of the most recent `capacity` samples, overwritten
/// oldest-first.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    capacity: usize,
    samples: Vec<f64>,
    next: usize,
}

impl TrailingWindow {
    /// Creates an empty window. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
            next: 0,
        }
    }

    /// Inserts a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % self.capacity;
        }
    }

    /// Number of samples currently resident.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exact empirical quantile of only the resident samples, by
    /// sort-and-interpolate over a copy. `None` when the window is empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let q = q.clamp(0.0, 1.0);
        let position = q * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        if lower == upper {
            return Some(sorted[lower]);
        }
        let fraction = position - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_no_quantile() {
        let window = TrailingWindow::new(10);
        assert!(window.is_empty());
        assert_eq!(window.quantile(0.95), None);
    }

    #[test]
    fn test_exact_quantile_without_wrap() {
        let mut window = TrailingWindow::new(10);
        for value in [5.0, 1.0, 3.0] {
            window.push(value);
        }
        assert_eq!(window.quantile(0.0), Some(1.0));
        assert_eq!(window.quantile(0.5), Some(3.0));
        assert_eq!(window.quantile(1.0), Some(5.0));
    }

    #[test]
    fn test_exactly_capacity_samples() {
        let mut window = TrailingWindow::new(5);
        for value in [2.0, 4.0, 6.0, 8.0, 10.0] {
            window.push(value);
        }
        assert_eq!(window.len(), 5);
        assert_eq!(window.quantile(0.0), Some(2.0));
        assert_eq!(window.quantile(0.25), Some(4.0));
        assert_eq!(window.quantile(1.0), Some(10.0));
    }

    #[test]
    fn test_wrap_keeps_only_most_recent() {
        let mut window = TrailingWindow::new(3);
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            window.push(value);
        }
        // 1.0 and 2.0 were overwritten oldest-first.
        assert_eq!(window.len(), 3);
        assert_eq!(window.quantile(0.0), Some(3.0));
        assert_eq!(window.quantile(0.5), Some(4.0));
        assert_eq!(window.quantile(1.0), Some(5.0));
    }

    #[test]
    fn test_interpolation_between_order_statistics() {
        let mut window = TrailingWindow::new(4);
        for value in [0.0, 10.0] {
            window.push(value);
        }
        assert_eq!(window.quantile(0.5), Some(5.0));
        assert_eq!(window.quantile(0.95), Some(9.5));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut window = TrailingWindow::new(0);
        assert_eq!(window.capacity(), 1);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.quantile(0.5), Some(2.0));
    }
}
