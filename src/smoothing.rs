//! Rolling confidence window: fixed-capacity FIFO of recent probabilities.
//! Average is recomputed from the retained values on every push.

use std::collections::VecDeque;

/// Bounded window of the last `capacity` probabilities for one class.
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SmoothingWindow {
    /// Create an empty window. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a probability, evicting the oldest when over capacity.
    /// Returns the mean of the retained values.
    #[inline]
    pub fn push(&mut self, probability: f32) -> f32 {
        self.samples.push_back(probability);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.average()
    }

    /// Arithmetic mean of the retained values (0.0 when empty).
    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&p| p as f64).sum();
        (sum / self.samples.len() as f64) as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_mean(values: &[f32]) -> f32 {
        values.iter().sum::<f32>() / values.len() as f32
    }

    #[test]
    fn first_push_returns_that_value() {
        let mut w = SmoothingWindow::new(5);
        assert!((w.push(0.4) - 0.4).abs() < 1e-6);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn length_never_exceeds_capacity_and_mean_matches_naive() {
        let mut w = SmoothingWindow::new(5);
        let inputs = [0.1, 0.9, 0.3, 0.75, 0.2, 0.6, 1.0, 0.0, 0.45, 0.8, 0.33, 0.5];
        let mut history: Vec<f32> = Vec::new();
        for &p in &inputs {
            history.push(p);
            let avg = w.push(p);
            assert!(w.len() <= 5);
            let start = history.len().saturating_sub(5);
            let expected = naive_mean(&history[start..]);
            assert!((avg - expected).abs() < 1e-5, "avg {avg} expected {expected}");
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut w = SmoothingWindow::new(3);
        for p in [0.1, 0.2, 0.3, 0.4] {
            w.push(p);
        }
        let kept: Vec<f32> = w.values().collect();
        assert_eq!(kept, vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn zero_capacity_behaves_as_single_slot() {
        let mut w = SmoothingWindow::new(0);
        w.push(0.2);
        let avg = w.push(0.8);
        assert_eq!(w.capacity(), 1);
        assert!((avg - 0.8).abs() < 1e-6);
    }
}
