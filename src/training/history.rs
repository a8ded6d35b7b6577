//! Bounded heart-rate sample window.

use std::collections::VecDeque;

/// Number of samples kept for averaging.
pub const HISTORY_CAPACITY: usize = 20;

/// FIFO window over the most recent heart-rate samples.
#[derive(Debug, Clone)]
pub struct HeartRateHistory {
    /// Samples in arrival order, oldest first
    samples: VecDeque<f64>,
    /// Maximum number of samples kept
    capacity: usize,
}

impl HeartRateHistory {
    /// Create a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest when the window is full.
    pub fn push(&mut self, bpm: f64) {
        self.samples.push_back(bpm);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Arithmetic mean of the window, `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

impl Default for HeartRateHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_three() {
        let mut history = HeartRateHistory::default();
        for bpm in [60.0, 70.0, 80.0] {
            history.push(bpm);
        }
        assert_eq!(history.average(), Some(70.0));
    }

    #[test]
    fn test_empty_history_has_no_average() {
        let history = HeartRateHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.average(), None);
    }

    #[test]
    fn test_window_keeps_last_twenty_in_order() {
        let mut history = HeartRateHistory::default();
        for i in 0..35 {
            history.push(100.0 + i as f64);
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        let expected: Vec<f64> = (15..35).map(|i| 100.0 + i as f64).collect();
        assert_eq!(history.to_vec(), expected);
    }

    #[test]
    fn test_average_follows_eviction() {
        let mut history = HeartRateHistory::new(2);
        history.push(100.0);
        history.push(110.0);
        history.push(130.0);
        assert_eq!(history.average(), Some(120.0));
    }
}
