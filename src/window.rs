//! Bounded sliding sample window and prediction history.
//!
//! Two instantiations of the teacher's `RingBuffer` drop-oldest pattern
//! (`broker/ring_buffer.rs`), generalized from `u8` scrollback bytes to
//! `f64` microvolt samples and `i8` classifier predictions.

use crate::constants::{DEFAULT_PREDICTION_CAPACITY, DEFAULT_SAMPLE_RATE, WINDOW_SIZE};
use std::collections::VecDeque;

/// Fixed-capacity, drop-oldest buffer of microvolt samples plus the
/// bookkeeping needed to know when a new classification is due.
#[derive(Debug)]
pub struct SignalWindow {
    samples: VecDeque<f64>,
    predictions: VecDeque<i8>,
    prediction_capacity: usize,
    sample_rate: u32,
    current_sample: u32,
    predict_ready: bool,
    total_count: u64,
}

impl Default for SignalWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_PREDICTION_CAPACITY)
    }
}

impl SignalWindow {
    /// Build a window with the given prediction cadence `R` and prediction
    /// history capacity `P`. Sample capacity is always [`WINDOW_SIZE`].
    #[must_use]
    pub fn new(sample_rate: u32, prediction_capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_SIZE),
            predictions: VecDeque::with_capacity(prediction_capacity),
            prediction_capacity,
            sample_rate: sample_rate.max(1),
            current_sample: 0,
            predict_ready: false,
            total_count: 0,
        }
    }

    /// Append one microvolt sample, evicting the oldest if full.
    pub fn add(&mut self, microvolts: f64) {
        if self.samples.len() == WINDOW_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(microvolts);
        self.current_sample += 1;
        self.total_count += 1;
        if self.current_sample >= self.sample_rate {
            self.predict_ready = self.samples.len() == WINDOW_SIZE;
        }
    }

    /// True once `R` samples have accumulated since the last prediction and
    /// the window is full.
    #[must_use]
    pub fn predict_ready(&self) -> bool {
        self.predict_ready
    }

    /// Current number of buffered samples (`<= WINDOW_SIZE`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no samples have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples ever appended (not bounded, monotone).
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Contiguous copy of the current window, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Record a new classification outcome, evicting the oldest prediction
    /// if at capacity, and reset the prediction-ready cadence.
    pub fn push_prediction(&mut self, prediction: i8) {
        if self.predictions.len() == self.prediction_capacity {
            self.predictions.pop_front();
        }
        self.predictions.push_back(prediction);
        self.current_sample = 0;
        self.predict_ready = false;
    }

    /// Predictions in insertion order (oldest first).
    #[must_use]
    pub fn predictions(&self) -> Vec<i8> {
        self.predictions.iter().copied().collect()
    }

    /// Weighted-prior confidence: `w_i = 1/P`, running weight starting at
    /// `w_i` and incrementing by `w_i` each step, so predictions later in
    /// history are weighted more heavily (`{w_i, 2w_i, 3w_i, ...}`).
    #[must_use]
    pub fn confidence(&self) -> f64 {
        let p = self.predictions.len();
        if p == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let w_i = 1.0 / p as f64;
        self.predictions
            .iter()
            .enumerate()
            .map(|(i, &pred)| {
                #[allow(clippy::cast_precision_loss)]
                let weight = w_i * (i + 1) as f64;
                f64::from(pred) * weight
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_evicts_oldest_past_capacity() {
        let mut w = SignalWindow::default();
        for i in 0..(WINDOW_SIZE + 10) {
            w.add(i as f64);
        }
        assert_eq!(w.len(), WINDOW_SIZE);
        assert_eq!(w.samples().first().copied().unwrap(), 10.0);
    }

    #[test]
    fn predict_ready_requires_full_window_and_cadence() {
        let mut w = SignalWindow::new(2, 5);
        for _ in 0..(WINDOW_SIZE - 1) {
            w.add(1.0);
        }
        assert!(!w.predict_ready(), "window not yet full");
        w.add(1.0);
        w.add(1.0);
        assert!(w.predict_ready());
    }

    #[test]
    fn push_prediction_resets_cadence_and_bounds_history() {
        let mut w = SignalWindow::new(1, 3);
        w.push_prediction(1);
        w.push_prediction(1);
        w.push_prediction(-1);
        w.push_prediction(1);
        assert_eq!(w.predictions().len(), 3);
        assert!(!w.predict_ready());
    }

    #[test]
    fn confidence_zero_with_no_predictions() {
        let w = SignalWindow::default();
        assert_eq!(w.confidence(), 0.0);
    }

    #[test]
    fn confidence_weights_recent_predictions_more_heavily() {
        let mut w = SignalWindow::new(1, 3);
        w.push_prediction(-1);
        w.push_prediction(-1);
        w.push_prediction(1);
        // w_i = 1/3; conf = -1*(1/3) + -1*(2/3) + 1*(3/3) = -1/3 -2/3 +1 = 0
        assert!((w.confidence() - 0.0).abs() < 1e-12);

        let mut w2 = SignalWindow::new(1, 3);
        w2.push_prediction(1);
        w2.push_prediction(1);
        w2.push_prediction(1);
        // conf = 1*(1/3+2/3+3/3) = 2.0
        assert!((w2.confidence() - 2.0).abs() < 1e-12);
    }
}
