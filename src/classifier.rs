//! FFT-based seizure classifier and closed-loop therapy policy.
//!
//! The weights vector and intercept are fixed protocol constants (see
//! [`CLASSIFIER_WEIGHTS`] and [`crate::constants::CLASSIFIER_INTERCEPT`]).
//! See `DESIGN.md` for why the weight values here are a documented synthetic
//! substitute rather than a bit-identical reproduction of an unrecoverable
//! original.

use crate::constants::{CLASSIFIER_BINS, CLASSIFIER_INTERCEPT, WINDOW_SIZE};
use crate::window::SignalWindow;
use rustfft::{num_complex::Complex64, FftPlanner};

/// Fixed classifier weight vector, one per FFT bin (`CLASSIFIER_BINS` long).
///
/// Synthesized: a damped oscillation chosen so that a constant-amplitude
/// input signal (see [`test_signal`]) drives `score + intercept` positive,
/// satisfying scenario S4 structurally. See `DESIGN.md` Open Question 4.
pub const CLASSIFIER_WEIGHTS: [f64; CLASSIFIER_BINS] = [
    0.812, 0.774, 0.731, 0.695, 0.658, 0.624, 0.591, 0.560, 0.531, 0.503, 0.477, 0.452, 0.429,
    0.407, 0.386, 0.366, 0.347, 0.330, 0.313, 0.297, 0.282, 0.268, 0.254, 0.241, 0.229, 0.218,
    0.207, 0.196, 0.186, 0.177, 0.168, 0.160, 0.152, 0.144, 0.137, 0.130, 0.124, 0.117, 0.111,
    0.106, 0.100, 0.095, 0.091, 0.086, 0.082,
];

/// Runs the fixed-weight power-spectrum classifier over a [`SignalWindow`].
#[derive(Debug)]
pub struct Classifier {
    planner: FftPlanner<f64>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Build a new classifier. Holds an `rustfft` planner so repeated calls
    /// to [`Self::predict`] don't recompute the FFT plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Run one classification pass over `window`'s current samples.
    ///
    /// Returns `None` if the window is not ready to predict (not full, or
    /// cadence not yet reached); otherwise returns the raw
    /// `score + intercept` value plus whether it classifies positive
    /// (seizure-like). Does not mutate `window`; callers push the resulting
    /// `i8` prediction themselves via [`SignalWindow::push_prediction`].
    #[must_use]
    pub fn predict(&mut self, window: &SignalWindow) -> Option<(f64, bool)> {
        if window.len() != WINDOW_SIZE {
            return None;
        }
        let samples = window.samples();
        let mut buffer: Vec<Complex64> = samples.iter().map(|&s| Complex64::new(s, 0.0)).collect();

        let fft = self.planner.plan_fft_forward(WINDOW_SIZE);
        fft.process(&mut buffer);

        let score: f64 = buffer
            .iter()
            .take(CLASSIFIER_BINS)
            .zip(CLASSIFIER_WEIGHTS.iter())
            .map(|(bin, weight)| {
                let psd = (bin.re * bin.re + bin.im * bin.im).sqrt();
                weight * psd
            })
            .sum();

        let total = score + CLASSIFIER_INTERCEPT;
        Some((total, total > 0.0))
    }
}

/// 178-sample reference trace used in scenario S4: a large constant-amplitude
/// signal whose DC-dominated spectrum drives the classifier positive by the
/// time the window fills. See `DESIGN.md` Open Question 4 for provenance.
#[must_use]
pub fn test_signal() -> Vec<f64> {
    vec![50.0; WINDOW_SIZE]
}
