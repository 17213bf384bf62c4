// cl_pred.rs — prediction error reconciliation
//
// When the server confirms an input for which the client had already
// predicted a position, the difference becomes an error vector that is
// faded out linearly instead of snapping the view.

use q2vk_common::q_shared::{vector_subtract, Vec3, VEC3_ORIGIN};

/// How long a correction takes to fade, in ms.
pub const PREDICTION_ERROR_FADE_MS: i32 = 100;

/// Too-large errors mean a teleport or respawn; snap instead of fading.
const MAX_SMOOTHED_ERROR: f32 = 80.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionError {
    error: Vec3,
    set_time_ms: i32,
    active: bool,
}

impl PredictionError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the divergence between the server's authoritative position
    /// and what the client had predicted for the same input.
    pub fn reconcile(&mut self, authoritative: &Vec3, predicted: &Vec3, now_ms: i32) {
        let err = vector_subtract(authoritative, predicted);
        let len = (err[0] * err[0] + err[1] * err[1] + err[2] * err[2]).sqrt();
        if len > MAX_SMOOTHED_ERROR {
            // don't smooth across teleports
            self.active = false;
            self.error = VEC3_ORIGIN;
            return;
        }
        self.error = err;
        self.set_time_ms = now_ms;
        self.active = len > 0.0;
    }

    /// The render position for a predicted point: the remaining share of
    /// the error decays linearly to zero over the fade window.
    pub fn corrected(&self, predicted: &Vec3, now_ms: i32) -> Vec3 {
        if !self.active {
            return *predicted;
        }
        let age = now_ms - self.set_time_ms;
        if age >= PREDICTION_ERROR_FADE_MS || age < 0 {
            return *predicted;
        }
        let scale = 1.0 - age as f32 / PREDICTION_ERROR_FADE_MS as f32;
        [
            predicted[0] + self.error[0] * scale,
            predicted[1] + self.error[1] * scale,
            predicted[2] + self.error[2] * scale,
        ]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_error_at_reconcile_time() {
        let mut pe = PredictionError::new();
        pe.reconcile(&[10.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 1000);
        assert_eq!(pe.corrected(&[0.0, 0.0, 0.0], 1000), [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_linear_fade() {
        let mut pe = PredictionError::new();
        pe.reconcile(&[10.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 1000);
        let mid = pe.corrected(&[0.0, 0.0, 0.0], 1050);
        assert!((mid[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_error_gone_after_fade_window() {
        let mut pe = PredictionError::new();
        pe.reconcile(&[10.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 1000);
        assert_eq!(pe.corrected(&[3.0, 0.0, 0.0], 1100), [3.0, 0.0, 0.0]);
        assert_eq!(pe.corrected(&[3.0, 0.0, 0.0], 2000), [3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_large_error_snaps() {
        let mut pe = PredictionError::new();
        pe.reconcile(&[500.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 1000);
        // teleport-sized error is not smoothed at all
        assert_eq!(pe.corrected(&[500.0, 0.0, 0.0], 1000), [500.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_error_inactive() {
        let mut pe = PredictionError::new();
        pe.reconcile(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 1000);
        assert_eq!(pe.corrected(&[1.0, 2.0, 3.0], 1001), [1.0, 2.0, 3.0]);
    }
}
