//! # Pitch Detection Module
//!
//! YIN fundamental-frequency estimation for monophonic input, plus the frame
//! level measurements (RMS, dBFS) that gate it.
//!
//! ## Features
//! - Difference function up to `max_tau`, searched over `[min_tau, max_tau]`
//! - Cumulative mean normalized difference with an absolute threshold
//! - Descent from the first sub-threshold lag to its local minimum
//! - Parabolic interpolation for sub-sample accuracy

use crate::config::{InstrumentProfile, MIN_ESTIMATE_CONFIDENCE};
use crate::fft::DifferenceFunction;

/// One accepted pitch measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f64,
    /// `1 - cmnd(tau)` at the chosen lag, clamped to 0..=1
    pub confidence: f64,
}

/// YIN estimator with reusable FFT buffers.
#[derive(Debug, Default)]
pub struct YinEstimator {
    difference: DifferenceFunction,
}

impl YinEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs YIN on one frame.
    ///
    /// # Arguments
    /// * `signal` - Time-domain samples of one analysis window
    /// * `sample_rate` - Sample rate in Hz
    /// * `f_min`, `f_max` - Frequency range to search, in Hz
    /// * `threshold` - Absolute CMND threshold for the first dip
    ///
    /// # Returns
    /// * `Some(estimate)` - Frequency and confidence of the detected pitch
    /// * `None` - No lag dips under the threshold, or the result is not a valid frequency
    pub fn estimate(
        &mut self,
        signal: &[f32],
        sample_rate: u32,
        f_min: f64,
        f_max: f64,
        threshold: f64,
    ) -> Option<PitchEstimate> {
        let sr = sample_rate as f64;
        let n = signal.len();
        if n < 4 || f_min <= 0.0 || f_max <= 0.0 {
            return None;
        }
        let max_tau = ((sr / f_min).floor() as usize).min(n / 2);
        let min_tau = ((sr / f_max).floor() as usize).max(2);
        if min_tau > max_tau {
            return None;
        }

        // --- Difference function over every lag, so the cumulative mean
        // below min_tau still normalises the searched range ---
        let d = self.difference.compute(signal, 1, max_tau);

        // --- Cumulative mean normalized difference ---
        let cmnd = cumulative_mean_normalized(&d);

        // --- First dip under the threshold, then down to its local minimum ---
        let mut tau_est = None;
        let mut tau = min_tau;
        while tau <= max_tau {
            if cmnd[tau] < threshold {
                while tau + 1 <= max_tau && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                tau_est = Some(tau);
                break;
            }
            tau += 1;
        }
        let tau = tau_est?;

        // --- Parabolic interpolation, neighbours clamped to the searched range ---
        let x0 = if tau > 1 { tau - 1 } else { tau };
        let x2 = if tau + 1 <= max_tau { tau + 1 } else { tau };
        let (s0, s1, s2) = (cmnd[x0], cmnd[tau], cmnd[x2]);
        let denom = 2.0 * s1 - s2 - s0;
        let better_tau = if denom != 0.0 {
            tau as f64 + (s2 - s0) / (2.0 * denom)
        } else {
            tau as f64
        };

        let frequency_hz = sr / better_tau;
        let confidence = (1.0 - cmnd[tau]).clamp(0.0, 1.0);
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return None;
        }
        Some(PitchEstimate {
            frequency_hz,
            confidence,
        })
    }

    /// Gated detection for a live frame: skips quiet frames and drops
    /// estimates too weak to be worth segmenting.
    pub fn detect(
        &mut self,
        signal: &[f32],
        sample_rate: u32,
        rms: f64,
        profile: InstrumentProfile,
    ) -> Option<PitchEstimate> {
        if rms < profile.rms_min() {
            return None;
        }
        self.estimate(
            signal,
            sample_rate,
            profile.f_min_hz(),
            profile.f_max_hz(),
            profile.yin_threshold(),
        )
        .filter(|p| p.confidence >= MIN_ESTIMATE_CONFIDENCE)
    }
}

/// `cmnd(0) = 1`, `cmnd(tau) = d(tau) * tau / sum_{k=1}^{tau} d(k)`, and 1 where
/// the running sum is still zero.
fn cumulative_mean_normalized(d: &[f64]) -> Vec<f64> {
    let mut cmnd = vec![1.0; d.len()];
    let mut running = 0.0;
    for tau in 1..d.len() {
        running += d[tau];
        if running != 0.0 {
            cmnd[tau] = d[tau] * tau as f64 / running;
        }
    }
    cmnd
}

/// Root mean square of a frame; zero for an empty frame.
pub fn frame_rms(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum: f64 = signal.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / signal.len() as f64).sqrt()
}

/// Frame level in dBFS.
pub fn level_dbfs(rms: f64) -> f64 {
    20.0 * (rms + 1e-9).log10()
}

/// Maps -60..0 dBFS onto a 0..100 meter.
pub fn meter_percent(dbfs: f64) -> f64 {
    ((dbfs + 60.0) / 60.0 * 100.0).clamp(0.0, 100.0)
}
