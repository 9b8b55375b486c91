//! # Fast Difference Function
//!
//! The YIN difference function
//! `d(tau) = sum_{i=0}^{N-tau-1} (x[i] - x[i+tau])^2`
//! expands into two energy terms and an autocorrelation term:
//! `d(tau) = E(0..N-tau) + E(tau..N) - 2 r(tau)`.
//! The energies come from a prefix sum and `r` from one zero-padded forward and
//! inverse FFT, which keeps large analysis windows (8192 samples) cheap enough
//! for every tick.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse plans for one transform length.
struct PlanPair {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

/// Reusable FFT state for the difference function.
///
/// Plans are kept for the last transform length only; a profile switch
/// replans once.
pub struct DifferenceFunction {
    plans: Option<PlanPair>,
    buffer: Vec<Complex<f64>>,
}

impl Default for DifferenceFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DifferenceFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferenceFunction")
            .field("plan_len", &self.plans.as_ref().map(|p| p.len))
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

impl DifferenceFunction {
    pub fn new() -> Self {
        Self {
            plans: None,
            buffer: Vec::new(),
        }
    }

    /// Computes `d(tau)` for `tau` in `0..=max_tau`; entries below `min_tau`
    /// are left at zero. `max_tau` must be smaller than the signal length.
    pub fn compute(&mut self, signal: &[f32], min_tau: usize, max_tau: usize) -> Vec<f64> {
        let n = signal.len();
        let mut d = vec![0.0; max_tau + 1];
        if n == 0 || max_tau >= n {
            return d;
        }

        // Prefix sums of squared samples: energy[k] = sum_{i<k} x[i]^2
        let mut energy = Vec::with_capacity(n + 1);
        energy.push(0.0f64);
        let mut acc = 0.0;
        for &s in signal {
            acc += (s as f64) * (s as f64);
            energy.push(acc);
        }

        let r = self.autocorrelation(signal, max_tau);
        for tau in min_tau.max(1)..=max_tau {
            let head = energy[n - tau];
            let tail = energy[n] - energy[tau];
            // Rounding in the transform can leave tiny negatives at exact periods.
            d[tau] = (head + tail - 2.0 * r[tau]).max(0.0);
        }
        d
    }

    fn plans_for(&mut self, len: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>) {
        if let Some(p) = &self.plans {
            if p.len == len {
                return (Arc::clone(&p.forward), Arc::clone(&p.inverse));
            }
        }
        let mut planner = FftPlanner::new();
        let pair = PlanPair {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        };
        let plans = (Arc::clone(&pair.forward), Arc::clone(&pair.inverse));
        self.plans = Some(pair);
        plans
    }

    /// Linear (non-circular) autocorrelation for lags `0..=max_lag`.
    fn autocorrelation(&mut self, signal: &[f32], max_lag: usize) -> Vec<f64> {
        let fft_len = (signal.len() + max_lag + 1).next_power_of_two();

        self.buffer.clear();
        self.buffer
            .extend(signal.iter().map(|&s| Complex { re: s as f64, im: 0.0 }));
        self.buffer.resize(fft_len, Complex { re: 0.0, im: 0.0 });

        let (forward, inverse) = self.plans_for(fft_len);

        forward.process(&mut self.buffer);
        for c in self.buffer.iter_mut() {
            *c = Complex { re: c.norm_sqr(), im: 0.0 };
        }
        inverse.process(&mut self.buffer);

        // rustfft leaves the inverse unnormalised.
        let scale = 1.0 / fft_len as f64;
        self.buffer
            .iter()
            .take(max_lag + 1)
            .map(|c| c.re * scale)
            .collect()
    }
}
