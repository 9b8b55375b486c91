//! Configuration for online and offline analysis.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::KeySignature;

/// Audio advance per analysis tick.
pub const HOP_MS: f64 = 10.0;
/// The estimator runs on every n-th tick; ticks in between reuse its result.
pub const PITCH_EVERY_N_FRAMES: u64 = 2;
/// Candidates shorter than this are discarded without producing an event.
pub const MIN_EVENT_MS: f64 = 30.0;
/// Events shorter than this never count toward the final report.
pub const MIN_SCORE_MS: f64 = 90.0;
/// Largest gap between two same-note events that still merges them.
pub const MERGE_GAP_MS: f64 = 40.0;
/// Silence longer than this closes the open candidate.
pub const SILENCE_GAP_MS: f64 = 70.0;
/// Once a candidate has lasted this long, a note change needs `CONFIRM_LONG` ticks.
pub const LONG_EVENT_SWITCH_MS: f64 = 90.0;
pub const CONFIRM_SHORT: u32 = 1;
pub const CONFIRM_LONG: u32 = 2;
/// Estimates below this confidence are dropped before the profile gate.
pub const MIN_ESTIMATE_CONFIDENCE: f64 = 0.05;

pub const DEFAULT_A_REF: f64 = 440.0;
pub const DEFAULT_CENTS_TOL: f64 = 25.0;
pub const DEFAULT_LONG_MS: f64 = 150.0;
pub const DEFAULT_W_SHORT: f64 = 0.40;
pub const MIN_CENTS_TOL: f64 = 5.0;
pub const MAX_CENTS_TOL: f64 = 50.0;
pub const CENTS_TOL_STEP: f64 = 5.0;

/// Detection settings tuned per input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentProfile {
    /// Singing voice: long window, permissive gates, wide range.
    #[default]
    Voice,
    /// Reed instrument: shorter window, stricter gates.
    Reed,
}

impl InstrumentProfile {
    pub fn label(self) -> &'static str {
        match self {
            InstrumentProfile::Voice => "VOICE",
            InstrumentProfile::Reed => "REED",
        }
    }

    /// Analysis window in samples.
    pub fn window_size(self) -> usize {
        match self {
            InstrumentProfile::Voice => 8192,
            InstrumentProfile::Reed => 4096,
        }
    }

    /// Frames quieter than this RMS are not analysed.
    pub fn rms_min(self) -> f64 {
        match self {
            InstrumentProfile::Voice => 0.002,
            InstrumentProfile::Reed => 0.004,
        }
    }

    /// Estimates below this confidence count as silence for segmentation.
    pub fn confidence_min(self) -> f64 {
        match self {
            InstrumentProfile::Voice => 0.30,
            InstrumentProfile::Reed => 0.55,
        }
    }

    pub fn f_min_hz(self) -> f64 {
        match self {
            InstrumentProfile::Voice => 50.0,
            InstrumentProfile::Reed => 110.0,
        }
    }

    pub fn f_max_hz(self) -> f64 {
        match self {
            InstrumentProfile::Voice => 1200.0,
            InstrumentProfile::Reed => 1400.0,
        }
    }

    /// YIN distance threshold.
    pub fn yin_threshold(self) -> f64 {
        match self {
            InstrumentProfile::Voice => 0.18,
            InstrumentProfile::Reed => 0.12,
        }
    }
}

impl fmt::Display for InstrumentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InstrumentProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voice" => Ok(InstrumentProfile::Voice),
            "reed" | "oboe" => Ok(InstrumentProfile::Reed),
            other => Err(Error::InvalidConfig(format!("unknown profile '{}'", other))),
        }
    }
}

/// Settings read on every tick. They may change between ticks; decisions
/// already taken are not revisited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reference pitch for A4 in Hz (default: 440.0)
    pub a_ref: f64,
    /// Major key used for in-key classification (default: D)
    pub key: KeySignature,
    /// Pass/fail threshold in cents (default: 25, range 5-50 in steps of 5)
    pub cents_tol: f64,
    /// Minimum duration of a "long" event in ms (default: 150)
    pub long_ms: f64,
    /// Weight of the short-in-key category in the overall score (default: 0.40)
    pub w_short: f64,
    /// Input source profile (default: voice)
    pub profile: InstrumentProfile,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            a_ref: DEFAULT_A_REF,
            key: KeySignature::default(),
            cents_tol: DEFAULT_CENTS_TOL,
            long_ms: DEFAULT_LONG_MS,
            w_short: DEFAULT_W_SHORT,
            profile: InstrumentProfile::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.a_ref.is_finite() || self.a_ref <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "reference pitch must be a positive frequency, got {}",
                self.a_ref
            )));
        }
        if !(MIN_CENTS_TOL..=MAX_CENTS_TOL).contains(&self.cents_tol) {
            return Err(Error::InvalidConfig(format!(
                "cents tolerance must be within {}..={}, got {}",
                MIN_CENTS_TOL, MAX_CENTS_TOL, self.cents_tol
            )));
        }
        if !self.long_ms.is_finite() || self.long_ms <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "long event threshold must be positive, got {}",
                self.long_ms
            )));
        }
        if !self.w_short.is_finite() || self.w_short < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "short weight must be non-negative, got {}",
                self.w_short
            )));
        }
        Ok(())
    }

    /// Whether a cents offset passes at the configured tolerance.
    pub fn passes(&self, cents: f64) -> bool {
        cents.abs() <= self.cents_tol
    }
}

/// Rounds a requested tolerance to the 5-cent grid and clamps it to 5..=50.
pub fn snap_cents_tolerance(requested: f64) -> f64 {
    if !requested.is_finite() {
        return DEFAULT_CENTS_TOL;
    }
    ((requested / CENTS_TOL_STEP).round() * CENTS_TOL_STEP).clamp(MIN_CENTS_TOL, MAX_CENTS_TOL)
}

/// Thresholds for the offline re-segmentation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Samples quieter than this RMS are silence (default: 0.004)
    pub min_rms: f64,
    /// Silence longer than this closes the open segment (default: 70 ms)
    pub gap_ms: f64,
    /// A note change must persist this long to commit (default: 90 ms)
    pub change_hold_ms: f64,
    /// Unreliable segments shorter than this are dropped entirely (default: 60 ms)
    pub min_keep_ms: f64,
    /// Segments shorter than this are reported as "other" (default: 110 ms)
    pub min_score_ms: f64,
    /// Trailing rolling-median window over rounded MIDI (default: 7)
    pub median_window: usize,
    /// Same-label segments closer than this are merged (default: 50 ms)
    pub merge_gap_ms: f64,
    /// Quiet segments at least this long are unreliable (default: 200 ms)
    pub quiet_sustain_ms: f64,
    /// Cents deviation treated as extreme (default: 40)
    pub extreme_cents: f64,
    /// Extreme segments need at least this mean confidence to be scored (default: 0.45)
    pub extreme_min_confidence: f64,
    /// Short segments below this mean confidence are dropped (default: 0.35)
    pub keep_min_confidence: f64,
    /// Samples smoothed between two progress checkpoints (default: 400)
    pub smoothing_chunk: usize,
    /// Samples segmented between two progress checkpoints (default: 350)
    pub segmenting_chunk: usize,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            min_rms: 0.004,
            gap_ms: 70.0,
            change_hold_ms: 90.0,
            min_keep_ms: 60.0,
            min_score_ms: 110.0,
            median_window: 7,
            merge_gap_ms: 50.0,
            quiet_sustain_ms: 200.0,
            extreme_cents: 40.0,
            extreme_min_confidence: 0.45,
            keep_min_confidence: 0.35,
            smoothing_chunk: 400,
            segmenting_chunk: 350,
        }
    }
}
