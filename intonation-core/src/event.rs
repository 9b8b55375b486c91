//! # Note Events
//!
//! Candidate events under construction, finalized events, and the finalize and
//! merge steps that turn one into the other.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{AnalysisConfig, HOP_MS, MERGE_GAP_MS, MIN_EVENT_MS};
use crate::stats::{mean, median};
use crate::tuning::PitchTarget;

/// Longest stretch trimmed from each end of a long event before summarising.
const EDGE_TRIM_MS: f64 = 60.0;
/// Trim never exceeds this fraction of the event.
const EDGE_TRIM_FRACTION: f64 = 0.2;
/// Long events need more than this many samples before they are trimmed.
const MIN_SAMPLES_FOR_TRIM: usize = 10;

/// How an event counts toward scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Sustained note of at least `long_ms`
    Long,
    /// Short note whose pitch class is in the selected key
    ShortIn,
    /// Everything else: short out-of-key notes and unreliable segments
    Other,
}

impl EventCategory {
    pub fn classify(duration_ms: f64, long_ms: f64, in_key: bool) -> Self {
        if duration_ms >= long_ms {
            EventCategory::Long
        } else if in_key {
            EventCategory::ShortIn
        } else {
            EventCategory::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Long => "long",
            EventCategory::ShortIn => "short_in",
            EventCategory::Other => "other",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note still being accumulated by the online segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEvent {
    pub start_ms: f64,
    pub last_ms: f64,
    pub detected_label: String,
    pub target_label: String,
    pub midi_rounded: i32,
    pub target_frequency_hz: f64,
    pub in_key: bool,
    pub frequency_samples: Vec<f64>,
    pub cents_samples: Vec<f64>,
    pub confidence_samples: Vec<f64>,
}

impl CandidateEvent {
    /// Opens an empty candidate at `t_ms`.
    pub fn open(t_ms: f64, target: &PitchTarget, in_key: bool) -> Self {
        Self {
            start_ms: t_ms,
            last_ms: t_ms,
            detected_label: target.detected_label.clone(),
            target_label: target.target_label.clone(),
            midi_rounded: target.midi_rounded,
            target_frequency_hz: target.target_frequency_hz,
            in_key,
            frequency_samples: Vec::new(),
            cents_samples: Vec::new(),
            confidence_samples: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.last_ms - self.start_ms
    }

    /// Refreshes the trailing descriptive fields from a same-note tick.
    pub fn refresh(&mut self, target: &PitchTarget, in_key: bool) {
        self.detected_label.clone_from(&target.detected_label);
        self.in_key = in_key;
        self.target_frequency_hz = target.target_frequency_hz;
    }

    pub fn push_sample(&mut self, t_ms: f64, frequency_hz: f64, cents: f64, confidence: f64) {
        self.last_ms = t_ms;
        self.frequency_samples.push(frequency_hz);
        self.cents_samples.push(cents);
        self.confidence_samples.push(confidence);
    }
}

/// A summarised note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedEvent {
    pub start_ms: f64,
    pub end_ms: f64,
    pub duration_ms: f64,
    pub detected_label: String,
    pub target_label: String,
    pub midi_rounded: i32,
    pub measured_frequency_hz: f64,
    pub target_frequency_hz: f64,
    pub cents: f64,
    pub confidence: f64,
    pub category: EventCategory,
    /// Judged at the tolerance in effect when the event was finalized
    pub pass: bool,
}

impl FinalizedEvent {
    /// Re-evaluates the event against another tolerance without changing it.
    pub fn passes_within(&self, cents_tol: f64) -> bool {
        self.cents.abs() <= cents_tol
    }
}

/// Summarises a candidate, or discards it when it is shorter than `MIN_EVENT_MS`.
///
/// Long events with more than ten samples lose up to 60 ms (at most 20% of
/// their duration) of samples at each end so attack and release transients do
/// not bias the medians.
pub fn finalize_event(candidate: &CandidateEvent, config: &AnalysisConfig) -> Option<FinalizedEvent> {
    let duration = candidate.duration_ms();
    if duration < MIN_EVENT_MS {
        return None;
    }

    let category = EventCategory::classify(duration, config.long_ms, candidate.in_key);

    let count = candidate.cents_samples.len();
    if count == 0 {
        return None;
    }
    let (mut start, mut end) = (0, count);
    if category == EventCategory::Long && count > MIN_SAMPLES_FOR_TRIM {
        let trim_ms = EDGE_TRIM_MS.min(duration * EDGE_TRIM_FRACTION);
        let trim_frames = (trim_ms / HOP_MS).floor() as usize;
        start = trim_frames.min(count - 1);
        end = (start + 1).max(count.saturating_sub(trim_frames));
    }

    let cents = median(&candidate.cents_samples[start..end])?;
    let measured_frequency_hz = median(&candidate.frequency_samples[start..end])?;
    let confidence = mean(&candidate.confidence_samples[start..end])?;

    Some(FinalizedEvent {
        start_ms: candidate.start_ms.round(),
        end_ms: candidate.last_ms.round(),
        duration_ms: duration.round(),
        detected_label: candidate.detected_label.clone(),
        target_label: candidate.target_label.clone(),
        midi_rounded: candidate.midi_rounded,
        measured_frequency_hz,
        target_frequency_hz: candidate.target_frequency_hz,
        cents,
        confidence,
        category,
        pass: config.passes(cents),
    })
}

/// What happened to a finalized event when it was committed to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Appended,
    /// Absorbed into the previous event
    Merged,
}

/// Extends `prev` with `next` when they are the same note separated by at
/// most `MERGE_GAP_MS`. Frequency and cents are averaged by duration, pass is
/// recomputed, and the merged event is promoted to long if it now qualifies.
pub fn merge_with_previous(prev: &mut FinalizedEvent, next: &FinalizedEvent, config: &AnalysisConfig) -> bool {
    let gap = next.start_ms - prev.end_ms;
    if gap > MERGE_GAP_MS || prev.midi_rounded != next.midi_rounded {
        return false;
    }

    let d1 = prev.duration_ms.max(1.0);
    let d2 = next.duration_ms.max(1.0);
    prev.end_ms = next.end_ms;
    prev.duration_ms = prev.end_ms - prev.start_ms;
    prev.measured_frequency_hz = (prev.measured_frequency_hz * d1 + next.measured_frequency_hz * d2) / (d1 + d2);
    prev.cents = (prev.cents * d1 + next.cents * d2) / (d1 + d2);
    prev.pass = config.passes(prev.cents);
    if prev.duration_ms >= config.long_ms {
        prev.category = EventCategory::Long;
    }
    true
}

/// Appends `event`, or merges it into the last event in `events`.
pub fn commit_event(events: &mut Vec<FinalizedEvent>, event: FinalizedEvent, config: &AnalysisConfig) -> Commit {
    if let Some(prev) = events.last_mut() {
        if merge_with_previous(prev, &event, config) {
            debug!(
                "[SEGMENT] Merged {} into previous event, now {}-{} ms ({:+.1} c)",
                event.target_label, prev.start_ms, prev.end_ms, prev.cents
            );
            return Commit::Merged;
        }
    }
    debug!(
        "[SEGMENT] Finalized {} {}-{} ms, {} {:+.1} c, pass={}",
        event.target_label, event.start_ms, event.end_ms, event.category, event.cents, event.pass
    );
    events.push(event);
    Commit::Appended
}
