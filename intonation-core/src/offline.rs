//! # Offline Re-segmentation
//!
//! Rebuilds the event list from the complete pitch timeline once capture has
//! stopped. With the whole trajectory available, the pass can smooth the note
//! sequence and require every note change to hold for `change_hold_ms`, which
//! removes most of the split notes the online pass produces.
//!
//! ## Features
//! - Trailing rolling median over the rounded MIDI sequence
//! - Silence and time gaps close the open segment
//! - Unreliable segments are downgraded to "other" or dropped
//! - Same-label neighbours are merged in a final coarse pass
//!
//! The pass is a [`Resegmenter`] iterator that yields a [`Progress`] checkpoint
//! after each bounded chunk of work. A driver pulls checkpoints, renders them and
//! may stop between any two of them; [`resegment`] is such a driver.

use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{AnalysisConfig, OfflineConfig};
use crate::error::{Error, Result};
use crate::event::{EventCategory, FinalizedEvent};
use crate::key::is_midi_in_key;
use crate::stats::{mean, median, trailing_median};
use crate::timeline::TimelineSample;
use crate::tuning::{midi_to_freq, note_from_rounded};

/// Fewer usable samples than this produce an empty event list.
const MIN_USABLE_SAMPLES: usize = 3;

const SMOOTHING_START: u8 = 5;
const SMOOTHING_SPAN: f64 = 30.0;
const SEGMENTING_START: u8 = 40;
const SEGMENTING_SPAN: f64 = 40.0;
const MERGING_START: u8 = 85;
const COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Smoothing,
    Segmenting,
    Merging,
    Done,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Smoothing => "preprocessing",
            Phase::Segmenting => "segmenting",
            Phase::Merging => "merging",
            Phase::Done => "done",
        }
    }

    pub fn detail(self) -> &'static str {
        match self {
            Phase::Smoothing => "smoothing the pitch trajectory",
            Phase::Segmenting => "cutting notes at stable pitch changes",
            Phase::Merging => "merging fragments and scoring",
            Phase::Done => "report ready",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One checkpoint of the offline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100, non-decreasing over one run
    pub percent: u8,
    pub phase: Phase,
    pub detail: &'static str,
}

impl Progress {
    fn at(percent: u8, phase: Phase) -> Self {
        Self {
            percent,
            phase,
            detail: phase.detail(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Start,
    Smoothing { next: usize },
    Segmenting { next: usize },
    Merging,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct OpenSegment {
    start_idx: usize,
    start_ms: f64,
    midi: i32,
}

#[derive(Debug, Clone, Copy)]
struct PendingChange {
    midi: i32,
    since_idx: usize,
    since_ms: f64,
    /// Last voiced sample before the change started; the old segment ends here.
    close_idx: usize,
}

/// Restartable offline pass over a recorded timeline.
///
/// Each call to `next` performs one bounded chunk of work and returns its
/// checkpoint. Errors are yielded once, after which the iterator is exhausted.
pub struct Resegmenter<'a> {
    timeline: &'a [TimelineSample],
    config: &'a AnalysisConfig,
    offline: &'a OfflineConfig,
    stage: Stage,
    samples: Vec<&'a TimelineSample>,
    midi: Vec<f64>,
    smoothed: Vec<i32>,
    /// First sample of the voiced run being smoothed
    run_start: usize,
    current: Option<OpenSegment>,
    pending: Option<PendingChange>,
    last_voiced: Option<usize>,
    segments: Vec<FinalizedEvent>,
    events: Vec<FinalizedEvent>,
    last_percent: u8,
}

impl<'a> Resegmenter<'a> {
    pub fn new(timeline: &'a [TimelineSample], config: &'a AnalysisConfig, offline: &'a OfflineConfig) -> Self {
        Self {
            timeline,
            config,
            offline,
            stage: Stage::Start,
            samples: Vec::new(),
            midi: Vec::new(),
            smoothed: Vec::new(),
            run_start: 0,
            current: None,
            pending: None,
            last_voiced: None,
            segments: Vec::new(),
            events: Vec::new(),
            last_percent: 0,
        }
    }

    /// Discards all intermediate state so the next call starts from scratch.
    pub fn restart(&mut self) {
        self.stage = Stage::Start;
        self.samples.clear();
        self.midi.clear();
        self.smoothed.clear();
        self.run_start = 0;
        self.current = None;
        self.pending = None;
        self.last_voiced = None;
        self.segments.clear();
        self.events.clear();
        self.last_percent = 0;
    }

    /// Percent of the most recent checkpoint.
    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    /// Runs the remaining checkpoints and returns the event list.
    pub fn finish(mut self) -> Result<Vec<FinalizedEvent>> {
        for step in self.by_ref() {
            step?;
        }
        Ok(self.events)
    }

    fn checkpoint(&mut self, percent: u8, phase: Phase) -> Progress {
        self.last_percent = self.last_percent.max(percent);
        Progress::at(self.last_percent, phase)
    }

    fn prepare(&mut self) -> Result<Option<Progress>> {
        let mut prev_ms: Option<f64> = None;
        for (index, sample) in self.timeline.iter().enumerate() {
            if !sample.is_usable() {
                continue;
            }
            if let Some(prev_ms) = prev_ms {
                if sample.t_ms < prev_ms {
                    return Err(Error::NonMonotonicTimeline {
                        index,
                        t_ms: sample.t_ms,
                        prev_ms,
                    });
                }
            }
            prev_ms = Some(sample.t_ms);
            self.samples.push(sample);
        }

        debug!(
            "[OFFLINE] {} of {} timeline samples usable",
            self.samples.len(),
            self.timeline.len()
        );
        if self.samples.len() < MIN_USABLE_SAMPLES {
            self.stage = Stage::Finished;
            return Ok(Some(self.checkpoint(COMPLETE, Phase::Done)));
        }
        self.midi = self
            .samples
            .iter()
            .map(|s| s.midi_rounded.map_or(f64::NAN, f64::from))
            .collect();
        self.smoothed = Vec::with_capacity(self.samples.len());
        self.stage = Stage::Smoothing { next: 0 };
        Ok(Some(self.checkpoint(SMOOTHING_START, Phase::Smoothing)))
    }

    fn smooth_chunk(&mut self, start: usize) -> Progress {
        let n = self.samples.len();
        let end = (start + self.offline.smoothing_chunk.max(1)).min(n);
        for i in start..end {
            // The median window never reaches back across a gap.
            if i > 0 && self.samples[i].t_ms - self.samples[i - 1].t_ms > self.offline.gap_ms {
                self.run_start = i;
            }
            let run = &self.midi[self.run_start..];
            let m = trailing_median(run, i - self.run_start, self.offline.median_window)
                .map_or(i32::MIN, |v| v.round() as i32);
            self.smoothed.push(m);
        }

        if end < n {
            self.stage = Stage::Smoothing { next: end };
            let percent = SMOOTHING_START + (end as f64 / n as f64 * SMOOTHING_SPAN).floor() as u8;
            self.checkpoint(percent, Phase::Smoothing)
        } else {
            self.stage = Stage::Segmenting { next: 0 };
            self.checkpoint(SEGMENTING_START, Phase::Segmenting)
        }
    }

    fn segment_chunk(&mut self, start: usize) -> Progress {
        let n = self.samples.len();
        let end = (start + self.offline.segmenting_chunk.max(1)).min(n);
        for i in start..end {
            self.step(i);
        }

        if end < n {
            self.stage = Stage::Segmenting { next: end };
            let percent = SEGMENTING_START + (end as f64 / n as f64 * SEGMENTING_SPAN).floor() as u8;
            self.checkpoint(percent, Phase::Segmenting)
        } else {
            if let Some(last) = self.last_voiced {
                self.close_current(last);
            }
            debug!("[OFFLINE] {} segments before merging", self.segments.len());
            self.stage = Stage::Merging;
            self.checkpoint(MERGING_START, Phase::Merging)
        }
    }

    fn step(&mut self, i: usize) {
        let sample = self.samples[i];
        let midi = self.smoothed[i];

        let silent = !sample.rms.is_finite() || sample.rms < self.offline.min_rms;
        if silent {
            if let Some(last) = self.last_voiced {
                if sample.t_ms - self.samples[last].t_ms > self.offline.gap_ms {
                    self.close_current(last);
                }
            }
            self.pending = None;
            return;
        }

        // Online timelines only hold voiced ticks, so silence often shows up
        // as a jump in time rather than as quiet samples.
        if let Some(last) = self.last_voiced {
            if sample.t_ms - self.samples[last].t_ms > self.offline.gap_ms {
                self.close_current(last);
                self.pending = None;
            }
        }
        let prev_voiced = self.last_voiced.replace(i);

        let Some(current) = self.current else {
            self.current = Some(OpenSegment {
                start_idx: i,
                start_ms: sample.t_ms,
                midi,
            });
            self.pending = None;
            return;
        };

        if midi == current.midi {
            self.pending = None;
            return;
        }

        match self.pending {
            Some(p) if p.midi == midi => {
                if sample.t_ms - p.since_ms >= self.offline.change_hold_ms {
                    self.close_current(p.close_idx);
                    self.current = Some(OpenSegment {
                        start_idx: p.since_idx,
                        start_ms: p.since_ms,
                        midi: p.midi,
                    });
                    self.pending = None;
                }
            }
            _ => {
                self.pending = Some(PendingChange {
                    midi,
                    since_idx: i,
                    since_ms: sample.t_ms,
                    close_idx: prev_voiced.unwrap_or(current.start_idx),
                });
            }
        }
    }

    fn close_current(&mut self, end_idx: usize) {
        let Some(segment) = self.current.take() else {
            return;
        };
        if let Some(event) = self.summarize(segment, end_idx) {
            self.segments.push(event);
        }
    }

    fn summarize(&self, segment: OpenSegment, end_idx: usize) -> Option<FinalizedEvent> {
        let off = self.offline;
        let end_ms = self.samples[end_idx].t_ms;
        let duration = end_ms - segment.start_ms;
        if duration <= 0.0 || end_idx < segment.start_idx {
            return None;
        }

        let slice = &self.samples[segment.start_idx..=end_idx];
        let finite = |f: fn(&TimelineSample) -> f64| -> Vec<f64> {
            slice.iter().map(|s| f(s)).filter(|v| v.is_finite()).collect()
        };
        let cents = median(&finite(|s| s.cents))?;
        let frequency = median(&finite(|s| s.frequency_hz));
        let confidence = mean(&finite(|s| s.confidence));
        let rms = median(&finite(|s| s.rms));

        let in_key = is_midi_in_key(segment.midi, self.config.key);
        let mut category = EventCategory::classify(duration, self.config.long_ms, in_key);

        let quiet = rms.is_some_and(|r| r < off.min_rms);
        let extreme = cents.abs() >= off.extreme_cents;
        if quiet && duration >= off.quiet_sustain_ms {
            category = EventCategory::Other;
        }
        if extreme && (quiet || confidence.is_some_and(|c| c < off.extreme_min_confidence)) {
            category = EventCategory::Other;
        }
        if duration < off.min_score_ms {
            category = EventCategory::Other;
        }
        if duration < off.min_keep_ms && (quiet || confidence.is_some_and(|c| c < off.keep_min_confidence)) {
            debug!(
                "[OFFLINE] Dropped unreliable {:.0} ms segment at {:.0} ms",
                duration, segment.start_ms
            );
            return None;
        }

        let target = note_from_rounded(segment.midi);
        let target_frequency_hz = midi_to_freq(f64::from(segment.midi), self.config.a_ref);
        let middle = slice[slice.len() / 2];
        let detected_label = if middle.note_label.is_empty() {
            target.label()
        } else {
            middle.note_label.clone()
        };

        Some(FinalizedEvent {
            start_ms: segment.start_ms.round(),
            end_ms: end_ms.round(),
            duration_ms: duration.round(),
            detected_label,
            target_label: target.label(),
            midi_rounded: segment.midi,
            measured_frequency_hz: frequency
                .unwrap_or_else(|| target_frequency_hz * 2.0_f64.powf(cents / 1200.0)),
            target_frequency_hz,
            cents,
            confidence: confidence.unwrap_or(0.0),
            category,
            pass: self.config.passes(cents),
        })
    }

    fn merge_segments(&mut self) -> Progress {
        let mut merged: Vec<FinalizedEvent> = Vec::with_capacity(self.segments.len());
        for event in self.segments.drain(..) {
            if let Some(prev) = merged.last_mut() {
                if prev.detected_label == event.detected_label
                    && event.start_ms - prev.end_ms <= self.offline.merge_gap_ms
                {
                    let d1 = prev.duration_ms.max(1.0);
                    let d2 = event.duration_ms.max(1.0);
                    let w = d1 + d2;
                    prev.end_ms = event.end_ms;
                    prev.duration_ms = prev.end_ms - prev.start_ms;
                    prev.cents = (prev.cents * d1 + event.cents * d2) / w;
                    prev.measured_frequency_hz = (prev.measured_frequency_hz * d1 + event.measured_frequency_hz * d2) / w;
                    prev.confidence = (prev.confidence * d1 + event.confidence * d2) / w;
                    prev.pass = self.config.passes(prev.cents);
                    continue;
                }
            }
            merged.push(event);
        }
        debug!("[OFFLINE] {} events after merging", merged.len());
        self.events = merged;
        self.stage = Stage::Finished;
        self.checkpoint(COMPLETE, Phase::Done)
    }
}

impl Iterator for Resegmenter<'_> {
    type Item = Result<Progress>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stage {
            Stage::Start => match self.prepare() {
                Ok(progress) => progress.map(Ok),
                Err(e) => {
                    self.stage = Stage::Finished;
                    Some(Err(e))
                }
            },
            Stage::Smoothing { next } => Some(Ok(self.smooth_chunk(next))),
            Stage::Segmenting { next } => Some(Ok(self.segment_chunk(next))),
            Stage::Merging => Some(Ok(self.merge_segments())),
            Stage::Finished => None,
        }
    }
}

/// Runs the offline pass to completion, reporting every checkpoint.
///
/// `cancel` is checked after each checkpoint; raising it ends the pass with
/// [`Error::Cancelled`] and no events.
pub fn resegment<F>(
    timeline: &[TimelineSample],
    config: &AnalysisConfig,
    offline: &OfflineConfig,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<Vec<FinalizedEvent>>
where
    F: FnMut(&Progress),
{
    let mut pass = Resegmenter::new(timeline, config, offline);
    while let Some(step) = pass.next() {
        let progress = step?;
        on_progress(&progress);
        if progress.phase != Phase::Done && cancel.load(Ordering::Relaxed) {
            warn!("[OFFLINE] Cancelled at {}%", progress.percent);
            return Err(Error::Cancelled {
                percent: progress.percent,
            });
        }
    }
    Ok(pass.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::nearest_target;

    fn tick(t_ms: f64, midi: f64, cents: f64, rms: f64) -> TimelineSample {
        let freq = midi_to_freq(midi + cents / 100.0, 440.0);
        let target = nearest_target(freq, 440.0);
        TimelineSample {
            t_ms,
            cents: target.cents,
            pass: target.cents.abs() <= 25.0,
            category: EventCategory::Other,
            note_label: target.target_label,
            midi_rounded: Some(target.midi_rounded),
            rms,
            frequency_hz: freq,
            confidence: 0.9,
        }
    }

    fn hold(out: &mut Vec<TimelineSample>, from: f64, to: f64, midi: f64, cents: f64) {
        let mut t = from;
        while t < to {
            out.push(tick(t, midi, cents, 0.1));
            t += 10.0;
        }
    }

    fn run(timeline: &[TimelineSample]) -> Result<Vec<FinalizedEvent>> {
        resegment(
            timeline,
            &AnalysisConfig::default(),
            &OfflineConfig::default(),
            &AtomicBool::new(false),
            |_| {},
        )
    }

    #[test]
    fn too_few_samples_give_no_events() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 20.0, 69.0, 0.0);
        assert!(run(&tl).unwrap().is_empty());
        assert!(run(&[]).unwrap().is_empty());
    }

    #[test]
    fn unusable_samples_are_skipped() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 0.0);
        tl[5].midi_rounded = None;
        tl[9].t_ms = f64::NAN;
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 290.0);
    }

    #[test]
    fn brief_flicker_is_smoothed_away() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 200.0, 69.0, 0.0);
        hold(&mut tl, 200.0, 230.0, 71.0, 0.0);
        hold(&mut tl, 230.0, 400.0, 69.0, 0.0);
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_label, "A4");
        assert_eq!(events[0].category, EventCategory::Long);
    }

    #[test]
    fn held_change_splits_without_overlap() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 5.0);
        hold(&mut tl, 300.0, 600.0, 71.0, -5.0);
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].target_label, "A4");
        assert_eq!(events[1].target_label, "B4");
        assert!(events[0].end_ms <= events[1].start_ms);
        assert!(events.iter().all(|e| e.category == EventCategory::Long && e.pass));
    }

    #[test]
    fn change_shorter_than_the_hold_is_absorbed() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 0.0);
        // 80 ms of B4: after the 7-sample median it is seen for less than 90 ms.
        hold(&mut tl, 300.0, 380.0, 71.0, 0.0);
        hold(&mut tl, 380.0, 600.0, 69.0, 0.0);
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].midi_rounded, 69);
    }

    #[test]
    fn time_gap_closes_the_segment() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 10.0);
        // 90 ms without a tick: too long to bridge, too far apart to merge.
        hold(&mut tl, 380.0, 700.0, 69.0, -10.0);
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_ms, 290.0);
        assert_eq!(events[1].start_ms, 380.0);
    }

    #[test]
    fn note_after_a_rest_is_not_smoothed_into_the_previous_one() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 0.0);
        hold(&mut tl, 400.0, 530.0, 74.0, 0.0);
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 2, "{:#?}", events);
        assert_eq!(events[1].target_label, "D5");
        assert_eq!(events[1].start_ms, 400.0);
        assert_eq!(events[1].duration_ms, 120.0);
        assert_eq!(events[1].category, EventCategory::ShortIn);
    }

    #[test]
    fn quiet_stretches_split_and_close_neighbours_merge() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 200.0, 69.0, 10.0);
        let mut t = 200.0;
        while t < 290.0 {
            tl.push(tick(t, 69.0, 0.0, 0.001));
            t += 10.0;
        }
        hold(&mut tl, 290.0, 500.0, 69.0, -10.0);
        let events = run(&tl).unwrap();
        // Closed at 190 ms after the quiet stretch, reopened at 290 ms: 100 ms apart, not merged.
        assert_eq!(events.len(), 2);

        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 200.0, 69.0, 10.0);
        tl.push(tick(200.0, 69.0, 0.0, 0.001));
        hold(&mut tl, 270.0, 470.0, 69.0, -10.0);
        let events = run(&tl).unwrap();
        // 80 ms jump closes the first piece at 190 ms; the second starts 80 ms later.
        assert_eq!(events.len(), 2);

        let a = FinalizedEvent {
            start_ms: 0.0,
            end_ms: 190.0,
            duration_ms: 190.0,
            detected_label: "A4".into(),
            target_label: "A4".into(),
            midi_rounded: 69,
            measured_frequency_hz: 442.0,
            target_frequency_hz: 440.0,
            cents: 10.0,
            confidence: 0.9,
            category: EventCategory::Long,
            pass: true,
        };
        let b = FinalizedEvent {
            start_ms: 230.0,
            end_ms: 420.0,
            duration_ms: 190.0,
            cents: -30.0,
            ..a.clone()
        };
        let config = AnalysisConfig::default();
        let offline = OfflineConfig::default();
        let mut pass = Resegmenter::new(&[], &config, &offline);
        pass.segments = vec![a, b];
        pass.merge_segments();
        assert_eq!(pass.events.len(), 1);
        assert_eq!(pass.events[0].duration_ms, 420.0);
        assert!((pass.events[0].cents - (-10.0)).abs() < 1e-9);
        assert!(pass.events[0].pass);
    }

    #[test]
    fn unreliable_segments_are_downgraded_or_dropped() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 300.0, 69.0, 0.0);
        for s in tl.iter_mut() {
            s.cents = 45.0;
            s.confidence = 0.3;
        }
        let events = run(&tl).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, EventCategory::Other);
        assert!(!events[0].pass);

        // 50 ms at low confidence is not even reported.
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 60.0, 69.0, 0.0);
        for s in tl.iter_mut() {
            s.confidence = 0.2;
        }
        assert!(run(&tl).unwrap().is_empty());

        // 100 ms is reported but too short to score.
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 110.0, 62.0, 0.0);
        let events = run(&tl).unwrap();
        assert_eq!(events[0].duration_ms, 100.0);
        assert_eq!(events[0].category, EventCategory::Other);
    }

    /// Every third tick loud enough to count as voiced, the rest quiet, so the
    /// segment stays bridged while its median RMS is quiet.
    fn mostly_quiet(to: f64, cents: f64, quiet_rms: f64) -> Vec<TimelineSample> {
        (0..)
            .map(|i| i as f64 * 10.0)
            .take_while(|&t| t <= to)
            .enumerate()
            .map(|(i, t)| tick(t, 69.0, cents, if i % 3 == 0 { 0.01 } else { quiet_rms }))
            .collect()
    }

    #[test]
    fn quiet_sustain_is_not_scored() {
        let events = run(&mostly_quiet(300.0, 0.0, 0.001)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 300.0);
        assert_eq!(events[0].category, EventCategory::Other);

        let events = run(&mostly_quiet(300.0, 0.0, 0.05)).unwrap();
        assert_eq!(events[0].category, EventCategory::Long);
    }

    #[test]
    fn extreme_and_quiet_is_not_scored() {
        // 150 ms is too short for the quiet-sustain rule on its own.
        let events = run(&mostly_quiet(150.0, 45.0, 0.001)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 150.0);
        assert!(events[0].confidence > 0.45);
        assert_eq!(events[0].category, EventCategory::Other);

        let events = run(&mostly_quiet(150.0, 45.0, 0.05)).unwrap();
        assert_eq!(events[0].category, EventCategory::Long);
        assert!(!events[0].pass);
    }

    #[test]
    fn rerunning_is_idempotent() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 250.0, 62.0, 3.0);
        hold(&mut tl, 250.0, 380.0, 64.0, -12.0);
        hold(&mut tl, 500.0, 900.0, 66.0, 30.0);
        let first = run(&tl).unwrap();
        let second = run(&tl).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(first.windows(2).all(|w| w[0].end_ms <= w[1].start_ms));
    }

    #[test]
    fn progress_is_monotonic_and_chunked() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 20_000.0, 69.0, 0.0);
        let config = AnalysisConfig::default();
        let offline = OfflineConfig::default();
        let steps: Vec<Progress> = Resegmenter::new(&tl, &config, &offline)
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(steps.first().map(|p| p.percent), Some(5));
        assert_eq!(steps.last().map(|p| (p.percent, p.phase)), Some((100, Phase::Done)));
        assert!(steps.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert!(steps.iter().any(|p| p.percent == 40));
        assert!(steps.iter().any(|p| p.percent == 85));
        // 2000 samples: 5 smoothing chunks and 6 segmenting chunks.
        assert_eq!(steps.len(), 1 + 5 + 6 + 1);
    }

    #[test]
    fn restart_gives_the_same_result() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 400.0, 69.0, 0.0);
        let config = AnalysisConfig::default();
        let offline = OfflineConfig::default();
        let mut pass = Resegmenter::new(&tl, &config, &offline);
        pass.next();
        pass.next();
        pass.restart();
        assert_eq!(pass.percent(), 0);
        let events = pass.finish().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn cancellation_stops_between_checkpoints() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 10_000.0, 69.0, 0.0);
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();
        let result = resegment(&tl, &AnalysisConfig::default(), &OfflineConfig::default(), &cancel, |p| {
            seen.push(p.percent);
            if p.percent >= 40 {
                cancel.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(result, Err(Error::Cancelled { percent: 40 }));
        assert_eq!(seen.last(), Some(&40));
    }

    #[test]
    fn out_of_order_timeline_is_fatal() {
        let mut tl = Vec::new();
        hold(&mut tl, 0.0, 100.0, 69.0, 0.0);
        tl[4].t_ms = 5.0;
        match run(&tl) {
            Err(Error::NonMonotonicTimeline { index, t_ms, prev_ms }) => {
                assert_eq!(index, 4);
                assert_eq!(t_ms, 5.0);
                assert_eq!(prev_ms, 30.0);
            }
            other => panic!("expected an ordering error, got {:?}", other),
        }
    }
}
