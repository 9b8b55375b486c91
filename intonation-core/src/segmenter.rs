//! # Online Segmenter
//!
//! Turns the per-tick pitch stream into note events while audio is still being
//! captured. A note change is only committed after it has been seen on enough
//! consecutive ticks: one tick while the current note is younger than
//! `LONG_EVENT_SWITCH_MS`, two once it is older. Short notes switch fast so they
//! are not swallowed by the next note; sustained notes resist single-tick flicker.

use crate::config::{
    AnalysisConfig, CONFIRM_LONG, CONFIRM_SHORT, LONG_EVENT_SWITCH_MS, SILENCE_GAP_MS,
};
use crate::event::{commit_event, finalize_event, CandidateEvent, EventCategory, FinalizedEvent};
use crate::key::is_in_key;
use crate::pitch::PitchEstimate;
use crate::timeline::TimelineSample;
use crate::tuning::{nearest_target, strip_octave};

/// A different note seen on `count` consecutive ticks, not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSwitch {
    pub midi: i32,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SegmenterState {
    /// No note under construction
    #[default]
    Idle,
    /// A candidate is accumulating, possibly with a note change awaiting confirmation
    Active {
        candidate: CandidateEvent,
        pending: Option<PendingSwitch>,
    },
}

/// Immediate feedback for one accepted tick.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReading {
    pub label: String,
    pub frequency_hz: f64,
    pub cents: f64,
}

/// The session's append-only outputs. Only the pass that currently owns the
/// session writes to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    pub events: Vec<FinalizedEvent>,
    pub timeline: Vec<TimelineSample>,
}

impl SessionLog {
    pub fn clear(&mut self) {
        self.events.clear();
        self.timeline.clear();
    }
}

/// Online note segmentation. Ticks must arrive one at a time with
/// non-decreasing timestamps.
#[derive(Debug, Clone, Default)]
pub struct OnlineSegmenter {
    state: SegmenterState,
}

impl OnlineSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SegmenterState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
    }

    /// Processes one tick.
    ///
    /// `estimate` is `None` for silent or unvoiced frames; estimates under the
    /// profile's minimum confidence are treated the same way. `rms` is the
    /// frame level recorded on the timeline.
    pub fn observe(
        &mut self,
        t_ms: f64,
        estimate: Option<PitchEstimate>,
        rms: f64,
        config: &AnalysisConfig,
        log: &mut SessionLog,
    ) -> Option<LiveReading> {
        let Some(pitch) = estimate.filter(|p| p.confidence >= config.profile.confidence_min()) else {
            self.observe_silence(t_ms, config, log);
            return None;
        };

        let target = nearest_target(pitch.frequency_hz, config.a_ref);
        let in_key = is_in_key(strip_octave(&target.target_label), config.key);

        let (mut candidate, pending) = match std::mem::take(&mut self.state) {
            SegmenterState::Idle => (CandidateEvent::open(t_ms, &target, in_key), None),
            SegmenterState::Active { mut candidate, pending } => {
                if candidate.midi_rounded == target.midi_rounded {
                    candidate.refresh(&target, in_key);
                    (candidate, None)
                } else {
                    let needed = if t_ms - candidate.start_ms >= LONG_EVENT_SWITCH_MS {
                        CONFIRM_LONG
                    } else {
                        CONFIRM_SHORT
                    };
                    let pending = match pending {
                        Some(p) if p.midi == target.midi_rounded => PendingSwitch {
                            midi: p.midi,
                            count: p.count + 1,
                        },
                        _ => PendingSwitch {
                            midi: target.midi_rounded,
                            count: 1,
                        },
                    };
                    if pending.count >= needed {
                        close_candidate(&candidate, config, log);
                        (CandidateEvent::open(t_ms, &target, in_key), None)
                    } else {
                        (candidate, Some(pending))
                    }
                }
            }
        };

        candidate.push_sample(t_ms, pitch.frequency_hz, target.cents, pitch.confidence);

        let elapsed = t_ms - candidate.start_ms;
        let category = if elapsed >= config.long_ms {
            EventCategory::Long
        } else if in_key {
            EventCategory::ShortIn
        } else {
            EventCategory::Other
        };
        log.timeline.push(TimelineSample {
            t_ms,
            cents: target.cents,
            pass: config.passes(target.cents),
            category,
            note_label: target.target_label.clone(),
            midi_rounded: Some(target.midi_rounded),
            rms,
            frequency_hz: pitch.frequency_hz,
            confidence: pitch.confidence,
        });

        self.state = SegmenterState::Active { candidate, pending };

        Some(LiveReading {
            label: target.detected_label,
            frequency_hz: pitch.frequency_hz,
            cents: target.cents,
        })
    }

    /// Closes the open candidate regardless of timing (end of capture).
    pub fn flush(&mut self, config: &AnalysisConfig, log: &mut SessionLog) {
        if let SegmenterState::Active { candidate, .. } = std::mem::take(&mut self.state) {
            close_candidate(&candidate, config, log);
        }
    }

    /// A lone missed tick inside a note does nothing; a gap of `SILENCE_GAP_MS`
    /// since the candidate's last sample ends it.
    fn observe_silence(&mut self, t_ms: f64, config: &AnalysisConfig, log: &mut SessionLog) {
        let gap_reached = matches!(
            &self.state,
            SegmenterState::Active { candidate, .. } if t_ms - candidate.last_ms >= SILENCE_GAP_MS
        );
        if gap_reached {
            self.flush(config, log);
        }
    }
}

fn close_candidate(candidate: &CandidateEvent, config: &AnalysisConfig, log: &mut SessionLog) {
    if let Some(event) = finalize_event(candidate, config) {
        commit_event(&mut log.events, event, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::midi_to_freq;

    fn pitch(midi: f64) -> Option<PitchEstimate> {
        Some(PitchEstimate {
            frequency_hz: midi_to_freq(midi, 440.0),
            confidence: 0.9,
        })
    }

    fn run(seg: &mut OnlineSegmenter, log: &mut SessionLog, from: f64, to: f64, midi: Option<f64>) {
        let config = AnalysisConfig::default();
        let mut t = from;
        while t < to {
            seg.observe(t, midi.and_then(pitch), 0.1, &config, log);
            t += 10.0;
        }
    }

    fn candidate_midi(seg: &OnlineSegmenter) -> Option<i32> {
        match seg.state() {
            SegmenterState::Active { candidate, .. } => Some(candidate.midi_rounded),
            SegmenterState::Idle => None,
        }
    }

    #[test]
    fn long_note_needs_two_ticks_to_switch() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        run(&mut seg, &mut log, 0.0, 200.0, Some(60.0));

        let config = AnalysisConfig::default();
        seg.observe(200.0, pitch(62.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(60));
        assert!(log.events.is_empty());
        assert!(matches!(
            seg.state(),
            SegmenterState::Active { pending: Some(PendingSwitch { midi: 62, count: 1 }), .. }
        ));

        seg.observe(210.0, pitch(62.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(62));
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].midi_rounded, 60);
        assert_eq!(log.events[0].end_ms, 200.0);
        if let SegmenterState::Active { candidate, .. } = seg.state() {
            assert_eq!(candidate.start_ms, 210.0);
        }
    }

    #[test]
    fn young_note_switches_after_one_tick() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        run(&mut seg, &mut log, 0.0, 50.0, Some(60.0));

        let config = AnalysisConfig::default();
        seg.observe(50.0, pitch(62.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(62));
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].duration_ms, 40.0);
    }

    #[test]
    fn flicker_back_to_the_same_note_clears_pending() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        let config = AnalysisConfig::default();
        run(&mut seg, &mut log, 0.0, 200.0, Some(60.0));
        seg.observe(200.0, pitch(62.0), 0.1, &config, &mut log);
        seg.observe(210.0, pitch(60.0), 0.1, &config, &mut log);
        seg.observe(220.0, pitch(62.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(60));
        assert!(log.events.is_empty());
    }

    #[test]
    fn alternating_candidates_reset_the_counter() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        let config = AnalysisConfig::default();
        run(&mut seg, &mut log, 0.0, 200.0, Some(60.0));
        seg.observe(200.0, pitch(62.0), 0.1, &config, &mut log);
        seg.observe(210.0, pitch(64.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(60));
        seg.observe(220.0, pitch(64.0), 0.1, &config, &mut log);
        assert_eq!(candidate_midi(&seg), Some(64));
    }

    #[test]
    fn single_missed_tick_keeps_the_note() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        run(&mut seg, &mut log, 0.0, 100.0, Some(69.0));
        run(&mut seg, &mut log, 100.0, 120.0, None);
        assert_eq!(candidate_midi(&seg), Some(69));
        run(&mut seg, &mut log, 120.0, 300.0, Some(69.0));
        run(&mut seg, &mut log, 300.0, 400.0, None);
        assert_eq!(candidate_midi(&seg), None);
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].category, EventCategory::Long);
        assert_eq!(log.events[0].end_ms, 290.0);
    }

    #[test]
    fn low_confidence_counts_as_silence() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        let config = AnalysisConfig::default();
        let weak = Some(PitchEstimate { frequency_hz: 440.0, confidence: 0.1 });
        assert!(seg.observe(0.0, weak, 0.1, &config, &mut log).is_none());
        assert_eq!(candidate_midi(&seg), None);
        assert!(log.timeline.is_empty());
    }

    #[test]
    fn timeline_category_follows_elapsed_time() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        // D major: C4 (60) is out of key, D4 (62) in key.
        run(&mut seg, &mut log, 0.0, 200.0, Some(60.0));
        assert_eq!(log.timeline[0].category, EventCategory::Other);
        assert_eq!(log.timeline[15].category, EventCategory::Long);
        assert_eq!(log.timeline.len(), 20);
        assert!(log.timeline.windows(2).all(|w| w[0].t_ms <= w[1].t_ms));
    }

    #[test]
    fn flush_finalizes_the_open_candidate() {
        let mut seg = OnlineSegmenter::new();
        let mut log = SessionLog::default();
        run(&mut seg, &mut log, 0.0, 100.0, Some(62.0));
        seg.flush(&AnalysisConfig::default(), &mut log);
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].category, EventCategory::ShortIn);
        assert_eq!(candidate_midi(&seg), None);
    }
}
