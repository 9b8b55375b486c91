//! # Practice Session
//!
//! Owns everything one recording produces: the timeline, the event list, the
//! online segmenter and the report. Whichever pass is active writes to it; the
//! scoring engine and front ends only read.

use log::{info, warn};
use std::sync::atomic::AtomicBool;

use crate::config::{AnalysisConfig, OfflineConfig, PITCH_EVERY_N_FRAMES};
use crate::error::{Error, Result};
use crate::event::FinalizedEvent;
use crate::offline::{resegment, Progress};
use crate::pitch::{frame_rms, level_dbfs, meter_percent, PitchEstimate, YinEstimator};
use crate::scoring::{build_report, EventCounts, LiveScores, Report};
use crate::segmenter::{LiveReading, OnlineSegmenter, SessionLog};
use crate::timeline::TimelineSample;

/// What one tick produced, for meters and live displays.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub t_ms: f64,
    pub rms: f64,
    pub level_dbfs: f64,
    pub meter_percent: f64,
    /// Estimate in effect for this tick (possibly held from an earlier tick)
    pub pitch: Option<PitchEstimate>,
    /// Present when the tick was accepted as a pitched sample
    pub reading: Option<LiveReading>,
}

#[derive(Debug, Default)]
pub struct Session {
    log: SessionLog,
    segmenter: OnlineSegmenter,
    estimator: YinEstimator,
    frame_count: u64,
    last_pitch: Option<PitchEstimate>,
    running: bool,
    report: Option<Report>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stopped session holding a previously recorded timeline, ready for
    /// [`Session::generate_report`].
    pub fn with_timeline(timeline: Vec<TimelineSample>) -> Self {
        Self {
            log: SessionLog {
                events: Vec::new(),
                timeline,
            },
            ..Self::default()
        }
    }

    /// Clears all state from a previous recording and starts accepting frames.
    pub fn start(&mut self, config: &AnalysisConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("[SESSION] Refusing to start: {}", e);
            return Err(e);
        }
        self.log.clear();
        self.segmenter.reset();
        self.frame_count = 0;
        self.last_pitch = None;
        self.report = None;
        self.running = true;
        info!(
            "[SESSION] Started: {} profile, key {}, A4={} Hz, tolerance +/-{} c",
            config.profile, config.key, config.a_ref, config.cents_tol
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs one analysis tick on a frame of the profile's window size.
    ///
    /// Returns `None` when the session is not running. `t_ms` must not go
    /// backwards between calls.
    pub fn process_frame(
        &mut self,
        frame: &[f32],
        sample_rate: u32,
        t_ms: f64,
        config: &AnalysisConfig,
    ) -> Option<TickOutput> {
        if !self.running {
            return None;
        }
        let rms = frame_rms(frame);
        let db = level_dbfs(rms);

        self.frame_count += 1;
        if self.frame_count % PITCH_EVERY_N_FRAMES == 0 {
            self.last_pitch = self.estimator.detect(frame, sample_rate, rms, config.profile);
        }

        let reading = self
            .segmenter
            .observe(t_ms, self.last_pitch, rms, config, &mut self.log);

        Some(TickOutput {
            t_ms,
            rms,
            level_dbfs: db,
            meter_percent: meter_percent(db),
            pitch: self.last_pitch,
            reading,
        })
    }

    /// Stops accepting frames and finalizes the open candidate.
    pub fn stop(&mut self, config: &AnalysisConfig) {
        if !self.running {
            return;
        }
        self.running = false;
        self.segmenter.flush(config, &mut self.log);
        info!(
            "[SESSION] Stopped after {} ticks: {} timeline samples, {} live events",
            self.frame_count,
            self.log.timeline.len(),
            self.log.events.len()
        );
    }

    pub fn events(&self) -> &[FinalizedEvent] {
        &self.log.events
    }

    pub fn timeline(&self) -> &[TimelineSample] {
        &self.log.timeline
    }

    pub fn counters(&self) -> EventCounts {
        EventCounts::from_events(&self.log.events)
    }

    pub fn live_scores(&self) -> LiveScores {
        LiveScores::from_events(&self.log.events)
    }

    /// The most recent successfully generated report.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    /// Re-segments the recorded timeline offline and scores the result.
    ///
    /// On success the offline events replace the live ones. On any failure,
    /// including cancellation, the previous events and report are kept.
    pub fn generate_report<F>(
        &mut self,
        config: &AnalysisConfig,
        offline: &OfflineConfig,
        cancel: &AtomicBool,
        on_progress: F,
    ) -> Result<&Report>
    where
        F: FnMut(&Progress),
    {
        if self.running {
            return Err(Error::AnalysisFailed(
                "the session is still recording".to_string(),
            ));
        }
        let events = resegment(&self.log.timeline, config, offline, cancel, on_progress)?;
        let report = build_report(&events, config);
        self.log.events = events;
        Ok(self.report.insert(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentProfile;
    use std::sync::atomic::Ordering;

    fn sine_frame(freq: f64, sr: u32, len: usize, offset: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = (i + offset) as f64 / sr as f64;
                (0.3 * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
            })
            .collect()
    }

    fn reed() -> AnalysisConfig {
        AnalysisConfig {
            profile: InstrumentProfile::Reed,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn frames_are_ignored_until_started() {
        let mut session = Session::new();
        let frame = sine_frame(440.0, 44_100, 4096, 0);
        assert!(session.process_frame(&frame, 44_100, 0.0, &reed()).is_none());
        assert!(session.timeline().is_empty());
    }

    #[test]
    fn start_rejects_invalid_config() {
        let mut session = Session::new();
        let bad = AnalysisConfig { a_ref: -1.0, ..AnalysisConfig::default() };
        assert!(matches!(session.start(&bad), Err(Error::InvalidConfig(_))));
        assert!(!session.is_running());
    }

    #[test]
    fn estimate_is_held_between_ticks() {
        let config = reed();
        let mut session = Session::new();
        session.start(&config).unwrap();
        let frame = sine_frame(440.0, 44_100, 4096, 0);

        let first = session.process_frame(&frame, 44_100, 0.0, &config).unwrap();
        assert!(first.pitch.is_none());
        assert!(first.meter_percent > 0.0);

        let second = session.process_frame(&frame, 44_100, 10.0, &config).unwrap();
        let pitch = second.pitch.expect("estimate on the second tick");
        assert!((pitch.frequency_hz - 440.0).abs() < 2.0);
        assert_eq!(second.reading.map(|r| r.label), Some("A4".to_string()));

        let silent = vec![0.0f32; 4096];
        let third = session.process_frame(&silent, 44_100, 20.0, &config).unwrap();
        assert_eq!(third.pitch, second.pitch);
        let fourth = session.process_frame(&silent, 44_100, 30.0, &config).unwrap();
        assert!(fourth.pitch.is_none());
        assert!(fourth.reading.is_none());
    }

    #[test]
    fn failed_report_keeps_previous_state() {
        let config = reed();
        let mut session = Session::new();
        session.start(&config).unwrap();
        for i in 0..40 {
            let frame = sine_frame(440.0, 44_100, 4096, i * 441);
            session.process_frame(&frame, 44_100, i as f64 * 10.0, &config);
        }
        session.stop(&config);
        let live_events = session.events().to_vec();
        assert!(!live_events.is_empty());

        let cancel = AtomicBool::new(true);
        let result = session.generate_report(&config, &OfflineConfig::default(), &cancel, |_| {});
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(session.events(), live_events.as_slice());
        assert!(session.report().is_none());

        cancel.store(false, Ordering::Relaxed);
        let report = session
            .generate_report(&config, &OfflineConfig::default(), &cancel, |_| {})
            .unwrap();
        assert_eq!(report.long.total, 1);
        assert!(session.report().is_some());
    }

    #[test]
    fn live_scores_follow_the_live_events() {
        let config = reed();
        let mut session = Session::new();
        session.start(&config).unwrap();
        assert_eq!(session.live_scores().long.total, 0);
        assert_eq!(session.live_scores().long.score, 50.0);

        for i in 0..40 {
            let frame = sine_frame(440.0, 44_100, 4096, i * 441);
            session.process_frame(&frame, 44_100, i as f64 * 10.0, &config);
        }
        session.stop(&config);

        let scores = session.live_scores();
        assert_eq!(scores.long.total, 1);
        assert_eq!(scores.long.pass_count, 1);
        assert_eq!(scores.long.pass_streak, 1);
        assert_eq!(scores.long.score, 100.0);
        assert_eq!(scores.short_in.total, 0);
        assert_eq!(scores.short_in.score, 50.0);
    }

    #[test]
    fn report_requires_a_stopped_session() {
        let config = AnalysisConfig::default();
        let mut session = Session::new();
        session.start(&config).unwrap();
        let result = session.generate_report(&config, &OfflineConfig::default(), &AtomicBool::new(false), |_| {});
        assert!(matches!(result, Err(Error::AnalysisFailed(_))));
    }

    #[test]
    fn loaded_timeline_can_be_rescored() {
        let samples: Vec<TimelineSample> = (0..30)
            .map(|i| TimelineSample {
                t_ms: i as f64 * 10.0,
                cents: 4.0,
                pass: true,
                category: crate::event::EventCategory::Long,
                note_label: "D4".to_string(),
                midi_rounded: Some(62),
                rms: 0.05,
                frequency_hz: 294.3,
                confidence: 0.8,
            })
            .collect();
        let mut session = Session::with_timeline(samples);
        let config = AnalysisConfig::default();
        let report = session
            .generate_report(&config, &OfflineConfig::default(), &AtomicBool::new(false), |_| {})
            .unwrap();
        assert_eq!(report.long.total, 1);
        assert_eq!(report.long.pass_count, 1);
        assert_eq!(session.counters().long, 1);
    }
}
