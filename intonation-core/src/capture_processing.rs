//! # Capture Processing Module
//!
//! Turns captured audio, delivered in chunks of any size, into the overlapping
//! analysis frames the session consumes.
//!
//! ## Features
//! - One frame per `HOP_MS` of audio, each ending at the newest sample consumed
//! - Frame length follows the active profile and may change between frames
//! - Stream timestamps derived from the sample count, not the wall clock
//! - Whole-buffer replay of a recording through a fresh session

use log::debug;

use crate::config::{AnalysisConfig, HOP_MS};
use crate::error::Result;
use crate::session::Session;

/// One analysis frame and its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    pub samples: Vec<f32>,
    /// Stream time of the frame's last sample, in ms
    pub t_ms: f64,
}

/// Sliding-window frame builder over a mono sample stream.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    sample_rate: u32,
    hop: usize,
    buffer: Vec<f32>,
    /// Stream index of `buffer[0]`
    buffer_start: u64,
    /// Stream index just past the newest sample handed out in a frame
    consumed: u64,
    /// Largest window requested so far; history is kept for it
    retain: usize,
}

impl FrameAssembler {
    pub fn new(sample_rate: u32) -> Self {
        let hop = ((sample_rate as f64 * HOP_MS / 1000.0).round() as usize).max(1);
        Self {
            sample_rate,
            hop,
            buffer: Vec::new(),
            buffer_start: 0,
            consumed: 0,
            retain: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples advanced per frame.
    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn push(&mut self, chunk: &[f32]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Builds the next frame of `window` samples once a full hop of new audio
    /// is available. The start of the stream is zero-padded.
    pub fn next_frame(&mut self, window: usize) -> Option<AnalysisFrame> {
        let buffered_end = self.buffer_start + self.buffer.len() as u64;
        if buffered_end - self.consumed < self.hop as u64 {
            return None;
        }
        self.consumed += self.hop as u64;
        self.retain = self.retain.max(window);

        let end = (self.consumed - self.buffer_start) as usize;
        let start = end.saturating_sub(window);
        let mut samples = vec![0.0f32; window - (end - start)];
        samples.extend_from_slice(&self.buffer[start..end]);

        let t_ms = self.consumed as f64 / self.sample_rate as f64 * 1000.0;

        // Drop history no frame can reach any more.
        let keep_from = end.saturating_sub(self.retain);
        if keep_from > 0 {
            self.buffer.drain(..keep_from);
            self.buffer_start += keep_from as u64;
        }

        Some(AnalysisFrame { samples, t_ms })
    }
}

/// Runs a complete mono recording through a new session and stops it.
///
/// The returned session holds the live events and timeline; call
/// [`Session::generate_report`] for the offline pass.
pub fn replay(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Result<Session> {
    let mut session = Session::new();
    session.start(config)?;

    let mut assembler = FrameAssembler::new(sample_rate);
    assembler.push(samples);
    let window = config.profile.window_size();
    let mut ticks = 0usize;
    while let Some(frame) = assembler.next_frame(window) {
        session.process_frame(&frame.samples, sample_rate, frame.t_ms, config);
        ticks += 1;
    }
    debug!(
        "[REPLAY] {} samples at {} Hz replayed as {} ticks",
        samples.len(),
        sample_rate,
        ticks
    );

    session.stop(config);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_is_ten_milliseconds() {
        assert_eq!(FrameAssembler::new(48_000).hop(), 480);
        assert_eq!(FrameAssembler::new(44_100).hop(), 441);
    }

    #[test]
    fn frames_wait_for_a_full_hop() {
        let mut fa = FrameAssembler::new(1000);
        fa.push(&[1.0; 9]);
        assert!(fa.next_frame(4).is_none());
        fa.push(&[2.0]);
        let frame = fa.next_frame(4).unwrap();
        assert_eq!(frame.samples, vec![1.0, 1.0, 1.0, 2.0]);
        assert_eq!(frame.t_ms, 10.0);
        assert!(fa.next_frame(4).is_none());
    }

    #[test]
    fn stream_start_is_zero_padded() {
        let mut fa = FrameAssembler::new(1000);
        let ramp: Vec<f32> = (1..=20).map(|v| v as f32).collect();
        fa.push(&ramp);
        let first = fa.next_frame(15).unwrap();
        assert_eq!(first.samples.len(), 15);
        assert_eq!(&first.samples[..5], &[0.0; 5]);
        assert_eq!(first.samples[14], 10.0);

        let second = fa.next_frame(15).unwrap();
        assert_eq!(second.samples[0], 6.0);
        assert_eq!(second.samples[14], 20.0);
        assert_eq!(second.t_ms, 20.0);
    }

    #[test]
    fn window_can_grow_between_frames() {
        let mut fa = FrameAssembler::new(1000);
        let ramp: Vec<f32> = (1..=40).map(|v| v as f32).collect();
        fa.push(&ramp);
        fa.next_frame(5).unwrap();
        fa.next_frame(5).unwrap();
        // Only the last five samples were retained, the rest is zero-padded.
        let grown = fa.next_frame(20).unwrap();
        assert_eq!(grown.samples.len(), 20);
        assert_eq!(grown.samples[19], 30.0);
        assert_eq!(grown.samples[5], 16.0);
        let next = fa.next_frame(20).unwrap();
        assert_eq!(next.samples[0], 21.0);
    }

    #[test]
    fn replay_produces_a_stopped_session() {
        let sr = 44_100;
        let samples: Vec<f32> = (0..sr / 2)
            .map(|i| (0.3 * (2.0 * std::f64::consts::PI * 587.33 * i as f64 / sr as f64).sin()) as f32)
            .collect();
        let config = AnalysisConfig {
            profile: crate::config::InstrumentProfile::Reed,
            ..AnalysisConfig::default()
        };
        let session = replay(&samples, sr, &config).unwrap();
        assert!(!session.is_running());
        assert!(!session.timeline().is_empty());
        let long_d5 = session
            .events()
            .iter()
            .filter(|e| e.target_label == "D5" && e.category == crate::event::EventCategory::Long)
            .count();
        assert_eq!(long_d5, 1);
    }
}
