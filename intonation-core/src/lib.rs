// intonation-core/src/lib.rs

//! The core logic for the intonation practice trainer.
//! This crate estimates pitch, cuts the pitch stream into note events, re-cuts
//! the recorded timeline once a session ends, and scores the result against a
//! cents tolerance and a major key. It is completely headless and contains no
//! terminal or GUI code.

#[cfg(feature = "capture")]
pub mod audio;
pub mod capture_processing;
pub mod config;
pub mod error;
pub mod event;
pub mod fft;
pub mod key;
pub mod offline;
pub mod pitch;
pub mod scoring;
pub mod segmenter;
pub mod session;
pub mod stats;
pub mod timeline;
pub mod tuning;

pub use capture_processing::{replay, AnalysisFrame, FrameAssembler};
pub use config::{snap_cents_tolerance, AnalysisConfig, InstrumentProfile, OfflineConfig};
pub use error::{Error, Result};
pub use event::{EventCategory, FinalizedEvent};
pub use key::KeySignature;
pub use offline::{resegment, Phase, Progress, Resegmenter};
pub use pitch::{PitchEstimate, YinEstimator};
pub use scoring::{build_report, CategoryScore, EventCounts, LiveScores, OverallMode, Report};
pub use segmenter::LiveReading;
pub use session::{Session, TickOutput};
pub use timeline::{EventFilter, TimelineSample, TrendStats};
