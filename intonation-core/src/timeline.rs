//! # Pitch Timeline
//!
//! The per-tick record kept for the whole session, plus the category filters and
//! trend statistics the presentation layer draws from it.

use serde::{Deserialize, Deserializer, Serialize};

use crate::event::{EventCategory, FinalizedEvent};
use crate::stats::{mean, std_dev};

fn missing() -> f64 {
    f64::NAN
}

/// JSON has no NaN; serde_json writes it as `null`, so read `null` back as NaN.
fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// One accepted pitch tick. Appended in temporal order and never modified.
///
/// Fields absent from a loaded timeline deserialize as NaN / `None`; the
/// offline pass drops such samples instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSample {
    #[serde(default = "missing", deserialize_with = "nullable")]
    pub t_ms: f64,
    #[serde(default = "missing", deserialize_with = "nullable")]
    pub cents: f64,
    #[serde(default)]
    pub pass: bool,
    /// Category at the time of the tick, from elapsed time since the candidate
    /// started. May disagree with the category the event finally receives.
    #[serde(default = "default_category")]
    pub category: EventCategory,
    #[serde(default)]
    pub note_label: String,
    #[serde(default)]
    pub midi_rounded: Option<i32>,
    #[serde(default = "missing", deserialize_with = "nullable")]
    pub rms: f64,
    #[serde(default = "missing", deserialize_with = "nullable")]
    pub frequency_hz: f64,
    #[serde(default = "missing", deserialize_with = "nullable")]
    pub confidence: f64,
}

fn default_category() -> EventCategory {
    EventCategory::Other
}

impl TimelineSample {
    /// Whether the sample carries everything segmentation needs.
    pub fn is_usable(&self) -> bool {
        self.t_ms.is_finite() && self.cents.is_finite() && self.midi_rounded.is_some()
    }
}

/// Category selection for tables and trend charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFilter {
    #[default]
    All,
    Long,
    ShortIn,
    Other,
}

impl EventFilter {
    pub fn matches(self, category: EventCategory) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Long => category == EventCategory::Long,
            EventFilter::ShortIn => category == EventCategory::ShortIn,
            EventFilter::Other => category == EventCategory::Other,
        }
    }

    pub fn events<'a>(self, events: &'a [FinalizedEvent]) -> impl Iterator<Item = &'a FinalizedEvent> + 'a {
        events.iter().filter(move |e| self.matches(e.category))
    }

    pub fn samples<'a>(self, timeline: &'a [TimelineSample]) -> impl Iterator<Item = &'a TimelineSample> + 'a {
        timeline.iter().filter(move |s| self.matches(s.category))
    }
}

/// Spread of the cents trajectory; a larger deviation means a less steady pitch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStats {
    pub samples: usize,
    pub mean_abs_cents: Option<f64>,
    pub std_dev_cents: Option<f64>,
}

impl TrendStats {
    pub fn from_timeline(timeline: &[TimelineSample], filter: EventFilter) -> Self {
        let cents: Vec<f64> = filter
            .samples(timeline)
            .map(|s| s.cents)
            .filter(|c| c.is_finite())
            .collect();
        let abs: Vec<f64> = cents.iter().map(|c| c.abs()).collect();
        Self {
            samples: cents.len(),
            mean_abs_cents: mean(&abs),
            std_dev_cents: std_dev(&cents),
        }
    }
}
