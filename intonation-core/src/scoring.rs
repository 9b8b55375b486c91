//! # Scoring Engine
//!
//! Turns a finalized event list into per-category scores and the session report.
//!
//! ## Features
//! - Streak-adjusted category scores for the live view
//! - Plain pass-ratio scores for the final report
//! - Short notes only weigh into the overall score once they make up more than
//!   a fifth of all notes

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{AnalysisConfig, MIN_SCORE_MS};
use crate::event::{EventCategory, FinalizedEvent};
use crate::stats::mean;

/// Score of a category with no events.
const NEUTRAL_SCORE: f64 = 50.0;
const STREAK_BONUS_PER_EVENT: f64 = 0.8;
const STREAK_PENALTY_PER_EVENT: f64 = 1.0;
const STREAK_CAP: f64 = 12.0;
/// Fail streaks shorter than this cost nothing.
const FAIL_STREAK_MIN: usize = 3;
/// Short notes must exceed this share of all notes to count toward the overall score.
const SHORT_SHARE_THRESHOLD: f64 = 0.20;
const LONG_WEIGHT: f64 = 1.0;

/// Streak-adjusted score of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    /// Pass percentage, or 50 with no events
    pub base: f64,
    /// Consecutive passes at the end of the category's events
    pub pass_streak: usize,
    /// Consecutive failures at the end of the category's events
    pub fail_streak: usize,
    pub bonus: f64,
    pub penalty: f64,
    pub score: f64,
}

impl CategoryScore {
    /// A category at or above 50 counts as passed.
    pub fn is_passing(&self) -> bool {
        self.score >= NEUTRAL_SCORE
    }
}

/// Scores the events of one category in finalize order.
pub fn category_score(events: &[FinalizedEvent], category: EventCategory) -> CategoryScore {
    let passes: Vec<bool> = events
        .iter()
        .filter(|e| e.category == category)
        .map(|e| e.pass)
        .collect();
    score_pass_sequence(&passes)
}

fn score_pass_sequence(passes: &[bool]) -> CategoryScore {
    let total = passes.len();
    if total == 0 {
        return CategoryScore {
            total: 0,
            pass_count: 0,
            fail_count: 0,
            base: NEUTRAL_SCORE,
            pass_streak: 0,
            fail_streak: 0,
            bonus: 0.0,
            penalty: 0.0,
            score: NEUTRAL_SCORE,
        };
    }

    let pass_count = passes.iter().filter(|&&p| p).count();
    let fail_count = total - pass_count;
    let base = 100.0 * pass_count as f64 / total as f64;

    let pass_streak = passes.iter().rev().take_while(|&&p| p).count();
    let fail_streak = passes.iter().rev().take_while(|&&p| !p).count();

    let bonus = if pass_streak > 1 {
        ((pass_streak - 1) as f64 * STREAK_BONUS_PER_EVENT).clamp(0.0, STREAK_CAP)
    } else {
        0.0
    };
    let penalty = if fail_streak >= FAIL_STREAK_MIN {
        ((fail_streak - 2) as f64 * STREAK_PENALTY_PER_EVENT).clamp(0.0, STREAK_CAP)
    } else {
        0.0
    };

    CategoryScore {
        total,
        pass_count,
        fail_count,
        base,
        pass_streak,
        fail_streak,
        bonus,
        penalty,
        score: (base + bonus - penalty).clamp(0.0, 100.0),
    }
}

/// The two streak-adjusted scores shown while a session is running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveScores {
    pub long: CategoryScore,
    pub short_in: CategoryScore,
}

impl LiveScores {
    pub fn from_events(events: &[FinalizedEvent]) -> Self {
        Self {
            long: category_score(events, EventCategory::Long),
            short_in: category_score(events, EventCategory::ShortIn),
        }
    }
}

/// Event totals per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub all: usize,
    pub long: usize,
    pub short_in: usize,
    pub other: usize,
}

impl EventCounts {
    pub fn from_events(events: &[FinalizedEvent]) -> Self {
        let mut counts = EventCounts::default();
        for event in events {
            counts.all += 1;
            match event.category {
                EventCategory::Long => counts.long += 1,
                EventCategory::ShortIn => counts.short_in += 1,
                EventCategory::Other => counts.other += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallMode {
    OnlyLong,
    LongPlusShort,
}

impl fmt::Display for OverallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverallMode::OnlyLong => "only_long",
            OverallMode::LongPlusShort => "long_plus_short",
        })
    }
}

/// Plain pass-ratio summary of one category in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub total: usize,
    pub pass_count: usize,
    /// Pass percentage; 0 when the category is empty
    pub score: f64,
    pub mean_abs_cents: Option<f64>,
}

impl CategorySummary {
    fn from_events<'a>(events: impl Iterator<Item = &'a FinalizedEvent>) -> Self {
        let (mut total, mut pass_count) = (0, 0);
        let mut abs_cents = Vec::new();
        for event in events {
            total += 1;
            if event.pass {
                pass_count += 1;
            }
            abs_cents.push(event.cents.abs());
        }
        Self {
            total,
            pass_count,
            score: if total > 0 { 100.0 * pass_count as f64 / total as f64 } else { 0.0 },
            mean_abs_cents: mean(&abs_cents),
        }
    }
}

/// Aggregate result of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub overall_score: f64,
    pub overall_mode: OverallMode,
    /// Share of short in-key notes among all scored notes
    pub short_share: f64,
    pub total_notes: usize,
    pub long: CategorySummary,
    pub short_in: CategorySummary,
    pub other_count: usize,
    /// Mean |cents| over long and short in-key notes together
    pub all_mean_abs_cents: Option<f64>,
    pub long_streak: CategoryScore,
    pub short_streak: CategoryScore,
}

/// Builds the report for a final event list.
///
/// Events shorter than `MIN_SCORE_MS` count as "other" here, even if they
/// were scored in the live view.
pub fn build_report(events: &[FinalizedEvent], config: &AnalysisConfig) -> Report {
    let scored: Vec<FinalizedEvent> = events
        .iter()
        .map(|e| {
            let mut e = e.clone();
            if e.duration_ms < MIN_SCORE_MS {
                e.category = EventCategory::Other;
            }
            e
        })
        .collect();

    let long = CategorySummary::from_events(scored.iter().filter(|e| e.category == EventCategory::Long));
    let short_in =
        CategorySummary::from_events(scored.iter().filter(|e| e.category == EventCategory::ShortIn));
    let other_count = scored.iter().filter(|e| e.category == EventCategory::Other).count();

    let total_notes = long.total + short_in.total + other_count;
    let short_share = if total_notes > 0 {
        short_in.total as f64 / total_notes as f64
    } else {
        0.0
    };

    let (overall_score, overall_mode) = if short_share > SHORT_SHARE_THRESHOLD {
        (
            (LONG_WEIGHT * long.score + config.w_short * short_in.score) / (LONG_WEIGHT + config.w_short),
            OverallMode::LongPlusShort,
        )
    } else {
        (long.score, OverallMode::OnlyLong)
    };

    let scored_abs: Vec<f64> = scored
        .iter()
        .filter(|e| e.category != EventCategory::Other)
        .map(|e| e.cents.abs())
        .collect();

    let report = Report {
        overall_score,
        overall_mode,
        short_share,
        total_notes,
        long,
        short_in,
        other_count,
        all_mean_abs_cents: mean(&scored_abs),
        long_streak: category_score(events, EventCategory::Long),
        short_streak: category_score(events, EventCategory::ShortIn),
    };
    info!(
        "[REPORT] overall {:.0} ({}), long {}/{}, short {}/{}, other {}",
        report.overall_score,
        report.overall_mode,
        report.long.pass_count,
        report.long.total,
        report.short_in.pass_count,
        report.short_in.total,
        report.other_count
    );
    report
}
