//! Text and JSON output of a finished session.

use anyhow::Result;
use intonation_core::{
    AnalysisConfig, CategoryScore, EventCounts, EventFilter, FinalizedEvent, OverallMode, Report,
    TimelineSample, TrendStats,
};
use serde::Serialize;

/// Everything `--json` prints.
#[derive(Serialize)]
pub struct SessionSummary<'a> {
    pub config: &'a AnalysisConfig,
    pub report: &'a Report,
    pub counts: EventCounts,
    pub trend: TrendStats,
    pub events: Vec<&'a FinalizedEvent>,
}

impl<'a> SessionSummary<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        report: &'a Report,
        events: &'a [FinalizedEvent],
        timeline: &'a [TimelineSample],
        filter: EventFilter,
    ) -> Self {
        Self {
            config,
            report,
            counts: EventCounts::from_events(events),
            trend: TrendStats::from_timeline(timeline, filter),
            events: filter.events(events).collect(),
        }
    }

    pub fn print_json(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }

    pub fn print_text(&self) {
        let c = self.config;
        println!(
            "Settings: {} input, key {} major, A4={} Hz, tolerance +/-{} c, long >= {} ms, short weight {:.2}",
            c.profile, c.key, c.a_ref, c.cents_tol, c.long_ms, c.w_short
        );
        println!();

        let r = self.report;
        let mode = match r.overall_mode {
            OverallMode::OnlyLong => "long notes only",
            OverallMode::LongPlusShort => "long + short notes",
        };
        println!("Overall score: {:.0} ({})", r.overall_score, mode);
        println!(
            "  Long notes:     {:>3}  passed {:>3}  score {}  mean |c| {}",
            r.long.total,
            r.long.pass_count,
            score_or_dash(r.long.total, r.long.score),
            cents_or_dash(r.long.mean_abs_cents)
        );
        println!(
            "  Short in key:   {:>3}  passed {:>3}  score {}  mean |c| {}",
            r.short_in.total,
            r.short_in.pass_count,
            score_or_dash(r.short_in.total, r.short_in.score),
            cents_or_dash(r.short_in.mean_abs_cents)
        );
        println!("  Other:          {:>3}", r.other_count);
        println!(
            "  Short share {:.0}%, mean |c| over scored notes {}",
            r.short_share * 100.0,
            cents_or_dash(r.all_mean_abs_cents)
        );
        println!();
        print_streak("Long streak score", &r.long_streak);
        print_streak("Short streak score", &r.short_streak);
        println!();

        println!(
            "{:>7} {:>7} {:>6}  {:<5} {:<5} {:>8} {:>7} {:>5}  {:<8} {}",
            "start", "end", "dur", "note", "tgt", "Hz", "cents", "conf", "class", "result"
        );
        for e in &self.events {
            println!(
                "{:>7.0} {:>7.0} {:>6.0}  {:<5} {:<5} {:>8.2} {:>+7.1} {:>5.2}  {:<8} {}",
                e.start_ms,
                e.end_ms,
                e.duration_ms,
                e.detected_label,
                e.target_label,
                e.measured_frequency_hz,
                e.cents,
                e.confidence,
                e.category.as_str(),
                if e.passes_within(c.cents_tol) { "pass" } else { "FAIL" }
            );
        }
        println!();
        println!(
            "Trend: {} samples, mean |c| {}, std dev {}",
            self.trend.samples,
            cents_or_dash(self.trend.mean_abs_cents),
            cents_or_dash(self.trend.std_dev_cents)
        );
    }
}

fn print_streak(label: &str, s: &CategoryScore) {
    println!(
        "{}: {:.0} ({}/{} passed, pass streak {} +{:.1}, fail streak {} -{:.1}) {}",
        label,
        s.score,
        s.pass_count,
        s.total,
        s.pass_streak,
        s.bonus,
        s.fail_streak,
        s.penalty,
        if s.is_passing() { "PASS" } else { "FAIL" }
    );
}

fn score_or_dash(total: usize, score: f64) -> String {
    if total > 0 { format!("{:>3.0}", score) } else { "  -".to_string() }
}

fn cents_or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1} c", v))
}

/// Parses an `--show` value.
pub fn parse_filter(s: &str) -> std::result::Result<EventFilter, String> {
    match s.to_ascii_lowercase().as_str() {
        "all" => Ok(EventFilter::All),
        "long" => Ok(EventFilter::Long),
        "short" | "short_in" => Ok(EventFilter::ShortIn),
        "other" => Ok(EventFilter::Other),
        other => Err(format!("unknown category '{}' (all, long, short_in, other)", other)),
    }
}
