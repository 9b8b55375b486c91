//! # Intonation - Practice Intonation Trainer
//!
//! Command line front end for the intonation core. It records or loads a
//! performance, runs the online segmenter over it, re-segments the timeline
//! offline and prints the scored report.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, capture or file input, output
//! - **Analysis Thread**: the offline pass, reporting progress back
//! - **Communication**: crossbeam channels between the two

mod input;
#[cfg(feature = "live")]
mod live;
mod render;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::unbounded;
use intonation_core::{
    replay, snap_cents_tolerance, AnalysisConfig, Error as CoreError, EventFilter, InstrumentProfile, KeySignature,
    OfflineConfig, Progress, Session,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread;

use render::SessionSummary;

/// Intonation practice trainer
#[derive(Parser)]
#[command(name = "intonation")]
#[command(about = "Score the intonation of a monophonic performance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a WAV recording
    Analyze {
        /// Input audio file (WAV, any channel count)
        input: PathBuf,

        #[command(flatten)]
        options: SessionOptions,
    },
    /// Re-run the offline pass on a saved timeline
    Resegment {
        /// Timeline JSON written by --timeline-out
        timeline: PathBuf,

        #[command(flatten)]
        options: SessionOptions,
    },
    /// Record from the default input device
    #[cfg(feature = "live")]
    Live {
        /// Recording length in seconds
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f64,

        #[command(flatten)]
        options: SessionOptions,
    },
}

#[derive(Args, Debug)]
struct SessionOptions {
    /// Major key for in-key classification (C, G, D, A, E, B, F, Bb, Eb, Ab)
    #[arg(short, long)]
    key: Option<KeySignature>,

    /// Reference pitch of A4 in Hz
    #[arg(long)]
    a_ref: Option<f64>,

    /// Pass tolerance in cents (snapped to 5..50 in steps of 5)
    #[arg(short, long)]
    tol: Option<f64>,

    /// Input profile (voice, reed)
    #[arg(short, long)]
    profile: Option<InstrumentProfile>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event category to list (all, long, short_in, other)
    #[arg(long, default_value = "all", value_parser = render::parse_filter)]
    show: EventFilter,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Save the pitch timeline as JSON
    #[arg(long)]
    timeline_out: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl SessionOptions {
    fn resolve_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => input::load_config(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(a_ref) = self.a_ref {
            config.a_ref = a_ref;
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(tol) = self.tol {
            let snapped = snap_cents_tolerance(tol);
            if snapped != tol {
                warn!("[MAIN] Tolerance {} c snapped to {} c", tol, snapped);
            }
            config.cents_tol = snapped;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Messages from the analysis thread.
enum AnalysisMessage {
    Progress(Progress),
    Finished(Box<Session>, Result<(), CoreError>),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (session, config, options) = match cli.command {
        Commands::Analyze { input, options } => {
            init_logging(options.verbose);
            let config = options.resolve_config()?;
            let recording = input::load_wav(&input)?;
            let session = replay(&recording.samples, recording.sample_rate, &config)?;
            (session, config, options)
        }
        Commands::Resegment { timeline, options } => {
            init_logging(options.verbose);
            let config = options.resolve_config()?;
            let timeline = input::load_timeline(&timeline)?;
            (Session::with_timeline(timeline), config, options)
        }
        #[cfg(feature = "live")]
        Commands::Live { seconds, options } => {
            init_logging(options.verbose);
            let config = options.resolve_config()?;
            let session = live::record(seconds, &config)?;
            (session, config, options)
        }
    };

    if let Some(path) = &options.timeline_out {
        input::save_timeline(path, session.timeline())?;
    }

    let session = run_offline(session, config.clone(), OfflineConfig::default(), !options.json)?;
    let report = session
        .report()
        .ok_or_else(|| anyhow!("The offline pass finished without a report"))?;

    let summary = SessionSummary::new(&config, report, session.events(), session.timeline(), options.show);
    if options.json {
        summary.print_json()?;
    } else {
        summary.print_text();
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

/// Runs the offline pass on a worker thread, drawing its progress on stderr.
fn run_offline(session: Session, config: AnalysisConfig, offline: OfflineConfig, show_progress: bool) -> Result<Session> {
    let (tx, rx) = unbounded::<AnalysisMessage>();
    let handle = thread::spawn(move || {
        let mut session = session;
        let cancel = AtomicBool::new(false);
        let progress_tx = tx.clone();
        let result = session
            .generate_report(&config, &offline, &cancel, |p| {
                let _ = progress_tx.send(AnalysisMessage::Progress(*p));
            })
            .map(|_| ());
        let _ = tx.send(AnalysisMessage::Finished(Box::new(session), result));
    });

    let outcome = loop {
        match rx.recv() {
            Ok(AnalysisMessage::Progress(p)) => {
                if show_progress {
                    eprint!("\r[{:>3}%] {:<14} {:<40}", p.percent, p.phase.label(), p.detail);
                }
            }
            Ok(AnalysisMessage::Finished(session, result)) => break result.map(|()| *session),
            Err(_) => break Err(CoreError::AnalysisFailed("analysis thread exited".to_string())),
        }
    };
    if show_progress {
        eprintln!();
    }
    if handle.join().is_err() {
        warn!("[MAIN] Analysis thread panicked");
    }

    let session = outcome?;
    info!("[MAIN] Offline pass produced {} events", session.events().len());
    Ok(session)
}
