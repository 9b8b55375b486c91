//! Live microphone session.
//!
//! Each tick prints the reading, the input level and the streak-adjusted long
//! and short scores of the live events.

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{after, bounded, select};
use intonation_core::{audio, AnalysisConfig, FrameAssembler, Session};
use log::{info, warn};
use std::io::Write;
use std::time::Duration;

/// Chunks buffered between the audio callback and the analysis loop.
const CHUNK_QUEUE: usize = 64;

/// Records from the default input for `seconds`, printing a live reading per
/// accepted tick, and returns the stopped session.
pub fn record(seconds: f64, config: &AnalysisConfig) -> Result<Session> {
    let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(CHUNK_QUEUE);
    let capture = audio::start_audio_capture(chunk_tx).context("Audio capture failed to start")?;
    let sample_rate = capture.sample_rate;

    let mut session = Session::new();
    session.start(config)?;
    let mut assembler = FrameAssembler::new(sample_rate);
    let window = config.profile.window_size();
    let deadline = after(Duration::from_secs_f64(seconds.max(0.0)));
    info!("[LIVE] Recording for {:.1} s", seconds);

    let stderr = std::io::stderr();
    loop {
        select! {
            recv(chunk_rx) -> msg => match msg {
                Ok(chunk) => {
                    assembler.push(&chunk);
                    while let Some(frame) = assembler.next_frame(window) {
                        let Some(tick) = session.process_frame(&frame.samples, sample_rate, frame.t_ms, config) else {
                            continue;
                        };
                        let scores = session.live_scores();
                        let mut out = stderr.lock();
                        let _ = match &tick.reading {
                            Some(r) => write!(
                                out,
                                "\r{:<4} {:>8.2} Hz {:>+6.1} c  level {:>3.0}%  long {:>3.0}  short {:>3.0}   ",
                                r.label, r.frequency_hz, r.cents, tick.meter_percent, scores.long.score, scores.short_in.score
                            ),
                            None => write!(
                                out,
                                "\r{:<4} {:>8} Hz {:>8}  level {:>3.0}%  long {:>3.0}  short {:>3.0}   ",
                                "-", "-", "", tick.meter_percent, scores.long.score, scores.short_in.score
                            ),
                        };
                        let _ = out.flush();
                    }
                }
                Err(_) => {
                    warn!("[LIVE] Audio channel closed");
                    break;
                }
            },
            recv(deadline) -> _ => break,
        }
    }
    eprintln!();

    if let Err(e) = capture.stream.pause() {
        warn!("[LIVE] Error pausing stream: {}", e);
    }
    let dropped = capture.dropped_chunks();
    drop(capture);
    if dropped > 0 {
        warn!("[LIVE] {} audio chunk(s) dropped; event times after them run early", dropped);
    }
    session.stop(config);
    let counts = session.counters();
    info!(
        "[LIVE] {} live events ({} long, {} short in key, {} other)",
        counts.all, counts.long, counts.short_in, counts.other
    );
    Ok(session)
}
