//! # Audio Capture Module
//!
//! Live microphone input through CPAL. The callback only copies samples out of
//! the device buffer; framing and analysis happen on the receiving thread.
//!
//! ## Features
//! - Default input device, any channel count (the first channel is used)
//! - Sample rate nearest to 48 kHz within the device's supported range
//! - Chunks forwarded over a crossbeam channel, dropped when the receiver lags;
//!   drops are counted, never logged from the callback

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use log::{error, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// A running input stream. Capture stops when it is dropped.
pub struct AudioCapture {
    pub stream: cpal::Stream,
    pub sample_rate: u32,
    dropped: Arc<AtomicUsize>,
}

impl AudioCapture {
    /// Chunks discarded because the receiver was full. Each one is a hole in
    /// the stream that frame timestamps do not account for.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Starts capture from the default input device.
///
/// # Arguments
/// * `sender` - Receives mono `f32` chunks in capture order
///
/// # Returns
/// * `Ok(capture)` - Running stream, its rate and the drop counter
/// * `Err(e)` - No device, no usable `f32` configuration, or the stream failed to start
pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<AudioCapture> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    info!(
        "[AUDIO] Using input device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string())
    );

    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .context("Failed to query input configurations")?
        .collect();
    let range = pick_config(ranges, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No f32 input configuration available"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    let channels = range.channels().max(1) as usize;
    let config: cpal::StreamConfig = range.with_sample_rate(cpal::SampleRate(rate)).into();
    info!("[AUDIO] Capturing {} channel(s) at {} Hz", channels, rate);

    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_in_callback = Arc::clone(&dropped);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward_first_channel(data, channels, &sender, &dropped_in_callback);
            },
            |err| error!("[AUDIO] Stream error: {}", err),
            None,
        )
        .context("Failed to build input stream")?;
    stream.play().context("Failed to start input stream")?;

    Ok(AudioCapture {
        stream,
        sample_rate: rate,
        dropped,
    })
}

/// Sends the first channel of an interleaved buffer without blocking. A full
/// channel costs the chunk and bumps `dropped`.
fn forward_first_channel(data: &[f32], channels: usize, sender: &Sender<Vec<f32>>, dropped: &AtomicUsize) {
    let mono: Vec<f32> = data.iter().step_by(channels.max(1)).copied().collect();
    if sender.try_send(mono).is_err() {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Prefers `f32` configurations with fewer channels whose range is closest to
/// `target_rate`.
fn pick_config(configs: Vec<SupportedStreamConfigRange>, target_rate: u32) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let lo = c.min_sample_rate().0;
            let hi = c.max_sample_rate().0;
            let distance = if target_rate < lo {
                lo - target_rate
            } else {
                target_rate.saturating_sub(hi)
            };
            (distance, c.channels())
        })
}
