//! Loading recordings, saved timelines and configuration files.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use intonation_core::{AnalysisConfig, TimelineSample};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A mono recording.
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Reads a WAV file and mixes all channels down to mono.
pub fn load_wav(path: &Path) -> Result<Recording> {
    let mut reader = WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("{} declares no channels", path.display());
    }
    if spec.sample_format == SampleFormat::Int && !(1..=32).contains(&spec.bits_per_sample) {
        bail!("Unsupported bit depth: {}", spec.bits_per_sample);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to decode integer samples")?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to decode float samples")?,
    };

    let channels = spec.channels as usize;
    let samples: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    info!(
        "[INPUT] {}: {} Hz, {} channel(s), {:.2} s",
        path.display(),
        spec.sample_rate,
        spec.channels,
        samples.len() as f64 / spec.sample_rate as f64
    );
    Ok(Recording {
        samples,
        sample_rate: spec.sample_rate,
    })
}

pub fn load_timeline(path: &Path) -> Result<Vec<TimelineSample>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let timeline: Vec<TimelineSample> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a timeline file", path.display()))?;
    debug!("[INPUT] Loaded {} timeline samples", timeline.len());
    Ok(timeline)
}

pub fn save_timeline(path: &Path, timeline: &[TimelineSample]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), timeline).context("Failed to write timeline")?;
    info!("[INPUT] Timeline saved to {}", path.display());
    Ok(())
}

pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}
