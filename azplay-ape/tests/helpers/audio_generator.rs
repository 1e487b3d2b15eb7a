//! Audio test file generation
//!
//! Generates small 16-bit PCM WAV files with known sample values so decoder
//! output can be checked sample by sample.

use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Write a WAV whose frame `i` holds the value `i` on every channel
///
/// # Arguments
/// * `path` - Output file path
/// * `sample_rate` - Frames per second
/// * `channels` - Channel count
/// * `frames` - Number of frames
pub fn generate_ramp_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    frames: u32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for _ in 0..channels {
            writer.write_sample(frame as i16)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Write a WAV holding a constant value
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    frames: u32,
    value: i16,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames as u64 * channels as u64 {
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Decoded f32 value of a 16-bit sample
pub fn pcm16(value: i16) -> f32 {
    value as f32 / 32768.0
}
