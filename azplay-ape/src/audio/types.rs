//! Core audio data types
//!
//! Defines the fixed-size blocks exchanged between the decoder and the
//! real-time callback, and the channel mapping applied when a block is
//! written to the device.

use std::time::Duration;

/// One block of decoded audio.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Interleaved by channel: `[c0, c1, c0, c1, ...]`
/// - Always exactly the device block size in frames; the final block of a
///   file is zero-padded
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    channels: u16,
}

impl AudioBlock {
    /// Wrap interleaved samples. `samples.len()` must be a multiple of `channels`.
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        debug_assert!(channels > 0);
        debug_assert_eq!(samples.len() % channels as usize, 0);
        Self { samples, channels }
    }

    /// A block of silence
    pub fn silent(frames: usize, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], channels)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Format of a decoded source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Fixed properties of an opened output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Frames per real-time callback
    pub block_frames: usize,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DeviceSpec {
    /// Wall time represented by one block
    pub fn block_duration(&self) -> Duration {
        Duration::from_nanos(self.block_frames as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// Timing information supplied by the host with each callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackTiming {
    /// Time between the callback and the moment its output reaches the DAC
    pub output_latency: Option<Duration>,
}

/// Copy a block into an interleaved device buffer.
///
/// - Mono source on a multi-channel device: the single channel is duplicated
///   to every output channel.
/// - Otherwise channels map 1:1; extra source channels are dropped and extra
///   device channels are zero-filled.
///
/// Frames beyond the block's length are zero-filled. Never allocates.
pub fn map_channels(block: &AudioBlock, out: &mut [f32], out_channels: usize) {
    let src_channels = block.channels() as usize;
    let src = block.samples();
    let block_frames = block.frames();

    for (frame_idx, frame) in out.chunks_mut(out_channels).enumerate() {
        if frame_idx >= block_frames {
            frame.fill(0.0);
            continue;
        }
        let base = frame_idx * src_channels;
        if src_channels == 1 {
            frame.fill(src[base]);
        } else {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = if ch < src_channels { src[base + ch] } else { 0.0 };
            }
        }
    }
}
