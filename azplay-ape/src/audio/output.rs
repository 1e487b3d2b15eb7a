//! Audio output using cpal
//!
//! Manages audio device output with callback-based playback. Each playout
//! session opens its own stream; the stream lives on the session's worker
//! thread and is closed by dropping it.

use crate::audio::types::{CallbackTiming, DeviceSpec};
use crate::error::{Error, Result};
use azplay_common::events::DeviceInfo;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

/// Real-time render callback: fill one interleaved device buffer.
///
/// Arguments are the buffer, the device channel count and host timing.
pub type RenderFn = Box<dyn FnMut(&mut [f32], u16, CallbackTiming) + Send + 'static>;

/// Called (possibly from the audio thread) when the host reports a stream error
pub type FaultFn = Box<dyn FnMut(DeviceFault) + Send + 'static>;

/// Asynchronous failure reported by the audio host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    /// Device has gone away: every session on it must abort
    pub shutdown: bool,
    pub message: String,
}

/// Device collaborator
pub trait OutputDevice: Send + Sync {
    /// Identity reported in telemetry
    fn info(&self) -> DeviceInfo;

    /// Open (but do not start) an output stream.
    ///
    /// `block_frames` is the fixed callback size requested from the host.
    fn open_stream(
        &self,
        sample_rate: u32,
        block_frames: usize,
        render: RenderFn,
        on_fault: FaultFn,
    ) -> Result<Box<dyn OutputStream>>;
}

/// An open stream. Dropping it closes the stream.
pub trait OutputStream {
    fn spec(&self) -> DeviceSpec;

    /// Begin invoking the render callback
    fn play(&mut self) -> Result<()>;
}

/// List available audio output devices as index/name pairs.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();

    let devices: Vec<DeviceInfo> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .enumerate()
        .map(|(index, device)| DeviceInfo {
            index: Some(index),
            name: device.name().ok(),
        })
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// cpal-backed output device
pub struct CpalDevice {
    device: Device,
    index: Option<usize>,
    name: Option<String>,
}

impl CpalDevice {
    /// Open an output device by enumeration index (`None` = host default)
    pub fn new(index: Option<usize>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match index {
            Some(idx) => host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
                .nth(idx)
                .ok_or_else(|| Error::AudioOutput(format!("No output device at index {}", idx)))?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {} (index {:?})", device_name, index);

        Ok(Self {
            device,
            index,
            // Telemetry reports no name for the implicit default device
            name: index.map(|_| device_name),
        })
    }

    /// Pick a stream configuration at the requested rate, preferring f32.
    fn select_config(&self, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let default = self
            .device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let channels = default.channels();

        let supported: Vec<_> = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
            .filter(|c| {
                c.channels() == channels
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .collect();

        let chosen = supported
            .iter()
            .find(|c| c.sample_format() == SampleFormat::F32)
            .or_else(|| supported.first())
            .cloned()
            .ok_or_else(|| {
                Error::AudioOutput(format!(
                    "Device does not support {} Hz with {} channels",
                    sample_rate, channels
                ))
            })?;

        let sample_format = chosen.sample_format();
        let config = chosen.with_sample_rate(cpal::SampleRate(sample_rate)).config();
        Ok((config, sample_format))
    }
}

impl OutputDevice for CpalDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            index: self.index,
            name: self.name.clone(),
        }
    }

    fn open_stream(
        &self,
        sample_rate: u32,
        block_frames: usize,
        render: RenderFn,
        on_fault: FaultFn,
    ) -> Result<Box<dyn OutputStream>> {
        let (mut config, sample_format) = self.select_config(sample_rate)?;
        config.buffer_size = cpal::BufferSize::Fixed(block_frames as u32);

        let spec = DeviceSpec {
            block_frames,
            sample_rate,
            channels: config.channels,
        };

        debug!(
            "Opening stream: sample_rate={}, channels={}, format={:?}, block_frames={}",
            sample_rate, config.channels, sample_format, block_frames
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&self.device, &config, spec, render, on_fault)?,
            SampleFormat::I16 => build_stream::<i16>(&self.device, &config, spec, render, on_fault)?,
            SampleFormat::U16 => build_stream::<u16>(&self.device, &config, spec, render, on_fault)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        Ok(Box::new(CpalStream { stream, spec }))
    }
}

struct CpalStream {
    stream: Stream,
    spec: DeviceSpec,
}

impl OutputStream for CpalStream {
    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn play(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))
    }
}

/// Device sample types the render path can convert to
trait OutputSample: cpal::SizedSample + Send + 'static {
    fn from_f32(sample: f32) -> Self;
}

impl OutputSample for f32 {
    fn from_f32(sample: f32) -> Self {
        sample.clamp(-1.0, 1.0)
    }
}

impl OutputSample for i16 {
    fn from_f32(sample: f32) -> Self {
        (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

impl OutputSample for u16 {
    fn from_f32(sample: f32) -> Self {
        // [-1.0, 1.0] to [0, 65535]
        ((sample.clamp(-1.0, 1.0) + 1.0) * 32767.5) as u16
    }
}

fn build_stream<T: OutputSample>(
    device: &Device,
    config: &StreamConfig,
    spec: DeviceSpec,
    mut render: RenderFn,
    mut on_fault: FaultFn,
) -> Result<Stream> {
    // Scratch buffer sized up front; the callback never allocates unless the
    // host hands it a larger buffer than negotiated
    let mut scratch = vec![0.0f32; spec.block_frames * spec.channels as usize];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                let timing = CallbackTiming {
                    output_latency: ts.playback.duration_since(&ts.callback),
                };

                if scratch.len() != data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                render(&mut scratch, spec.channels, timing);

                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_f32(*sample);
                }
            },
            move |err| {
                let shutdown = matches!(err, cpal::StreamError::DeviceNotAvailable);
                if shutdown {
                    error!("Audio device no longer available: {}", err);
                } else {
                    warn!("Audio stream error: {}", err);
                }
                on_fault(DeviceFault {
                    shutdown,
                    message: err.to_string(),
                });
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
