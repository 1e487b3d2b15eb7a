//! Test helper modules for azplay-ape integration tests
//!
//! - `audio_generator`: deterministic WAV fixtures (hound)
//! - `manual_device`: output device whose callback is driven by the test
//! - `fixtures`: cuts, in-memory block sources, recording telemetry transport

#![allow(dead_code)]

pub mod audio_generator;
pub mod fixtures;
pub mod manual_device;

pub use audio_generator::{generate_constant_wav, generate_ramp_wav, pcm16};
pub use fixtures::{cut_json, make_cut, MemoryOpener, RecordingTransport};
pub use manual_device::ManualDevice;
