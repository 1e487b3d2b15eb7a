//! Shared fixtures: cuts, in-memory sources, recording telemetry

use azplay_ape::audio::decoder::{BlockSource, SourceOpener};
use azplay_ape::audio::types::{AudioBlock, SourceSpec};
use azplay_ape::playback::telemetry::TelemetryTransport;
use azplay_ape::{Error, Result};
use azplay_common::Cut;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Catalog JSON for one cut
pub fn cut_json(id: &str, audio: &Path, segue_begin: u64, intro_end: u64, topplay: bool) -> String {
    let duration = segue_begin.max(intro_end).max(1000) + 1000;
    serde_json::json!({
        "cut": id,
        "category": "MUSIC",
        "duration": duration,
        "meta": {"artist": "Artist", "title": format!("Title {}", id), "album": ""},
        "timers": {
            "_track_begin": 0, "_track_end": 0,
            "intro_begin": 0, "intro_end": intro_end,
            "segue_begin": segue_begin, "segue_end": segue_begin
        },
        "topplay": topplay,
        "_links": {"audio": audio, "albumart": null},
        "_ui": {"text_color": "gray"}
    })
    .to_string()
}

pub fn make_cut(id: &str, audio: &Path, segue_begin: u64, intro_end: u64, topplay: bool) -> Arc<Cut> {
    Arc::new(serde_json::from_str(&cut_json(id, audio, segue_begin, intro_end, topplay)).unwrap())
}

/// Source producing `blocks` constant-valued blocks
pub struct MemorySource {
    spec: SourceSpec,
    block_frames: usize,
    remaining: usize,
    value: f32,
    /// Stall before yielding block number `.0` (0-based)
    stall: Option<(usize, Duration)>,
    produced: usize,
}

impl BlockSource for MemorySource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if let Some((at, delay)) = self.stall {
            if self.produced == at {
                std::thread::sleep(delay);
            }
        }
        self.remaining -= 1;
        self.produced += 1;
        let samples = vec![self.value; self.block_frames * self.spec.channels as usize];
        Ok(Some(AudioBlock::new(samples, self.spec.channels)))
    }
}

/// Opener handing out [`MemorySource`]s
#[derive(Clone)]
pub struct MemoryOpener {
    pub sample_rate: u32,
    pub channels: u16,
    pub blocks: usize,
    pub value: f32,
    pub stall: Option<(usize, Duration)>,
    pub fail: bool,
}

impl MemoryOpener {
    pub fn new(blocks: usize) -> Self {
        Self {
            // Low rate keeps the drain interval (and so the stall timeout)
            // long relative to test ticks
            sample_rate: 10,
            channels: 1,
            blocks,
            value: 0.25,
            stall: None,
            fail: false,
        }
    }
}

impl SourceOpener for MemoryOpener {
    fn open(&self, cut: &Cut, block_frames: usize) -> Result<Box<dyn BlockSource>> {
        if self.fail {
            return Err(Error::Decode(format!("Failed to open file {}", cut.links.audio.display())));
        }
        Ok(Box::new(MemorySource {
            spec: SourceSpec {
                sample_rate: self.sample_rate,
                channels: self.channels,
            },
            block_frames,
            remaining: self.blocks,
            value: self.value,
            stall: self.stall,
            produced: 0,
        }))
    }
}

/// Transport that keeps every delivered message
#[derive(Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingTransport {
    pub fn events(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(String, serde_json::Value)> {
        self.messages.lock().unwrap().last().cloned()
    }
}

impl TelemetryTransport for RecordingTransport {
    fn deliver(&self, event: &str, payload: &str) -> Result<()> {
        let value = serde_json::from_str(payload)
            .map_err(|e| Error::Telemetry(e.to_string()))?;
        self.messages.lock().unwrap().push((event.to_string(), value));
        Ok(())
    }
}
