//! Audio decoder using symphonia
//!
//! Streams a cut's audio file as a finite sequence of fixed-size blocks.
//! Decoding is incremental: only enough packets are decoded to fill the next
//! block, so long files never sit in memory.
//!
//! Decode-and-skip is used for the cut's track window: frames before
//! `track_begin` are decoded and discarded, decoding stops at `track_end`.

use crate::audio::types::{AudioBlock, SourceSpec};
use crate::error::{Error, Result};
use azplay_common::Cut;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoder collaborator: a finite stream of fixed-size blocks
pub trait BlockSource: Send {
    /// Sample rate and channel count of the decoded audio
    fn spec(&self) -> SourceSpec;

    /// Next block of exactly the requested frame count, `None` at end of data.
    ///
    /// The last block of the stream is zero-padded.
    fn next_block(&mut self) -> Result<Option<AudioBlock>>;
}

/// Opens a [`BlockSource`] for a cut
pub trait SourceOpener: Send + Sync {
    fn open(&self, cut: &Cut, block_frames: usize) -> Result<Box<dyn BlockSource>>;
}

/// Opens cuts from disk with symphonia
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaOpener;

impl SourceOpener for SymphoniaOpener {
    fn open(&self, cut: &Cut, block_frames: usize) -> Result<Box<dyn BlockSource>> {
        let end_ms = if cut.timers.track_end > 0 {
            Some(cut.timers.track_end)
        } else {
            None
        };
        let source =
            SymphoniaSource::open(&cut.links.audio, block_frames, cut.timers.track_begin, end_ms)?;
        Ok(Box::new(source))
    }
}

/// Streaming block decoder backed by symphonia
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: SourceSpec,
    block_frames: usize,
    /// Decoded interleaved samples not yet handed out
    pending: Vec<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames still to discard before the track window starts
    skip_frames: u64,
    /// Frames left inside the track window (`None` = until end of file)
    remaining_frames: Option<u64>,
    exhausted: bool,
}

impl SymphoniaSource {
    /// Open a file for block decoding.
    ///
    /// # Arguments
    /// - `path`: Audio file
    /// - `block_frames`: Frames per emitted block (device callback size)
    /// - `start_ms`: Track window start (0 = file start)
    /// - `end_ms`: Track window end (`None` = file end)
    pub fn open(path: &Path, block_frames: usize, start_ms: u64, end_ms: Option<u64>) -> Result<Self> {
        if block_frames == 0 {
            return Err(Error::Decode("Block size must be at least one frame".to_string()));
        }

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe {}: {}", path.display(), e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio track in {}", path.display())))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let ms_to_frames = |ms: u64| ms * sample_rate as u64 / 1000;
        let skip_frames = ms_to_frames(start_ms);
        let remaining_frames = end_ms.map(|end| ms_to_frames(end.saturating_sub(start_ms)));

        debug!(
            "Opened {}: sample_rate={}, channels={}, block_frames={}, window={}ms..{:?}ms",
            path.display(),
            sample_rate,
            channels,
            block_frames,
            start_ms,
            end_ms
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            spec: SourceSpec {
                sample_rate,
                channels,
            },
            block_frames,
            pending: Vec::new(),
            sample_buf: None,
            skip_frames,
            remaining_frames,
            exhausted: false,
        })
    }

    /// Decode one packet into `pending`; marks the source exhausted at end of data
    fn decode_packet(&mut self) -> Result<()> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.exhausted = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!("Stream reset required mid-file; treating as end of data");
                self.exhausted = true;
                return Ok(());
            }
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packet: skip it, keep streaming
                warn!("Decode error: {}", e);
                return Ok(());
            }
            Err(e) => return Err(Error::Decode(format!("Decoder failure: {}", e))),
        };

        // SampleBuffer capacity counts samples, AudioBufferRef capacity counts frames
        let needed = decoded.capacity() * decoded.spec().channels.count();
        let needs_alloc = self
            .sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < needed);
        if needs_alloc {
            self.sample_buf = Some(SampleBuffer::<f32>::new(
                decoded.capacity() as u64,
                *decoded.spec(),
            ));
        }

        let Some(buf) = self.sample_buf.as_mut() else {
            return Ok(());
        };
        buf.copy_interleaved_ref(decoded);

        let channels = self.spec.channels as usize;
        let mut samples = buf.samples();

        let frames = (samples.len() / channels) as u64;
        let skip = self.skip_frames.min(frames);
        self.skip_frames -= skip;
        samples = &samples[skip as usize * channels..];

        if let Some(remaining) = self.remaining_frames.as_mut() {
            let keep = (*remaining).min((samples.len() / channels) as u64);
            *remaining -= keep;
            samples = &samples[..keep as usize * channels];
            if *remaining == 0 {
                self.exhausted = true;
            }
        }

        self.pending.extend_from_slice(samples);
        Ok(())
    }
}

impl BlockSource for SymphoniaSource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        let want = self.block_frames * self.spec.channels as usize;

        while self.pending.len() < want && !self.exhausted {
            self.decode_packet()?;
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let take = want.min(self.pending.len());
        let mut samples: Vec<f32> = self.pending.drain(..take).collect();
        samples.resize(want, 0.0);

        Ok(Some(AudioBlock::new(samples, self.spec.channels)))
    }
}
