//! Playout session
//!
//! Plays one cut to one output device. Each session owns a worker thread
//! that decodes blocks into its [`streaming buffer`](super::buffer), opens the
//! device stream, emits telemetry, and tears everything down when the stream
//! ends or aborts.
//!
//! # Real-time path
//!
//! The device callback runs [`RenderContext::render`]: one non-blocking pop,
//! a channel map, and atomic stores into the shared [`SessionContext`]. It
//! never logs, locks, or emits telemetry. The worker observes the atomics
//! and does the reporting, as the callback monitor does for the mixer.
//!
//! # Lifecycle
//!
//! `Starting → Playing → Ending → Terminated`, or `Aborted` from any
//! non-terminal state. Events for a track are always emitted in
//! `stream.start → stream.update* → stream.end` order because only the
//! worker emits them.

use crate::audio::decoder::{BlockSource, SourceOpener};
use crate::audio::output::{OutputDevice, OutputStream};
use crate::audio::types::{map_channels, CallbackTiming};
use crate::error::{Error, Result};
use crate::playback::buffer::{
    drain_interval, streaming_buffer, BlockConsumer, BlockProducer, BufferControl, PopResult,
    PushError, DEFAULT_BUFFER_BLOCKS,
};
use crate::playback::registry::{PlayoutSession, SessionRegistry};
use crate::playback::telemetry::{TelemetryEmitter, MIN_TELEMETRY_INTERVAL_MS};
use crate::shutdown::ShutdownSignal;
use azplay_common::events::{
    DeviceInfo, EndOutcome, PlaylistInfo, SessionStatus, StreamEnd, StreamStart, StreamUpdate,
    TelemetryEvent,
};
use azplay_common::Cut;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default frames per device callback
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Bounds on the worker's idle poll once the source is fully queued
const MIN_IDLE_POLL: Duration = Duration::from_millis(2);
const MAX_IDLE_POLL: Duration = Duration::from_millis(50);

// End codes stored in SessionContext::end_code
const RUNNING: u8 = 0;
const END_OF_STREAM: u8 = 1;
const UNDERRUN: u8 = 2;
const FORMAT_MISMATCH: u8 = 3;
const DEVICE_SHUTDOWN: u8 = 4;
const DEVICE_ERROR: u8 = 5;
const PRODUCER_STALLED: u8 = 6;
const CANCELLED: u8 = 7;
const DECODE_FAILED: u8 = 8;

const LATENCY_UNKNOWN: u64 = u64::MAX;

/// Why a session stopped before end-of-stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// Queue empty when the callback fired
    Underrun,
    /// Callback buffer size differs from the negotiated block size
    FormatMismatch { expected: usize, actual: usize },
    /// Device went away; every session on it is aborted
    DeviceShutdown,
    /// Host reported a stream error
    DeviceError,
    /// Consumer took no block for a whole drain interval
    ProducerStalled,
    /// Cancelled by the scheduler or at shutdown
    Cancelled,
    /// Decoder failed mid-stream
    Decode(String),
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Underrun => write!(f, "buffer underrun"),
            AbortCause::FormatMismatch { expected, actual } => write!(
                f,
                "callback block size {} frames, expected {}",
                actual, expected
            ),
            AbortCause::DeviceShutdown => write!(f, "audio device shut down"),
            AbortCause::DeviceError => write!(f, "audio stream error"),
            AbortCause::ProducerStalled => {
                write!(f, "consumer stalled, no block taken for a drain interval")
            }
            AbortCause::Cancelled => write!(f, "cancelled"),
            AbortCause::Decode(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

/// Final result of a session that started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted(AbortCause),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

/// Per-session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Streaming buffer depth in blocks
    pub buffer_blocks: usize,
    /// Frames per block and per device callback
    pub block_frames: usize,
    /// Minimum spacing of `stream.update` events per track
    pub min_update_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_blocks: DEFAULT_BUFFER_BLOCKS,
            block_frames: DEFAULT_BLOCK_FRAMES,
            min_update_interval: Duration::from_millis(MIN_TELEMETRY_INTERVAL_MS),
        }
    }
}

/// State shared between the real-time callback, the worker, and the registry
///
/// All fields written from the callback are atomics.
pub struct SessionContext {
    track_id: Uuid,
    sample_rate: u32,
    buffer: BufferControl,
    playing: AtomicBool,
    terminated: AtomicBool,
    end_code: AtomicU8,
    expected_frames: AtomicUsize,
    actual_frames: AtomicUsize,
    frames_played: AtomicU64,
    latency_us: AtomicU64,
    decode_error: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new(track_id: Uuid, sample_rate: u32, buffer: BufferControl) -> Self {
        Self {
            track_id,
            sample_rate: sample_rate.max(1),
            buffer,
            playing: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            end_code: AtomicU8::new(RUNNING),
            expected_frames: AtomicUsize::new(0),
            actual_frames: AtomicUsize::new(0),
            frames_played: AtomicU64::new(0),
            latency_us: AtomicU64::new(LATENCY_UNKNOWN),
            decode_error: Mutex::new(None),
        }
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    /// Record the end of the session. The first end wins.
    ///
    /// **REAL-TIME SAFE**: atomics only.
    fn end(&self, code: u8) -> bool {
        let won = self
            .end_code
            .compare_exchange(RUNNING, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won && code != END_OF_STREAM {
            self.buffer.cancel();
        }
        won
    }

    /// Abort from a non-real-time thread
    pub fn abort(&self, cause: AbortCause) {
        let code = match &cause {
            AbortCause::Underrun => UNDERRUN,
            AbortCause::FormatMismatch { expected, actual } => {
                self.expected_frames.store(*expected, Ordering::Relaxed);
                self.actual_frames.store(*actual, Ordering::Relaxed);
                FORMAT_MISMATCH
            }
            AbortCause::DeviceShutdown => DEVICE_SHUTDOWN,
            AbortCause::DeviceError => DEVICE_ERROR,
            AbortCause::ProducerStalled => PRODUCER_STALLED,
            AbortCause::Cancelled => CANCELLED,
            AbortCause::Decode(msg) => {
                let mut slot = self
                    .decode_error
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *slot = Some(msg.clone());
                DECODE_FAILED
            }
        };
        self.end(code);
    }

    /// Callback side of a format mismatch
    fn abort_format(&self, expected: usize, actual: usize) {
        self.expected_frames.store(expected, Ordering::Relaxed);
        self.actual_frames.store(actual, Ordering::Relaxed);
        self.end(FORMAT_MISMATCH);
    }

    fn record_block(&self, frames: usize, latency: Option<Duration>) {
        self.frames_played.fetch_add(frames as u64, Ordering::Relaxed);
        if let Some(latency) = latency {
            self.latency_us.store(latency.as_micros() as u64, Ordering::Relaxed);
        }
    }

    fn mark_playing(&self) {
        self.playing.store(true, Ordering::Release);
    }

    fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn has_ended(&self) -> bool {
        self.end_code.load(Ordering::Acquire) != RUNNING
    }

    pub fn status(&self) -> SessionStatus {
        match self.end_code.load(Ordering::Acquire) {
            RUNNING if self.playing.load(Ordering::Acquire) => SessionStatus::Playing,
            RUNNING => SessionStatus::Starting,
            END_OF_STREAM if self.terminated.load(Ordering::Acquire) => SessionStatus::Terminated,
            END_OF_STREAM => SessionStatus::Ending,
            _ => SessionStatus::Aborted,
        }
    }

    /// Why the session aborted, `None` while running or after end-of-stream
    pub fn abort_cause(&self) -> Option<AbortCause> {
        Some(match self.end_code.load(Ordering::Acquire) {
            UNDERRUN => AbortCause::Underrun,
            FORMAT_MISMATCH => AbortCause::FormatMismatch {
                expected: self.expected_frames.load(Ordering::Relaxed),
                actual: self.actual_frames.load(Ordering::Relaxed),
            },
            DEVICE_SHUTDOWN => AbortCause::DeviceShutdown,
            DEVICE_ERROR => AbortCause::DeviceError,
            PRODUCER_STALLED => AbortCause::ProducerStalled,
            CANCELLED => AbortCause::Cancelled,
            DECODE_FAILED => AbortCause::Decode(
                self.decode_error
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
                    .unwrap_or_default(),
            ),
            _ => return None,
        })
    }

    /// Audio handed to the device so far, in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed) * 1000 / self.sample_rate as u64
    }

    /// Last reported output latency in milliseconds (0 if the host gave none)
    pub fn latency_ms(&self) -> i64 {
        match self.latency_us.load(Ordering::Relaxed) {
            LATENCY_UNKNOWN => 0,
            us => (us / 1000) as i64,
        }
    }
}

/// State handed to the real-time callback
pub struct RenderContext {
    context: Arc<SessionContext>,
    consumer: BlockConsumer,
    block_frames: usize,
}

impl RenderContext {
    pub fn new(context: Arc<SessionContext>, consumer: BlockConsumer, block_frames: usize) -> Self {
        Self {
            context,
            consumer,
            block_frames,
        }
    }

    /// Fill one device buffer.
    ///
    /// **REAL-TIME SAFE**: no logging, no locks, no telemetry.
    pub fn render(&mut self, out: &mut [f32], channels: u16, timing: CallbackTiming) {
        if self.context.has_ended() {
            out.fill(0.0);
            return;
        }

        let channels = channels.max(1) as usize;
        let frames = out.len() / channels;
        if frames != self.block_frames || out.len() % channels != 0 {
            out.fill(0.0);
            self.context.abort_format(self.block_frames, frames);
            return;
        }

        match self.consumer.pop() {
            PopResult::Block(block) => {
                if block.frames() != self.block_frames {
                    out.fill(0.0);
                    self.context.abort_format(self.block_frames, block.frames());
                    return;
                }
                map_channels(&block, out, channels);
                self.context.record_block(frames, timing.output_latency);
            }
            PopResult::EndOfStream => {
                out.fill(0.0);
                self.context.end(END_OF_STREAM);
            }
            PopResult::Underrun => {
                out.fill(0.0);
                self.context.end(UNDERRUN);
            }
            PopResult::Cancelled => {
                out.fill(0.0);
                self.context.end(CANCELLED);
            }
        }
    }
}

/// Shared collaborators every session needs
#[derive(Clone)]
pub struct SessionServices {
    pub registry: Arc<SessionRegistry>,
    pub emitter: Arc<TelemetryEmitter>,
    pub opener: Arc<dyn SourceOpener>,
    pub shutdown: Arc<ShutdownSignal>,
    pub config: SessionConfig,
}

/// Handle to a running session
pub struct SessionHandle {
    track_id: Uuid,
    context: Arc<SessionContext>,
    worker: JoinHandle<Option<SessionOutcome>>,
}

impl SessionHandle {
    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    pub fn status(&self) -> SessionStatus {
        self.context.status()
    }

    /// Worker has torn the session down
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stop playback at the next block boundary
    pub fn cancel(&self) {
        self.context.abort(AbortCause::Cancelled);
    }

    /// Wait for teardown. `None` if the worker panicked.
    pub fn join(self) -> Option<SessionOutcome> {
        match self.worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Session worker for track {} panicked", self.track_id);
                None
            }
        }
    }
}

/// Start playing `cut` on `device`.
///
/// Returns once the buffer is pre-filled, the stream is running and
/// `stream.start` has been emitted. Decoder, device and duplicate-track
/// failures are returned here; later failures end the session with an
/// [`AbortCause`].
pub fn start_session(
    services: &SessionServices,
    device: Arc<dyn OutputDevice>,
    cut: Arc<Cut>,
    placement: PlaylistInfo,
) -> Result<SessionHandle> {
    let track_id = placement.track_id;
    if services.registry.contains(track_id) {
        return Err(Error::DuplicateTrack(track_id));
    }

    let config = services.config;
    if config.block_frames == 0 {
        return Err(Error::Session("Block size must be at least one frame".to_string()));
    }

    let source = services.opener.open(&cut, config.block_frames)?;
    let sample_rate = source.spec().sample_rate;
    let depth = config.buffer_blocks.max(1);
    let drain = drain_interval(config.block_frames, depth, sample_rate);
    let (producer, consumer, control) = streaming_buffer(depth, config.block_frames, drain);

    let context = Arc::new(SessionContext::new(track_id, sample_rate, control));
    let device_info = device.info();
    services.registry.register(PlayoutSession::new(
        track_id,
        Arc::clone(&cut),
        device_info.clone(),
        Arc::clone(&context),
    ))?;

    let worker = SessionWorker {
        services: services.clone(),
        cut,
        placement,
        device_info,
        context: Arc::clone(&context),
        source,
        producer,
        source_done: false,
        depth,
        sample_rate,
        drain,
    };

    let (ready_tx, ready_rx) = sync_channel(1);
    let spawned = std::thread::Builder::new()
        .name(format!("session-{}", &track_id.to_string()[..8]))
        .spawn(move || worker.run(device, consumer, ready_tx));

    let worker = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            services.registry.remove(track_id);
            return Err(Error::Session(format!("Failed to spawn session worker: {}", e)));
        }
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(SessionHandle {
            track_id,
            context,
            worker,
        }),
        Ok(Err(e)) => {
            let _ = worker.join();
            Err(e)
        }
        Err(_) => {
            let _ = worker.join();
            services.registry.remove(track_id);
            Err(Error::Session(format!(
                "Session worker for track {} exited during start-up",
                track_id
            )))
        }
    }
}

struct SessionWorker {
    services: SessionServices,
    cut: Arc<Cut>,
    placement: PlaylistInfo,
    device_info: DeviceInfo,
    context: Arc<SessionContext>,
    source: Box<dyn BlockSource>,
    producer: BlockProducer,
    source_done: bool,
    depth: usize,
    sample_rate: u32,
    /// Longest the consumer may go without taking a block
    drain: Duration,
}

impl SessionWorker {
    fn run(
        mut self,
        device: Arc<dyn OutputDevice>,
        consumer: BlockConsumer,
        ready: SyncSender<Result<()>>,
    ) -> Option<SessionOutcome> {
        let stream = match self.bring_up(device.as_ref(), consumer) {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                self.services.registry.remove(self.placement.track_id);
                let _ = ready.send(Err(e));
                return None;
            }
        };

        self.feed();
        Some(self.tear_down(stream))
    }

    /// Pre-fill, open and start the stream, announce the session
    fn bring_up(
        &mut self,
        device: &dyn OutputDevice,
        consumer: BlockConsumer,
    ) -> Result<Box<dyn OutputStream>> {
        self.prefill()?;

        let block_frames = self.services.config.block_frames;
        let mut render = RenderContext::new(Arc::clone(&self.context), consumer, block_frames);
        let fault_context = Arc::clone(&self.context);

        let mut stream = device.open_stream(
            self.sample_rate,
            block_frames,
            Box::new(move |out, channels, timing| render.render(out, channels, timing)),
            Box::new(move |fault| {
                let code = if fault.shutdown {
                    DEVICE_SHUTDOWN
                } else {
                    DEVICE_ERROR
                };
                fault_context.end(code);
            }),
        )?;

        let spec = stream.spec();
        if spec.block_frames != block_frames {
            return Err(Error::AudioOutput(format!(
                "Device block size {} frames, expected {}",
                spec.block_frames, block_frames
            )));
        }

        stream.play()?;
        self.context.mark_playing();

        info!(
            "Session {} started: cut {} ({}) on device {:?}, {} Hz, {} channels",
            self.placement.track_id,
            self.cut.id,
            self.cut.display_line(),
            self.device_info,
            spec.sample_rate,
            spec.channels
        );

        self.services.emitter.emit(TelemetryEvent::StreamStart(StreamStart {
            playlist_track_id: self.placement.track_id,
            playlist: self.placement.clone(),
            cut_info: (*self.cut).clone(),
            device: self.device_info.clone(),
        }));
        self.services
            .registry
            .restart_update_interval(self.placement.track_id, Instant::now());

        Ok(stream)
    }

    fn prefill(&mut self) -> Result<()> {
        for _ in 0..self.depth {
            let pushed = match self.source.next_block()? {
                Some(block) => self.producer.push(block),
                None => {
                    self.source_done = true;
                    self.producer.finish()
                }
            };
            pushed.map_err(|e| Error::Session(format!("Pre-fill failed: {}", e)))?;
            if self.source_done {
                break;
            }
        }
        debug!(
            "Pre-filled {} blocks for track {}",
            self.producer.capacity() - self.producer.vacant_len(),
            self.placement.track_id
        );
        Ok(())
    }

    /// Keep the buffer topped up until the callback ends the session
    fn feed(&mut self) {
        let block_duration = Duration::from_nanos(
            self.services.config.block_frames as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64,
        );
        let idle_poll = block_duration.clamp(MIN_IDLE_POLL, MAX_IDLE_POLL);
        // The poll itself must not look like a stall
        let stall_after = self.drain.max(idle_poll * 2);

        let mut last_popped = self.context.buffer.stats().blocks_popped;
        let mut last_progress = Instant::now();

        while !self.context.has_ended() {
            if self.source_done {
                std::thread::sleep(idle_poll);
            } else {
                self.feed_one();
            }

            let popped = self.context.buffer.stats().blocks_popped;
            if popped != last_popped {
                last_popped = popped;
                last_progress = Instant::now();
            } else if self.source_done && last_progress.elapsed() > stall_after {
                warn!(
                    "Track {} took no block for {:?} after end-of-stream was queued; device stopped consuming",
                    self.placement.track_id,
                    last_progress.elapsed()
                );
                self.context.abort(AbortCause::ProducerStalled);
            }

            self.maybe_emit_update();
        }
    }

    fn feed_one(&mut self) {
        let pushed = match self.source.next_block() {
            Ok(Some(block)) => self.producer.push(block),
            Ok(None) => {
                self.source_done = true;
                self.producer.finish()
            }
            Err(e) => {
                self.context.abort(AbortCause::Decode(e.to_string()));
                return;
            }
        };

        match pushed {
            Ok(()) => {}
            Err(PushError::Timeout(waited)) => {
                warn!(
                    "Buffer for track {} full for {:?}; device stopped consuming",
                    self.placement.track_id, waited
                );
                self.context.abort(AbortCause::ProducerStalled);
            }
            Err(PushError::Cancelled) => {}
            Err(PushError::BlockSize { expected, actual }) => {
                self.context
                    .abort(AbortCause::FormatMismatch { expected, actual });
            }
        }
    }

    fn maybe_emit_update(&self) {
        let track_id = self.placement.track_id;
        if !self.services.registry.claim_update_slot(
            track_id,
            Instant::now(),
            self.services.config.min_update_interval,
        ) {
            return;
        }

        self.services.emitter.emit(TelemetryEvent::StreamUpdate(StreamUpdate {
            playlist_track_id: track_id,
            buffer_latency: self.context.latency_ms(),
            cut_id: self.cut.id.clone(),
            device: self.device_info.clone(),
            status: self.context.status(),
            track_elapsed: self.context.elapsed_ms(),
        }));
    }

    fn tear_down(self, stream: Box<dyn OutputStream>) -> SessionOutcome {
        drop(stream);
        self.context.mark_terminated();

        let track_id = self.placement.track_id;
        let outcome = match self.context.abort_cause() {
            None => SessionOutcome::Completed,
            Some(cause) => SessionOutcome::Aborted(cause),
        };

        let (end_outcome, reason) = match &outcome {
            SessionOutcome::Completed => {
                info!(
                    "Session {} completed: cut {} after {} ms",
                    track_id,
                    self.cut.id,
                    self.context.elapsed_ms()
                );
                (EndOutcome::Completed, None)
            }
            SessionOutcome::Aborted(AbortCause::Cancelled) => {
                info!("Session {} cancelled: cut {}", track_id, self.cut.id);
                (EndOutcome::Aborted, Some(AbortCause::Cancelled.to_string()))
            }
            SessionOutcome::Aborted(cause) => {
                error!(
                    "Session {} aborted: cut {} at {} ms: {}",
                    track_id,
                    self.cut.id,
                    self.context.elapsed_ms(),
                    cause
                );
                (EndOutcome::Aborted, Some(cause.to_string()))
            }
        };

        self.services.emitter.emit(TelemetryEvent::StreamEnd(StreamEnd {
            playlist_track_id: track_id,
            cut_info: (*self.cut).clone(),
            device: self.device_info.clone(),
            outcome: end_outcome,
            reason,
        }));

        self.services.registry.remove(track_id);

        if outcome == SessionOutcome::Aborted(AbortCause::DeviceShutdown) {
            self.services.registry.abort_all(AbortCause::DeviceShutdown);
            self.services.shutdown.trigger("audio device shut down");
        }

        outcome
    }
}
