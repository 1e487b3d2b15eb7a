//! Streaming buffer between the decoding producer and the real-time callback
//!
//! A bounded single-producer single-consumer queue of up to `depth`
//! fixed-size [`AudioBlock`]s followed by an end-of-stream sentinel. The
//! sentinel is a flag beside the ring, so a full queue can still be finished.
//!
//! - Producer (session worker thread): `push` blocks while the queue is full,
//!   for at most one full drain interval (`block_frames * depth / sample_rate`).
//!   Exceeding it means the consumer has stalled.
//! - Consumer (real-time callback): `pop` never blocks and never allocates. An
//!   empty queue is an underrun; the caller silences output and ends the
//!   session.
//! - Cancellation: `BufferControl::cancel` rejects further pushes and makes
//!   the next `pop` report `Cancelled`, so cancellation lands on a block
//!   boundary.

use crate::audio::types::AudioBlock;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Default queue depth in blocks
pub const DEFAULT_BUFFER_BLOCKS: usize = 20;

/// Producer back-off while the queue is full
const PUSH_BACKOFF: Duration = Duration::from_millis(1);

/// Outcome of a non-blocking pop
#[derive(Debug, PartialEq)]
pub enum PopResult {
    Block(AudioBlock),
    /// Producer finished and every block has been consumed
    EndOfStream,
    /// Queue empty before end-of-stream: the real-time deadline was missed
    Underrun,
    /// Session was cancelled
    Cancelled,
}

/// Producer-side failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// Queue stayed full for a whole drain interval
    #[error("Streaming buffer full for {0:?}; consumer stalled")]
    Timeout(Duration),

    #[error("Streaming buffer cancelled")]
    Cancelled,

    /// Block does not match the negotiated block size
    #[error("Block has {actual} frames, expected {expected}")]
    BlockSize { expected: usize, actual: usize },
}

/// Time for a full queue to drain at the device's block rate
pub fn drain_interval(block_frames: usize, depth: usize, sample_rate: u32) -> Duration {
    let frames = (block_frames * depth) as u64;
    Duration::from_nanos(frames * 1_000_000_000 / sample_rate.max(1) as u64)
}

#[derive(Debug, Default)]
struct SharedFlags {
    cancelled: AtomicBool,
    finished: AtomicBool,
    pushed: AtomicU64,
    popped: AtomicU64,
    underruns: AtomicU64,
}

/// Create a streaming buffer.
///
/// # Arguments
/// * `depth` - Queue capacity in blocks (minimum 1)
/// * `block_frames` - Frames every block must carry
/// * `push_timeout` - Longest a push may wait on a full queue (see [`drain_interval`])
pub fn streaming_buffer(
    depth: usize,
    block_frames: usize,
    push_timeout: Duration,
) -> (BlockProducer, BlockConsumer, BufferControl) {
    let depth = depth.max(1);
    debug!(
        "Creating streaming buffer: depth={} blocks, block_frames={}, push_timeout={:?}",
        depth, block_frames, push_timeout
    );

    let (prod, cons) = HeapRb::<AudioBlock>::new(depth).split();
    let flags = Arc::new(SharedFlags::default());

    (
        BlockProducer {
            producer: prod,
            flags: Arc::clone(&flags),
            block_frames,
            push_timeout,
        },
        BlockConsumer {
            consumer: cons,
            flags: Arc::clone(&flags),
        },
        BufferControl { flags },
    )
}

/// Producer half (decoder side)
pub struct BlockProducer {
    producer: HeapProd<AudioBlock>,
    flags: Arc<SharedFlags>,
    block_frames: usize,
    push_timeout: Duration,
}

impl BlockProducer {
    /// Enqueue a block, waiting up to the push timeout for space.
    pub fn push(&mut self, block: AudioBlock) -> Result<(), PushError> {
        if block.frames() != self.block_frames {
            return Err(PushError::BlockSize {
                expected: self.block_frames,
                actual: block.frames(),
            });
        }
        self.push_block(block)?;
        self.flags.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Mark end-of-stream after the blocks already queued. Idempotent and
    /// never waits, even on a full queue.
    pub fn finish(&mut self) -> Result<(), PushError> {
        if self.flags.cancelled.load(Ordering::Acquire) {
            return Err(PushError::Cancelled);
        }
        self.flags.finished.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.flags.finished.load(Ordering::Acquire)
    }

    /// Free slots right now
    pub fn vacant_len(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }

    fn push_block(&mut self, block: AudioBlock) -> Result<(), PushError> {
        let deadline = Instant::now() + self.push_timeout;
        let mut block = block;
        loop {
            if self.flags.cancelled.load(Ordering::Acquire) {
                return Err(PushError::Cancelled);
            }
            match self.producer.try_push(block) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    if Instant::now() >= deadline {
                        return Err(PushError::Timeout(self.push_timeout));
                    }
                    block = rejected;
                    std::thread::sleep(PUSH_BACKOFF);
                }
            }
        }
    }
}

/// Consumer half (real-time callback side)
pub struct BlockConsumer {
    consumer: HeapCons<AudioBlock>,
    flags: Arc<SharedFlags>,
}

impl BlockConsumer {
    /// Take the next block without blocking.
    ///
    /// **REAL-TIME SAFE**: atomics and a lock-free pop only; no logging.
    pub fn pop(&mut self) -> PopResult {
        if self.flags.cancelled.load(Ordering::Acquire) {
            return PopResult::Cancelled;
        }
        if let Some(block) = self.consumer.try_pop() {
            return self.popped(block);
        }
        if !self.flags.finished.load(Ordering::Acquire) {
            self.flags.underruns.fetch_add(1, Ordering::Relaxed);
            return PopResult::Underrun;
        }
        // The last block may have landed between the pop and the flag load
        match self.consumer.try_pop() {
            Some(block) => self.popped(block),
            None => PopResult::EndOfStream,
        }
    }

    fn popped(&self, block: AudioBlock) -> PopResult {
        self.flags.popped.fetch_add(1, Ordering::Relaxed);
        PopResult::Block(block)
    }

    /// Blocks currently queued
    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }
}

/// Shared control/statistics handle, usable from any thread
#[derive(Clone)]
pub struct BufferControl {
    flags: Arc<SharedFlags>,
}

impl BufferControl {
    /// Reject further pushes; the next pop reports `Cancelled`.
    ///
    /// **REAL-TIME SAFE**: a single atomic store.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            blocks_pushed: self.flags.pushed.load(Ordering::Relaxed),
            blocks_popped: self.flags.popped.load(Ordering::Relaxed),
            underruns: self.flags.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Streaming buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub blocks_pushed: u64,
    pub blocks_popped: u64,
    pub underruns: u64,
}
