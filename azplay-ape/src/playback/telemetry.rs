//! Telemetry emitter
//!
//! Fire-and-forget: events are wrapped in a [`TelemetryEnvelope`], serialized
//! once, and handed to a [`TelemetryTransport`]. Serialization or delivery
//! failures are logged and dropped; they never reach the playback path.
//!
//! Emission is invoked from session worker threads only, never from the
//! real-time callback.

use crate::error::{Error, Result};
use azplay_common::events::{TelemetryEnvelope, TelemetryEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Default origin id stamped on every envelope
pub const DEFAULT_ORIGIN: &str = "azplay-ape";

/// Minimum spacing between `stream.update` events for one track
pub const MIN_TELEMETRY_INTERVAL_MS: u64 = 100;

/// Transport collaborator: delivers pre-serialized payloads.
///
/// Implementations must be callable from many threads at once.
/// Reconnect/backoff, if any, is the transport's concern.
pub trait TelemetryTransport: Send + Sync {
    fn deliver(&self, event: &str, payload: &str) -> Result<()>;
}

/// Serializes events and hands them to the transport
pub struct TelemetryEmitter {
    origin: String,
    transport: Arc<dyn TelemetryTransport>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl TelemetryEmitter {
    pub fn new(origin: impl Into<String>, transport: Arc<dyn TelemetryTransport>) -> Self {
        Self {
            origin: origin.into(),
            transport,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Emit an event. Never fails.
    pub fn emit(&self, event: TelemetryEvent) {
        let name = event.name();
        let track_id = event.track_id();
        let envelope = TelemetryEnvelope {
            timestamp: azplay_common::time::now_millis(),
            origin: self.origin.clone(),
            event,
        };

        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping {} for track {}: serialization failed: {}", name, track_id, e);
                return;
            }
        };

        match self.transport.deliver(name, &payload) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Emitted {} for track {}", name, track_id);
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping {} for track {}: {}", name, track_id, e);
            }
        }
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Writes every payload to the tracing log under the `telemetry` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl TelemetryTransport for LogTransport {
    fn deliver(&self, event: &str, payload: &str) -> Result<()> {
        info!(target: "telemetry", "{} {}", event, payload);
        Ok(())
    }
}

/// One serialized telemetry message as fanned out to subscribers
#[derive(Debug, Clone)]
pub struct TelemetryMessage {
    pub event: String,
    pub payload: String,
}

/// Fans payloads out to every connected SSE subscriber
///
/// Having no subscribers is not a delivery failure.
#[derive(Clone)]
pub struct BroadcastTransport {
    tx: broadcast::Sender<TelemetryMessage>,
}

impl BroadcastTransport {
    /// # Arguments
    ///
    /// * `capacity` - Number of messages buffered per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        info!("Telemetry broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Current number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryMessage> {
        self.tx.subscribe()
    }

    /// SSE stream for a new subscriber; lagged messages are skipped
    pub fn subscribe_stream(&self) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| async move {
            match result {
                Ok(msg) => Some(Ok(Event::default().event(msg.event).data(msg.payload))),
                Err(e) => {
                    warn!("Telemetry subscriber lagged: {:?}", e);
                    None
                }
            }
        })
    }

    /// Axum SSE response for GET /events
    pub fn sse_response(&self) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
        info!(
            "Telemetry subscriber connected, total subscribers: {}",
            self.subscriber_count() + 1
        );
        Sse::new(self.subscribe_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
    }
}

impl TelemetryTransport for BroadcastTransport {
    fn deliver(&self, event: &str, payload: &str) -> Result<()> {
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(TelemetryMessage {
                event: event.to_string(),
                payload: payload.to_string(),
            })
            .map(|_| ())
            .map_err(|e| Error::Telemetry(format!("broadcast failed: {}", e)))
    }
}
