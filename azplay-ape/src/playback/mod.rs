//! Playout: streaming buffer, sessions, telemetry and the playlist scheduler

pub mod buffer;
pub mod engine;
pub mod pad;
pub mod playlist;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use buffer::{streaming_buffer, BlockConsumer, BlockProducer, BufferControl, PopResult, PushError};
pub use engine::PlayoutEngine;
pub use pad::PadPublisher;
pub use playlist::{EofAction, Playlist, PlaylistEntry};
pub use registry::{SessionRegistry, SessionSnapshot};
pub use scheduler::{pacing_delay, Clock, Player, Scheduler, SessionControl, SystemClock};
pub use session::{AbortCause, SessionConfig, SessionHandle, SessionOutcome};
pub use telemetry::{BroadcastTransport, LogTransport, TelemetryEmitter, TelemetryTransport};
