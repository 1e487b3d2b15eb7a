//! Error types for azplay-ape
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Playback-path failures inside the real-time callback are never raised as
//! `Error`; they end the session with an [`AbortCause`](crate::playback::AbortCause).

use thiserror::Error;
use uuid::Uuid;

/// Main error type for azplay-ape
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog loading errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] azplay_common::Error),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playout session errors (start-up failures)
    #[error("Session error: {0}")]
    Session(String),

    /// A session with this track id is already active
    #[error("Track {0} is already playing")]
    DuplicateTrack(Uuid),

    /// Playlist construction errors
    #[error("Playlist error: {0}")]
    Playlist(String),

    /// Telemetry serialization or delivery errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using azplay-ape Error
pub type Result<T> = std::result::Result<T, Error>;
