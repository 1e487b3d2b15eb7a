//! # azplay Audio Playout Engine (azplay-ape)
//!
//! Broadcast-style playout: sequences catalog cuts with segue/topplay timing
//! and streams each cut to an output device through a real-time callback,
//! reporting lifecycle and position telemetry.
//!
//! **Architecture:** one session per playing cut (symphonia decoder →
//! ringbuf streaming buffer → cpal callback), a playlist scheduler on a
//! control thread, and an axum SSE surface for telemetry subscribers.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod shutdown;

pub use error::{Error, Result};
pub use shutdown::ShutdownSignal;

/// Build identification captured by the build script
pub fn build_info() -> String {
    format!(
        "{} {} ({}, {}, built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    )
}
