//! # AZPlay Common Library
//!
//! Shared code for the AZPlay playout tools including:
//! - Cut catalog model and loading
//! - Telemetry message contract (stream.start / stream.update / stream.end)
//! - Configuration file discovery
//! - Timestamp helpers

pub mod catalog;
pub mod config;
pub mod cut;
pub mod error;
pub mod events;
pub mod time;

pub use catalog::Catalog;
pub use cut::{Cut, CutLinks, CutMeta, Timers, UiHint};
pub use error::{Error, Result};
