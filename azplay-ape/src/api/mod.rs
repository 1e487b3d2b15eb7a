//! HTTP API: SSE telemetry stream plus read-only status endpoints

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, serve, AppContext};
