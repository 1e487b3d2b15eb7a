//! Server-Sent Events telemetry stream

use crate::api::server::AppContext;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events - one SSE event per telemetry envelope
///
/// The SSE `event` field carries the telemetry event name and `data` the
/// serialized envelope.
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ctx.telemetry.sse_response()
}
