//! Telemetry message contract
//!
//! Every message leaving the playout engine is a [`TelemetryEnvelope`]:
//!
//! ```json
//! { "timestamp": 1700000000000, "origin": "azplay-ape",
//!   "event": "stream.update", "data": { ... } }
//! ```
//!
//! For a single `playlist_track_id` events are produced in
//! `stream.start → stream.update* → stream.end` order.

use crate::cut::Cut;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output device identity as reported in telemetry
///
/// `index`/`name` are `None` when the host default device is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: Option<usize>,
    pub name: Option<String>,
}

/// Playlist placement of the cut being played
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub track_id: Uuid,
    pub index: usize,
    pub eof_action: String,
}

/// Lifecycle state of a playout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Playing,
    Ending,
    Terminated,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Terminated | SessionStatus::Aborted)
    }
}

/// How a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    /// End-of-stream reached
    Completed,
    /// Underrun, format error, device shutdown, stall or cancellation
    Aborted,
}

/// `stream.start` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStart {
    pub playlist_track_id: Uuid,
    pub playlist: PlaylistInfo,
    pub cut_info: Cut,
    pub device: DeviceInfo,
}

/// `stream.update` payload (throttled position/latency report)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamUpdate {
    pub playlist_track_id: Uuid,
    /// Output latency in milliseconds (device playback time minus callback time)
    pub buffer_latency: i64,
    pub cut_id: String,
    pub device: DeviceInfo,
    pub status: SessionStatus,
    /// Audio consumed so far, in milliseconds
    pub track_elapsed: u64,
}

/// `stream.end` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnd {
    pub playlist_track_id: Uuid,
    pub cut_info: Cut,
    pub device: DeviceInfo,
    pub outcome: EndOutcome,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

/// Telemetry events, tagged with their wire event name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TelemetryEvent {
    #[serde(rename = "stream.start")]
    StreamStart(StreamStart),
    #[serde(rename = "stream.update")]
    StreamUpdate(StreamUpdate),
    #[serde(rename = "stream.end")]
    StreamEnd(StreamEnd),
}

impl TelemetryEvent {
    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::StreamStart(_) => "stream.start",
            TelemetryEvent::StreamUpdate(_) => "stream.update",
            TelemetryEvent::StreamEnd(_) => "stream.end",
        }
    }

    pub fn track_id(&self) -> Uuid {
        match self {
            TelemetryEvent::StreamStart(e) => e.playlist_track_id,
            TelemetryEvent::StreamUpdate(e) => e.playlist_track_id,
            TelemetryEvent::StreamEnd(e) => e.playlist_track_id,
        }
    }
}

/// Serialized message handed to the telemetry transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    /// Milliseconds since unix epoch
    pub timestamp: i64,
    pub origin: String,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_envelope_shape() {
        let track_id = Uuid::new_v4();
        let envelope = TelemetryEnvelope {
            timestamp: 1_700_000_000_000,
            origin: "azplay-ape".to_string(),
            event: TelemetryEvent::StreamUpdate(StreamUpdate {
                playlist_track_id: track_id,
                buffer_latency: 12,
                cut_id: "100000".to_string(),
                device: DeviceInfo::default(),
                status: SessionStatus::Playing,
                track_elapsed: 1500,
            }),
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["origin"], "azplay-ape");
        assert_eq!(value["event"], "stream.update");
        assert_eq!(value["data"]["buffer_latency"], 12);
        assert_eq!(value["data"]["status"], "playing");
        assert_eq!(value["data"]["playlist_track_id"], track_id.to_string());
        assert!(value["data"]["device"]["name"].is_null());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(SessionStatus::Aborted.is_terminal());
        assert!(!SessionStatus::Ending.is_terminal());
        assert!(!SessionStatus::Playing.is_terminal());
    }
}
