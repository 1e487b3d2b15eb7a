//! Active session registry
//!
//! Maps `playlist_track_id` to its live [`PlayoutSession`]. Owned by the
//! engine and shared with every session worker; the real-time callback
//! never touches it.

use crate::error::{Error, Result};
use crate::playback::session::{AbortCause, SessionContext};
use azplay_common::events::{DeviceInfo, SessionStatus};
use azplay_common::Cut;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// One active playout session as tracked by the engine
pub struct PlayoutSession {
    pub track_id: Uuid,
    pub cut: Arc<Cut>,
    pub device: DeviceInfo,
    pub started_at: DateTime<Utc>,
    /// Throttle reference, starting at registration
    last_telemetry_at: Instant,
    context: Arc<SessionContext>,
}

impl PlayoutSession {
    pub fn new(track_id: Uuid, cut: Arc<Cut>, device: DeviceInfo, context: Arc<SessionContext>) -> Self {
        Self {
            track_id,
            cut,
            device,
            started_at: azplay_common::time::now(),
            last_telemetry_at: Instant::now(),
            context,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.context.status()
    }
}

/// Serializable view of a session for the status API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub track_id: Uuid,
    pub cut_id: String,
    pub title: String,
    pub device: DeviceInfo,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, PlayoutSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, PlayoutSession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim a track id. Fails if a session with the same id is active.
    pub fn register(&self, session: PlayoutSession) -> Result<()> {
        let mut sessions = self.sessions();
        if sessions.contains_key(&session.track_id) {
            return Err(Error::DuplicateTrack(session.track_id));
        }
        debug!("Registered session {} (cut {})", session.track_id, session.cut.id);
        sessions.insert(session.track_id, session);
        Ok(())
    }

    pub fn remove(&self, track_id: Uuid) -> Option<PlayoutSession> {
        let removed = self.sessions().remove(&track_id);
        if removed.is_some() {
            debug!("Removed session {}", track_id);
        }
        removed
    }

    pub fn contains(&self, track_id: Uuid) -> bool {
        self.sessions().contains_key(&track_id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Throttle gate for `stream.update`.
    ///
    /// Returns `true` (and records `now`) when at least `min_interval` has
    /// passed since the last update for this track, or since registration.
    pub fn claim_update_slot(&self, track_id: Uuid, now: Instant, min_interval: Duration) -> bool {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(&track_id) else {
            return false;
        };
        if now.saturating_duration_since(session.last_telemetry_at) < min_interval {
            return false;
        }
        session.last_telemetry_at = now;
        true
    }

    /// Restart the update interval for a track, e.g. once `stream.start` is out
    pub fn restart_update_interval(&self, track_id: Uuid, now: Instant) {
        if let Some(session) = self.sessions().get_mut(&track_id) {
            session.last_telemetry_at = now;
        }
    }

    /// Abort every active session (device shutdown)
    pub fn abort_all(&self, cause: AbortCause) {
        let sessions = self.sessions();
        if !sessions.is_empty() {
            warn!("Aborting {} active session(s): {}", sessions.len(), cause);
        }
        for session in sessions.values() {
            session.context.abort(cause.clone());
        }
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut list: Vec<SessionSnapshot> = self
            .sessions()
            .values()
            .map(|s| SessionSnapshot {
                track_id: s.track_id,
                cut_id: s.cut.id.clone(),
                title: s.cut.display_line(),
                device: s.device.clone(),
                status: s.status(),
                started_at: s.started_at,
                elapsed_ms: s.context.elapsed_ms(),
            })
            .collect();
        list.sort_by_key(|s| s.started_at);
        list
    }
}
