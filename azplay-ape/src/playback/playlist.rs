//! Playlist construction
//!
//! A playlist file has one entry per line:
//!
//! ```text
//! cut_id [eof_action [timed_event timed_event_time]]
//! ```
//!
//! Lines naming a cut missing from the catalog are skipped with a warning;
//! the rest of the schedule is kept. Every entry gets a fresh `track_id`
//! when the playlist is built.

use crate::error::{Error, Result};
use azplay_common::events::PlaylistInfo;
use azplay_common::{Catalog, Cut};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What the scheduler does when an entry's cut ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EofAction {
    /// Start the next entry at the segue point
    #[default]
    Segue,
    /// Wait for this cut to finish before starting the next entry
    Hold,
    /// Replay this entry
    Loop,
}

impl EofAction {
    /// Parse a numeric code (`0` hold, `1` loop, `2` segue) or its name
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "0" | "hold" => Some(EofAction::Hold),
            "1" | "loop" => Some(EofAction::Loop),
            "2" | "segue" => Some(EofAction::Segue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EofAction::Segue => "segue",
            EofAction::Hold => "hold",
            EofAction::Loop => "loop",
        }
    }
}

impl fmt::Display for EofAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timed event annotation carried through from the playlist line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub name: String,
    pub at: String,
}

/// A scheduled occurrence of a cut
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub track_id: Uuid,
    pub index: usize,
    pub cut: Arc<Cut>,
    pub eof_action: EofAction,
    pub timed_event: Option<TimedEvent>,
}

impl PlaylistEntry {
    pub fn new(index: usize, cut: Arc<Cut>, eof_action: EofAction) -> Self {
        Self {
            track_id: Uuid::new_v4(),
            index,
            cut,
            eof_action,
            timed_event: None,
        }
    }

    /// Placement block reported in `stream.start`
    pub fn placement(&self) -> PlaylistInfo {
        PlaylistInfo {
            track_id: self.track_id,
            index: self.index,
            eof_action: self.eof_action.to_string(),
        }
    }
}

/// A playlist line that did not become an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

/// Ordered schedule of entries
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
    skipped: Vec<SkippedLine>,
}

impl Playlist {
    pub fn from_entries(entries: Vec<PlaylistEntry>) -> Self {
        Self {
            entries,
            skipped: Vec::new(),
        }
    }

    /// Read and build a playlist file against `catalog`
    pub fn load(path: &Path, catalog: &Catalog) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Playlist(format!("Failed to read playlist {}: {}", path.display(), e))
        })?;
        let playlist = Self::parse(&text, catalog);
        info!(
            "Loaded playlist {} ({} entries, {} skipped)",
            path.display(),
            playlist.len(),
            playlist.skipped.len()
        );
        Ok(playlist)
    }

    /// Build entries from playlist text. Never fails; bad lines are skipped.
    pub fn parse(text: &str, catalog: &Catalog) -> Self {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for (line_no, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(cut_id) = fields.next() else {
                continue;
            };

            let Some(cut) = catalog.get(cut_id) else {
                warn!("Playlist line {}: cut {} not in catalog, skipping", line_no, cut_id);
                skipped.push(SkippedLine {
                    line: line_no,
                    reason: format!("cut {} not in catalog", cut_id),
                });
                continue;
            };

            let eof_action = match fields.next() {
                None => EofAction::Segue,
                Some(token) => EofAction::parse(token).unwrap_or_else(|| {
                    warn!(
                        "Playlist line {}: unknown end-of-file action '{}', using segue",
                        line_no, token
                    );
                    EofAction::Segue
                }),
            };

            let timed_event = match (fields.next(), fields.next()) {
                (Some(name), Some(at)) => Some(TimedEvent {
                    name: name.to_string(),
                    at: at.to_string(),
                }),
                (Some(name), None) => {
                    warn!(
                        "Playlist line {}: timed event '{}' has no time, ignoring",
                        line_no, name
                    );
                    None
                }
                _ => None,
            };

            let mut entry = PlaylistEntry::new(entries.len(), cut, eof_action);
            entry.timed_event = timed_event;
            info!(
                "Added cut {} to playlist at index {} ({})",
                entry.cut.id, entry.index, entry.eof_action
            );
            entries.push(entry);
        }

        Self { entries, skipped }
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }
}
