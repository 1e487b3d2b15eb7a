//! Cut catalog records
//!
//! A cut is one catalogued audio item with its broadcast timing markers.
//! Field names on the wire follow the catalog document produced by the
//! cut list generator (`cut`, `duration`, `_links`, `_ui`, `_track_begin`).

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Immutable catalog record for a single audio item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    /// Catalog id (numeric ids in the document are normalized to strings)
    #[serde(rename = "cut", deserialize_with = "de_cut_id")]
    pub id: String,

    /// Category (group) label, e.g. MUSIC, ID, PROMO
    pub category: String,

    /// Total audio duration in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,

    #[serde(default)]
    pub meta: CutMeta,

    pub timers: Timers,

    /// Stinger mode: overlaps the next cut's intro
    #[serde(default, deserialize_with = "de_topplay")]
    pub topplay: bool,

    #[serde(rename = "_links")]
    pub links: CutLinks,

    #[serde(rename = "_ui", default)]
    pub ui: UiHint,
}

/// Display metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutMeta {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: String,
}

/// Timing markers, all millisecond offsets into the audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    #[serde(rename = "_track_begin", default)]
    pub track_begin: u64,
    #[serde(rename = "_track_end", default)]
    pub track_end: u64,
    #[serde(default)]
    pub intro_begin: u64,
    #[serde(default)]
    pub intro_end: u64,
    pub segue_begin: u64,
    #[serde(default)]
    pub segue_end: u64,
}

impl Timers {
    /// Length of the intro window (time until the cut's hot point)
    pub fn intro_ramp_ms(&self) -> u64 {
        self.intro_end.saturating_sub(self.intro_begin)
    }
}

/// Links to the cut's essence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutLinks {
    /// Path (or file URI) of the audio file
    pub audio: PathBuf,
    #[serde(default)]
    pub albumart: Option<String>,
}

/// Display hint for operator surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiHint {
    #[serde(default = "default_text_color")]
    pub text_color: String,
}

impl Default for UiHint {
    fn default() -> Self {
        Self {
            text_color: default_text_color(),
        }
    }
}

fn default_text_color() -> String {
    "gray".to_string()
}

impl Cut {
    /// Check the timer ordering invariant:
    /// `intro_begin <= intro_end <= segue_begin <= segue_end <= duration`.
    ///
    /// A non-zero `track_end` must also lie inside the audio and after
    /// `track_begin`.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timers;
        let invalid = |reason: String| Error::InvalidCut {
            id: self.id.clone(),
            reason,
        };

        if t.intro_begin > t.intro_end {
            return Err(invalid(format!(
                "intro_begin {} is after intro_end {}",
                t.intro_begin, t.intro_end
            )));
        }
        if t.intro_end > t.segue_begin {
            return Err(invalid(format!(
                "intro_end {} is after segue_begin {}",
                t.intro_end, t.segue_begin
            )));
        }
        if t.segue_begin > t.segue_end {
            return Err(invalid(format!(
                "segue_begin {} is after segue_end {}",
                t.segue_begin, t.segue_end
            )));
        }
        if t.segue_end > self.duration_ms {
            return Err(invalid(format!(
                "segue_end {} is past duration {}",
                t.segue_end, self.duration_ms
            )));
        }
        if t.track_end != 0 && (t.track_begin > t.track_end || t.track_end > self.duration_ms) {
            return Err(invalid(format!(
                "track window {}..{} does not fit duration {}",
                t.track_begin, t.track_end, self.duration_ms
            )));
        }
        Ok(())
    }

    /// "Artist - Title" line used for program-associated data
    pub fn display_line(&self) -> String {
        format!("{} - {}", self.meta.artist, self.meta.title)
    }
}

fn de_cut_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

fn de_topplay<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Flag(bool),
        Mode(i64),
    }

    Ok(match RawFlag::deserialize(deserializer)? {
        RawFlag::Flag(b) => b,
        RawFlag::Mode(n) => n != 0,
    })
}
