//! Playlist scheduler
//!
//! Walks the playlist forever on a single control thread, starting one
//! session per entry and pacing the next start from the cut's timers:
//!
//! - **Normal cut**: wait `segue_begin` after this cut's start.
//! - **Topplay cut**: the next cut's intro ramp (`intro_end - intro_begin`)
//!   overlaps this cut. If the ramp is shorter than `segue_begin`, the next
//!   start is stalled by `segue_begin - ramp`; otherwise it starts at once.
//!
//! The entry after the last one is entry 0. Pacing sleeps are the only
//! intentional blocking in the control path and are cut short by shutdown.

use crate::error::{Error, Result};
use crate::playback::pad::PadPublisher;
use crate::playback::playlist::{EofAction, Playlist, PlaylistEntry};
use crate::playback::session::{SessionHandle, SessionOutcome};
use crate::shutdown::ShutdownSignal;
use azplay_common::Cut;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll period while waiting on a hold/loop entry to finish
pub const HOLD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Back-off after a full pass in which no entry could be started
pub const FAILED_PASS_BACKOFF: Duration = Duration::from_secs(1);

/// Time source for pacing
pub trait Clock: Send {
    /// Monotonic time since the clock was created
    fn now(&self) -> Duration;

    /// Sleep for `duration`. Returns `false` if interrupted by shutdown.
    fn sleep(&mut self, duration: Duration) -> bool;
}

/// Wall clock whose sleeps wake on shutdown
pub struct SystemClock {
    origin: Instant,
    shutdown: Arc<ShutdownSignal>,
}

impl SystemClock {
    pub fn new(shutdown: Arc<ShutdownSignal>) -> Self {
        Self {
            origin: Instant::now(),
            shutdown,
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) -> bool {
        !self.shutdown.wait_timeout(duration)
    }
}

/// A running session as seen by the scheduler
pub trait SessionControl {
    fn is_finished(&self) -> bool;
    fn cancel(&self);
    fn join(self) -> Option<SessionOutcome>;
}

impl SessionControl for SessionHandle {
    fn is_finished(&self) -> bool {
        SessionHandle::is_finished(self)
    }

    fn cancel(&self) {
        SessionHandle::cancel(self)
    }

    fn join(self) -> Option<SessionOutcome> {
        SessionHandle::join(self)
    }
}

/// Starts sessions for playlist entries
pub trait Player {
    type Session: SessionControl;

    fn play(&self, entry: &PlaylistEntry) -> Result<Self::Session>;
}

/// Index of the entry after `index`, wrapping to 0
pub fn next_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (index + 1) % len
    }
}

/// Delay between starting `current` and starting `next`
pub fn pacing_delay(current: &Cut, next: &Cut) -> Duration {
    let segue_begin = current.timers.segue_begin;
    if !current.topplay {
        return Duration::from_millis(segue_begin);
    }

    let next_ramp = next.timers.intro_ramp_ms();
    if next_ramp < segue_begin {
        Duration::from_millis(segue_begin - next_ramp)
    } else {
        Duration::ZERO
    }
}

/// What one scheduler step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub started: bool,
    /// Interval from this start to the next (zero when the start failed)
    pub paced: Duration,
}

pub struct Scheduler<P: Player, C: Clock> {
    playlist: Playlist,
    player: P,
    clock: C,
    shutdown: Arc<ShutdownSignal>,
    pad: Option<PadPublisher>,
    position: usize,
    consecutive_failures: usize,
    active: Vec<P::Session>,
}

impl<P: Player, C: Clock> Scheduler<P, C> {
    pub fn new(playlist: Playlist, player: P, clock: C, shutdown: Arc<ShutdownSignal>) -> Self {
        Self {
            playlist,
            player,
            clock,
            shutdown,
            pad: None,
            position: 0,
            consecutive_failures: 0,
            active: Vec::new(),
        }
    }

    /// Publish program-associated data on every start
    pub fn with_pad(mut self, pad: PadPublisher) -> Self {
        self.pad = Some(pad);
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn active_sessions(&self) -> usize {
        self.active.len()
    }

    /// Start the entry at the current position and pace the next start
    pub fn step(&mut self) -> Result<StepReport> {
        let len = self.playlist.len();
        let index = self.position;
        let entry = self
            .playlist
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Playlist("Playlist has no playable entries".to_string()))?;

        self.reap_finished();

        let started_at = self.clock.now();
        let session = match self.player.play(&entry) {
            Ok(session) => {
                self.consecutive_failures = 0;
                session
            }
            Err(e) => {
                error!(
                    "Failed to start cut {} (track {}, index {}): {}",
                    entry.cut.id, entry.track_id, index, e
                );
                self.position = next_index(index, len);
                self.consecutive_failures += 1;
                if self.consecutive_failures >= len {
                    warn!(
                        "No entry could be started in a full pass; retrying in {:?}",
                        FAILED_PASS_BACKOFF
                    );
                    self.consecutive_failures = 0;
                    self.clock.sleep(FAILED_PASS_BACKOFF);
                }
                return Ok(StepReport {
                    index,
                    started: false,
                    paced: Duration::ZERO,
                });
            }
        };

        // Pacing runs from here; later work comes out of the sleep
        let playing_at = self.clock.now();

        info!(
            "Started cut {} \"{}\" at index {} ({})",
            entry.cut.id,
            entry.cut.display_line(),
            index,
            entry.eof_action
        );
        if let Some(pad) = &self.pad {
            pad.publish(&entry.cut);
        }

        let paced = match entry.eof_action {
            EofAction::Segue => {
                let next = self.playlist.get(next_index(index, len)).unwrap_or(&entry);
                let delay = pacing_delay(&entry.cut, &next.cut);
                debug!("Next start in {:?} (topplay={})", delay, entry.cut.topplay);
                self.active.push(session);
                let spent = self.clock.now().saturating_sub(playing_at);
                self.clock.sleep(delay.saturating_sub(spent));
                delay
            }
            EofAction::Hold | EofAction::Loop => {
                self.wait_for(&session);
                match session.join() {
                    Some(outcome) if outcome.is_completed() => {
                        debug!("Track {} finished", entry.track_id)
                    }
                    Some(outcome) => warn!("Track {} ended early: {:?}", entry.track_id, outcome),
                    None => warn!("Track {} has no outcome", entry.track_id),
                }
                self.clock.now().saturating_sub(started_at)
            }
        };

        if entry.eof_action != EofAction::Loop {
            self.position = next_index(index, len);
        }

        Ok(StepReport {
            index,
            started: true,
            paced,
        })
    }

    /// Run until shutdown, then cancel and join every session
    pub fn run(&mut self) -> Result<()> {
        if self.playlist.is_empty() {
            return Err(Error::Playlist("Playlist has no playable entries".to_string()));
        }

        info!("Scheduler running {} entries", self.playlist.len());
        while !self.shutdown.is_triggered() {
            self.step()?;
        }

        self.stop_all();
        Ok(())
    }

    /// Cancel and join all sessions still running
    pub fn stop_all(&mut self) {
        if !self.active.is_empty() {
            info!("Stopping {} active session(s)", self.active.len());
        }
        for session in &self.active {
            session.cancel();
        }
        for session in self.active.drain(..) {
            session.join();
        }
    }

    fn wait_for(&mut self, session: &P::Session) {
        while !session.is_finished() {
            if !self.clock.sleep(HOLD_POLL_INTERVAL) {
                warn!("Shutdown while holding; cancelling session");
                session.cancel();
                return;
            }
        }
    }

    fn reap_finished(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].is_finished() {
                let session = self.active.swap_remove(i);
                session.join();
            } else {
                i += 1;
            }
        }
    }
}
