//! Integration tests for the playlist scheduler
//!
//! The scheduler runs against a manual clock (sleeps advance virtual time)
//! and a fake player, so pacing is checked to the millisecond without
//! real audio or real waiting.

mod helpers;

use azplay_ape::playback::scheduler::{StepReport, FAILED_PASS_BACKOFF, HOLD_POLL_INTERVAL};
use azplay_ape::playback::{
    Clock, EofAction, PadPublisher, Player, Playlist, PlaylistEntry, Scheduler, SessionControl,
    SessionOutcome,
};
use azplay_ape::{Error, Result, ShutdownSignal};
use azplay_common::Cut;
use helpers::make_cut;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Virtual clock; optionally raises shutdown on the n-th sleep
#[derive(Clone)]
struct ManualClock {
    now: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    shutdown: Arc<ShutdownSignal>,
    shutdown_on_sleep: Option<usize>,
    /// Virtual time that passes on every read
    read_cost: Duration,
}

impl ManualClock {
    fn new(shutdown: Arc<ShutdownSignal>) -> Self {
        Self {
            now: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            shutdown,
            shutdown_on_sleep: None,
            read_cost: Duration::ZERO,
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let mut now = self.now.lock().unwrap();
        let read = *now;
        *now += self.read_cost;
        read
    }

    fn sleep(&mut self, duration: Duration) -> bool {
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        if self.shutdown_on_sleep == Some(count) {
            self.shutdown.trigger("test shutdown");
            return false;
        }
        *self.now.lock().unwrap() += duration;
        true
    }
}

#[derive(Default)]
struct SessionState {
    polls: AtomicUsize,
    cancelled: AtomicBool,
    joined: AtomicBool,
}

struct FakeSession {
    state: Arc<SessionState>,
    finish_after: Option<usize>,
}

impl SessionControl for FakeSession {
    fn is_finished(&self) -> bool {
        let polls = self.state.polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.cancelled.load(Ordering::SeqCst)
            || self.finish_after.is_some_and(|n| polls >= n)
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    fn join(self) -> Option<SessionOutcome> {
        self.state.joined.store(true, Ordering::SeqCst);
        Some(SessionOutcome::Completed)
    }
}

struct Start {
    cut_id: String,
    track_id: Uuid,
    at: Duration,
    state: Arc<SessionState>,
}

struct FakePlayer {
    clock: ManualClock,
    starts: Arc<Mutex<Vec<Start>>>,
    fail_cut: Option<String>,
    finish_after: Option<usize>,
}

impl FakePlayer {
    fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            starts: Arc::new(Mutex::new(Vec::new())),
            fail_cut: None,
            finish_after: None,
        }
    }
}

impl Player for FakePlayer {
    type Session = FakeSession;

    fn play(&self, entry: &PlaylistEntry) -> Result<FakeSession> {
        if self.fail_cut.as_deref() == Some(entry.cut.id.as_str()) {
            return Err(Error::Decode(format!("Failed to open file for cut {}", entry.cut.id)));
        }
        let state = Arc::new(SessionState::default());
        self.starts.lock().unwrap().push(Start {
            cut_id: entry.cut.id.clone(),
            track_id: entry.track_id,
            at: self.clock.now(),
            state: Arc::clone(&state),
        });
        Ok(FakeSession {
            state,
            finish_after: self.finish_after,
        })
    }
}

fn cut(id: &str, segue_begin: u64, intro_end: u64, topplay: bool) -> Arc<Cut> {
    make_cut(id, Path::new("/audio/none.flac"), segue_begin, intro_end, topplay)
}

fn playlist(cuts: &[(Arc<Cut>, EofAction)]) -> Playlist {
    Playlist::from_entries(
        cuts.iter()
            .enumerate()
            .map(|(i, (cut, eof))| PlaylistEntry::new(i, Arc::clone(cut), *eof))
            .collect(),
    )
}

struct Rig {
    scheduler: Scheduler<FakePlayer, ManualClock>,
    clock: ManualClock,
    starts: Arc<Mutex<Vec<Start>>>,
    shutdown: Arc<ShutdownSignal>,
}

fn rig_with(playlist: Playlist, configure: impl FnOnce(&mut FakePlayer, &mut ManualClock)) -> Rig {
    let shutdown = Arc::new(ShutdownSignal::new());
    let mut clock = ManualClock::new(Arc::clone(&shutdown));
    let mut player = FakePlayer::new(&clock);
    configure(&mut player, &mut clock);
    let starts = Arc::clone(&player.starts);
    let scheduler = Scheduler::new(playlist, player, clock.clone(), Arc::clone(&shutdown));
    Rig {
        scheduler,
        clock,
        starts,
        shutdown,
    }
}

fn rig(playlist: Playlist) -> Rig {
    rig_with(playlist, |_, _| {})
}

fn starts(rig: &Rig) -> Vec<(String, u64)> {
    rig.starts
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.cut_id.clone(), s.at.as_millis() as u64))
        .collect()
}

#[test]
fn test_normal_cuts_start_at_segue_begin() {
    let mut rig = rig(playlist(&[
        (cut("A", 60000, 0, false), EofAction::Segue),
        (cut("B", 60000, 0, false), EofAction::Segue),
    ]));

    for _ in 0..3 {
        rig.scheduler.step().unwrap();
    }

    assert_eq!(
        starts(&rig),
        vec![
            ("A".to_string(), 0),
            ("B".to_string(), 60000),
            ("A".to_string(), 120000)
        ]
    );
}

#[test]
fn test_topplay_stalls_by_segue_minus_next_ramp() {
    let mut rig = rig(playlist(&[
        (cut("A", 52000, 0, true), EofAction::Segue),
        (cut("B", 60000, 2000, false), EofAction::Segue),
    ]));

    let report = rig.scheduler.step().unwrap();
    assert_eq!(
        report,
        StepReport {
            index: 0,
            started: true,
            paced: Duration::from_millis(50000)
        }
    );
    rig.scheduler.step().unwrap();

    assert_eq!(starts(&rig)[1], ("B".to_string(), 50000));
}

#[test]
fn test_topplay_ramp_covering_segue_starts_next_at_once() {
    let mut rig = rig(playlist(&[
        (cut("A", 52000, 0, true), EofAction::Segue),
        (cut("B", 60000, 60000, false), EofAction::Segue),
    ]));

    rig.scheduler.step().unwrap();
    rig.scheduler.step().unwrap();

    assert_eq!(starts(&rig)[1], ("B".to_string(), 0));
}

#[test]
fn test_wraparound_uses_first_entry_ramp() {
    let mut rig = rig(playlist(&[
        (cut("A", 30000, 10000, false), EofAction::Segue),
        (cut("B", 40000, 0, true), EofAction::Segue),
    ]));

    rig.scheduler.step().unwrap();
    assert_eq!(rig.scheduler.position(), 1);
    // B is topplay; its successor is A (wrapped), whose ramp is 10 s
    let report = rig.scheduler.step().unwrap();
    assert_eq!(report.paced, Duration::from_millis(30000));
    assert_eq!(rig.scheduler.position(), 0);

    rig.scheduler.step().unwrap();
    assert_eq!(
        starts(&rig),
        vec![
            ("A".to_string(), 0),
            ("B".to_string(), 30000),
            ("A".to_string(), 60000)
        ]
    );
}

#[test]
fn test_failed_start_skips_without_pacing() {
    let mut rig = rig_with(
        playlist(&[
            (cut("BAD", 60000, 0, false), EofAction::Segue),
            (cut("B", 60000, 0, false), EofAction::Segue),
        ]),
        |player, _| player.fail_cut = Some("BAD".to_string()),
    );

    let report = rig.scheduler.step().unwrap();
    assert!(!report.started);
    assert_eq!(report.paced, Duration::ZERO);
    assert_eq!(rig.scheduler.position(), 1);

    rig.scheduler.step().unwrap();
    assert_eq!(starts(&rig), vec![("B".to_string(), 0)]);
    assert_eq!(rig.scheduler.active_sessions(), 1);
}

#[test]
fn test_full_failed_pass_backs_off() {
    let mut rig = rig_with(
        playlist(&[(cut("BAD", 60000, 0, false), EofAction::Segue)]),
        |player, _| player.fail_cut = Some("BAD".to_string()),
    );

    rig.scheduler.step().unwrap();
    assert_eq!(rig.clock.sleeps(), vec![FAILED_PASS_BACKOFF]);
    assert!(starts(&rig).is_empty());
}

#[test]
fn test_hold_waits_for_session_to_finish() {
    let mut rig = rig_with(
        playlist(&[
            (cut("A", 60000, 0, false), EofAction::Hold),
            (cut("B", 60000, 0, false), EofAction::Segue),
        ]),
        |player, _| player.finish_after = Some(3),
    );

    let report = rig.scheduler.step().unwrap();
    // Two unfinished polls, each followed by one poll interval
    assert_eq!(report.paced, HOLD_POLL_INTERVAL * 2);
    assert_eq!(rig.scheduler.position(), 1);
    assert_eq!(rig.scheduler.active_sessions(), 0);

    let starts = rig.starts.lock().unwrap();
    let first = &starts[0];
    assert!(first.state.joined.load(Ordering::SeqCst));
    assert!(!first.state.cancelled.load(Ordering::SeqCst));
}

#[test]
fn test_loop_replays_same_entry() {
    let mut rig = rig_with(
        playlist(&[
            (cut("A", 60000, 0, false), EofAction::Loop),
            (cut("B", 60000, 0, false), EofAction::Segue),
        ]),
        |player, _| player.finish_after = Some(1),
    );

    rig.scheduler.step().unwrap();
    rig.scheduler.step().unwrap();
    assert_eq!(rig.scheduler.position(), 0);

    let starts = rig.starts.lock().unwrap();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[0].cut_id, "A");
    assert_eq!(starts[1].cut_id, "A");
    assert_eq!(starts[0].track_id, starts[1].track_id);
}

#[test]
fn test_finished_segue_sessions_are_reaped() {
    let mut rig = rig_with(
        playlist(&[
            (cut("A", 1000, 0, false), EofAction::Segue),
            (cut("B", 1000, 0, false), EofAction::Segue),
        ]),
        |player, _| player.finish_after = Some(1),
    );

    rig.scheduler.step().unwrap();
    assert_eq!(rig.scheduler.active_sessions(), 1);
    rig.scheduler.step().unwrap();
    assert_eq!(rig.scheduler.active_sessions(), 1);

    let starts = rig.starts.lock().unwrap();
    assert!(starts[0].state.joined.load(Ordering::SeqCst));
    assert!(!starts[1].state.joined.load(Ordering::SeqCst));
}

#[test]
fn test_run_stops_on_shutdown_and_cancels_sessions() {
    let mut rig = rig_with(
        playlist(&[
            (cut("A", 60000, 0, false), EofAction::Segue),
            (cut("B", 60000, 0, false), EofAction::Segue),
        ]),
        |_, clock| clock.shutdown_on_sleep = Some(2),
    );

    rig.scheduler.run().unwrap();

    assert!(rig.shutdown.is_triggered());
    assert_eq!(rig.scheduler.active_sessions(), 0);
    let starts = rig.starts.lock().unwrap();
    assert_eq!(starts.len(), 2);
    for start in starts.iter() {
        assert!(start.state.cancelled.load(Ordering::SeqCst));
        assert!(start.state.joined.load(Ordering::SeqCst));
    }
}

#[test]
fn test_shutdown_while_holding_cancels_session() {
    let mut rig = rig_with(
        playlist(&[(cut("A", 60000, 0, false), EofAction::Hold)]),
        |_, clock| clock.shutdown_on_sleep = Some(1),
    );

    rig.scheduler.run().unwrap();

    let starts = rig.starts.lock().unwrap();
    assert_eq!(starts.len(), 1);
    assert!(starts[0].state.cancelled.load(Ordering::SeqCst));
    assert!(starts[0].state.joined.load(Ordering::SeqCst));
}

#[test]
fn test_run_rejects_empty_playlist() {
    let mut rig = rig(Playlist::from_entries(Vec::new()));
    assert!(matches!(rig.scheduler.run(), Err(Error::Playlist(_))));
}

#[test]
fn test_pad_written_on_each_start() {
    let dir = tempfile::tempdir().unwrap();
    let pad_path = dir.path().join("pad.json");
    let rig = rig(playlist(&[
        (cut("A", 60000, 0, false), EofAction::Segue),
        (cut("B", 60000, 0, false), EofAction::Segue),
    ]));
    let mut scheduler = rig
        .scheduler
        .with_pad(PadPublisher::new(Some(pad_path.clone())));

    scheduler.step().unwrap();
    let pad: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&pad_path).unwrap()).unwrap();
    assert_eq!(pad["cut"], "A");

    scheduler.step().unwrap();
    let pad: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&pad_path).unwrap()).unwrap();
    assert_eq!(pad["cut"], "B");
}

#[test]
fn test_time_spent_after_start_comes_out_of_pacing() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig_with(
        playlist(&[
            (cut("A", 60000, 0, false), EofAction::Segue),
            (cut("B", 60000, 0, false), EofAction::Segue),
        ]),
        |_, clock| clock.read_cost = Duration::from_millis(5),
    );
    let mut scheduler = rig
        .scheduler
        .with_pad(PadPublisher::new(Some(dir.path().join("pad.json"))));

    let report = scheduler.step().unwrap();
    assert_eq!(report.paced, Duration::from_millis(60000));
    // One clock read between the start and the sleep
    assert_eq!(rig.clock.sleeps(), vec![Duration::from_millis(59995)]);
}
