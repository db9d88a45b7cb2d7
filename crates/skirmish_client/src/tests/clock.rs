//! Clock derivation and drift correction.

use skirmish_module_abi::views::EntityStateView;
use skirmish_module_abi::HostError;

use super::bare_session;
use crate::services::{DemoFeed, DemoMessage};
use crate::session::Session;
use crate::snapshot::{StoredSnapshot, SNAPSHOT_NOT_ACTIVE};
use crate::state::ConnectionState;

fn snap(message_num: i32, server_time: i64) -> StoredSnapshot {
    StoredSnapshot {
        message_num,
        server_time,
        ping: 40,
        ..StoredSnapshot::default()
    }
}

/// Prime a session and activate it with a first snapshot.
fn active_session(first_server_time: i64, realtime: i64) -> Session {
    let mut session = bare_session();
    session.core.connection = ConnectionState::Primed;
    session.core.begin_frame(realtime);
    session.core.snapshots.record(snap(1, first_server_time), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.connection, ConnectionState::Active);
    session
}

#[test]
fn first_snapshot_hard_sets_the_delta_and_flushes_the_action_once() {
    let mut session = bare_session();
    session.core.cvars.set("cl_activeAction", "record opening");
    session.core.connection = ConnectionState::Primed;
    session.core.begin_frame(500);
    session.core.snapshots.record(snap(1, 10_000), &[]);

    session.core.set_game_time().unwrap();
    assert_eq!(session.core.connection, ConnectionState::Active);
    assert_eq!(session.core.clock.server_time_delta, 9_500);
    assert_eq!(
        session.core.console.drain_commands(),
        vec!["record opening".to_string()],
    );
    assert_eq!(session.core.cvars.string("cl_activeAction"), "");

    // Later snapshots never flush it again.
    session.core.begin_frame(550);
    session.core.snapshots.record(snap(2, 10_050), &[]);
    session.core.set_game_time().unwrap();
    assert!(session.core.console.drain_commands().is_empty());
}

#[test]
fn inactive_snapshots_do_not_end_the_priming_state() {
    let mut session = bare_session();
    session.core.connection = ConnectionState::Primed;
    session.core.begin_frame(100);
    let mut first = snap(1, 9_000);
    first.flags = SNAPSHOT_NOT_ACTIVE;
    session.core.snapshots.record(first, &[]);

    session.core.set_game_time().unwrap();
    assert_eq!(session.core.connection, ConnectionState::Primed);
}

#[test]
fn derived_time_never_flows_backwards() {
    let mut session = active_session(10_000, 500);
    session.core.begin_frame(600);
    session.core.set_game_time().unwrap();
    let before = session.core.clock.server_time;

    // A suddenly positive nudge would pull the derived time backwards;
    // the clamp holds it.
    session.core.cvars.set("cl_timeNudge", "200");
    session.core.begin_frame(610);
    session.core.set_game_time().unwrap();
    assert!(session.core.clock.server_time >= before);
}

#[test]
fn large_discrepancies_snap_the_delta() {
    let mut session = active_session(10_000, 500);
    session.core.begin_frame(600);
    // Server time leaps by far more than the reset threshold.
    session.core.snapshots.record(snap(2, 30_000), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, 30_000 - 600);
    assert_eq!(session.core.clock.server_time, 30_000);
}

#[test]
fn medium_discrepancies_halve_toward_the_target() {
    let mut session = active_session(10_000, 500);
    let old_delta = session.core.clock.server_time_delta;
    session.core.begin_frame(600);
    // 200 ms ahead of the current delta's prediction.
    session.core.snapshots.record(snap(2, 600 + old_delta + 200), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, old_delta + 100);
}

#[test]
fn small_discrepancies_drift_by_single_milliseconds() {
    let mut session = active_session(10_000, 500);
    let old_delta = session.core.clock.server_time_delta;
    session.core.clock.extrapolated_snapshot = false;
    session.core.begin_frame(600);
    session.core.snapshots.record(snap(2, 600 + old_delta + 10), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, old_delta + 1);

    // An extrapolated previous frame pulls back instead.
    let old_delta = session.core.clock.server_time_delta;
    session.core.clock.extrapolated_snapshot = true;
    session.core.begin_frame(700);
    session.core.snapshots.record(snap(3, 700 + old_delta + 10), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, old_delta - 2);
    assert!(!session.core.clock.extrapolated_snapshot);
}

#[test]
fn scaled_time_skips_the_fine_drift() {
    let mut session = active_session(10_000, 500);
    session.core.cvars.set("timescale", "0.5");
    let old_delta = session.core.clock.server_time_delta;
    session.core.clock.extrapolated_snapshot = false;
    session.core.begin_frame(600);
    session.core.snapshots.record(snap(2, 600 + old_delta + 10), &[]);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, old_delta);
}

#[test]
fn backwards_snapshot_time_is_fatal() {
    let mut session = active_session(10_000, 500);
    session.core.begin_frame(600);
    session.core.set_game_time().unwrap();
    session.core.snapshots.latest.server_time = 5_000;
    session.core.begin_frame(700);
    let err = session.core.set_game_time().unwrap_err();
    assert!(matches!(err, HostError::DropSession { .. }));
}

#[test]
fn median_ping_resists_outlier_spikes() {
    let mut session = bare_session();
    for (n, ping) in [(1, 50), (2, 999), (3, 10), (4, 30)] {
        let mut s = snap(n, i64::from(n) * 50);
        s.ping = ping;
        session.core.snapshots.record(s, &[]);
    }
    assert_eq!(session.core.avg_ping(), 30.0);
}

#[test]
fn even_sample_counts_average_the_central_values() {
    let mut session = bare_session();
    for (n, ping) in [(1, 20), (2, 40), (3, 60), (4, 80)] {
        let mut s = snap(n, i64::from(n) * 50);
        s.ping = ping;
        session.core.snapshots.record(s, &[]);
    }
    assert_eq!(session.core.avg_ping(), 50.0);
}

#[test]
fn auto_nudge_derives_from_the_ping_median() {
    let mut session = bare_session();
    for (n, ping) in [(1, 50), (2, 999), (3, 10), (4, 30)] {
        let mut s = snap(n, i64::from(n) * 50);
        s.ping = ping;
        session.core.snapshots.record(s, &[]);
    }
    session.core.cvars.set("cl_autoNudge", "1");
    assert_eq!(session.core.time_nudge(), -30);

    session.core.cvars.set("cl_autoNudge", "0");
    session.core.cvars.set("cl_timeNudge", "-15");
    assert_eq!(session.core.time_nudge(), -15);
}

#[test]
fn demo_playback_never_drifts_the_delta() {
    let mut session = active_session(10_000, 500);
    session.core.demo.playing = true;
    let old_delta = session.core.clock.server_time_delta;
    session.core.begin_frame(600);
    session.core.snapshots.record(snap(2, 600 + old_delta + 200), &[]);
    session.core.adjust_time_delta();
    assert_eq!(session.core.clock.server_time_delta, old_delta);
}

#[test]
fn frozen_demo_steps_the_delta_by_frametime() {
    let mut session = active_session(10_000, 500);
    session.core.demo.playing = true;
    session.core.cvars.set("timescale", "0");
    let old_delta = session.core.clock.server_time_delta;
    // Feed far-future snapshots so playback has data in hand.
    session.core.snapshots.record(snap(2, 99_000), &[]);
    session.core.snapshots.new_snapshots = false;
    session.core.begin_frame(700);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.clock.server_time_delta, old_delta - 200);
}

struct VecFeed {
    messages: Vec<DemoMessage>,
}

impl DemoFeed for VecFeed {
    fn read_message(&mut self) -> DemoMessage {
        if self.messages.is_empty() {
            DemoMessage::End
        } else {
            self.messages.remove(0)
        }
    }
}

#[test]
fn demo_playback_reads_until_snapshots_cover_the_derived_time() {
    let mut session = active_session(10_000, 500);
    session.core.demo.playing = true;
    session.core.services.demo_feed = Some(Box::new(VecFeed {
        messages: vec![
            DemoMessage::Snapshot {
                snapshot: snap(2, 10_040),
                entities: Vec::<EntityStateView>::new(),
            },
            DemoMessage::Snapshot {
                snapshot: snap(3, 99_999),
                entities: Vec::new(),
            },
        ],
    }));
    session.core.begin_frame(600);
    session.core.set_game_time().unwrap();
    // Messages were consumed until a snapshot beyond the derived time.
    assert_eq!(session.core.snapshots.latest.message_num, 3);
    assert_eq!(session.core.connection, ConnectionState::Active);
}

#[test]
fn demo_end_returns_the_session_to_idle() {
    let mut session = active_session(10_000, 500);
    session.core.demo.playing = true;
    session.core.services.demo_feed = Some(Box::new(VecFeed { messages: vec![] }));
    // Push derived time past the latest snapshot so playback must read.
    session.core.begin_frame(99_999);
    session.core.set_game_time().unwrap();
    assert_eq!(session.core.connection, ConnectionState::Idle);
}
