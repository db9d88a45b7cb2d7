//! Reliable command replay state machine.

use skirmish_module_abi::HostError;

use super::bare_session;
use crate::session::Session;

fn deliver(session: &mut Session, commands: &[&str]) {
    for (i, text) in commands.iter().enumerate() {
        session
            .core
            .server_commands
            .record(i as i32 + 1, text);
    }
}

#[test]
fn reassembled_big_strings_match_a_direct_command() {
    let mut split = bare_session();
    deliver(
        &mut split,
        &[
            "bcs0 4 \"hello\"",
            "bcs1 4 \" world\"",
            "bcs2 4 \"!\"",
        ],
    );
    assert!(!split.core.get_server_command(1).unwrap());
    assert!(!split.core.get_server_command(2).unwrap());
    assert!(split.core.get_server_command(3).unwrap());
    let split_args: Vec<String> = (0..split.core.console.argc())
        .map(|i| split.core.console.argv(i).to_string())
        .collect();

    let mut direct = bare_session();
    deliver(&mut direct, &["cs 4 \"hello world!\""]);
    assert!(direct.core.get_server_command(1).unwrap());
    let direct_args: Vec<String> = (0..direct.core.console.argc())
        .map(|i| direct.core.console.argv(i).to_string())
        .collect();

    assert_eq!(split_args, direct_args);
    assert_eq!(split.core.game_state.get(4), "hello world!");
    assert_eq!(direct.core.game_state.get(4), "hello world!");
}

#[test]
fn configstring_set_is_idempotent() {
    let mut session = bare_session();
    deliver(&mut session, &["cs 7 \"stable\"", "cs 7 \"stable\""]);
    assert!(session.core.get_server_command(1).unwrap());
    let count = session.core.game_state.data_count();
    assert!(session.core.get_server_command(2).unwrap());
    assert_eq!(session.core.game_state.data_count(), count);
}

#[test]
fn disconnect_carries_the_server_reason() {
    let mut session = bare_session();
    deliver(&mut session, &["disconnect \"server is restarting\""]);
    match session.core.get_server_command(1).unwrap_err() {
        HostError::Disconnect { reason } => {
            assert_eq!(reason, "server disconnected - server is restarting");
        }
        other => panic!("unexpected error class: {other:?}"),
    }

    let mut session = bare_session();
    deliver(&mut session, &["disconnect"]);
    match session.core.get_server_command(1).unwrap_err() {
        HostError::Disconnect { reason } => assert_eq!(reason, "server disconnected"),
        other => panic!("unexpected error class: {other:?}"),
    }
}

#[test]
fn ignored_commands_are_consumed_without_execution() {
    let mut session = bare_session();
    deliver(&mut session, &["cs 3 \"should not apply\""]);
    session.core.server_commands.set_ignored(1);
    session.core.console.tokenize_current("stale tokens");

    assert!(!session.core.get_server_command(1).unwrap());
    assert_eq!(session.core.server_commands.last_executed, 1);
    assert_eq!(session.core.console.argc(), 0);
    assert_eq!(session.core.game_state.get(3), "");
}

#[test]
fn underrun_is_fatal_live_but_soft_in_demo_playback() {
    let mut session = bare_session();
    for n in 1..=(crate::COMMAND_BACKUP as i32 + 8) {
        session.core.server_commands.record(n, "noop");
    }
    let stale = 1;
    let err = session.core.get_server_command(stale).unwrap_err();
    assert!(matches!(err, HostError::DropSession { .. }));

    session.core.demo.playing = true;
    session.core.console.tokenize_current("pending");
    assert!(!session.core.get_server_command(stale).unwrap());
    assert_eq!(session.core.console.argc(), 0);
}

#[test]
fn commands_not_yet_received_are_fatal() {
    let mut session = bare_session();
    deliver(&mut session, &["noop"]);
    let err = session.core.get_server_command(2).unwrap_err();
    assert!(matches!(err, HostError::DropSession { .. }));
}

#[test]
fn map_restart_clears_notify_and_buffered_input() {
    let mut session = bare_session();
    session.core.console.print("old notify line");
    session.core.user_cmds.record(skirmish_module_abi::views::UserCmdView {
        server_time: 99,
        ..Default::default()
    });
    deliver(&mut session, &["map_restart"]);

    assert!(session.core.get_server_command(1).unwrap());
    assert_eq!(session.core.console.notify_lines().count(), 0);
    let latest = session.core.user_cmds.current_number();
    assert_eq!(
        session.core.user_cmds.get(latest).unwrap().unwrap().server_time,
        0,
    );
    assert_eq!(session.core.console.argv(0), "map_restart");
}

#[test]
fn levelshot_requires_a_local_simulation_authority() {
    let mut session = bare_session();
    deliver(&mut session, &["levelshot", "levelshot"]);

    session.core.sv_running = false;
    assert!(!session.core.get_server_command(1).unwrap());
    assert!(session.core.console.drain_commands().is_empty());

    session.core.sv_running = true;
    assert!(session.core.get_server_command(2).unwrap());
    assert_eq!(
        session.core.console.drain_commands(),
        vec!["screenshot levelshot".to_string()],
    );
}

#[test]
fn oversized_reassembly_is_fatal() {
    let mut session = bare_session();
    let huge = format!("bcs1 4 \"{}\"", "x".repeat(crate::BIG_COMMAND_CHARS));
    deliver(&mut session, &["bcs0 4 \"seed\"", &huge]);
    assert!(!session.core.get_server_command(1).unwrap());
    let err = session.core.get_server_command(2).unwrap_err();
    assert!(matches!(err, HostError::DropSession { .. }));
}

#[test]
fn unreserved_commands_pass_straight_to_the_module_layer() {
    let mut session = bare_session();
    deliver(&mut session, &["scores 12 7"]);
    assert!(session.core.get_server_command(1).unwrap());
    assert_eq!(session.core.console.argv(0), "scores");
    assert_eq!(session.core.console.args_from(1), "12 7");
}
