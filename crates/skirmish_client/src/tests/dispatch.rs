//! Trap dispatch through a live module.

use std::cell::RefCell;
use std::rc::Rc;

use skirmish_module_abi::views::{CvarView, GameStateView, TraceResultView};
use skirmish_module_abi::{f32_to_word, word_to_f32, EntryOp, HostError, HostOp, MAX_TRAP_ARGS};

use super::{session_with_module, stage_record, stage_str, unstage_record, unstage_str};
use crate::cvar::{CVAR_ARCHIVE, CVAR_PROTECTED};
use crate::services::{CollisionService, NullCollision};
use crate::snapshot::StoredSnapshot;
use crate::state::{KEYCATCH_CONSOLE, KEYCATCH_UI};

fn draw(op: i32) -> bool {
    op == EntryOp::DrawActiveFrame.code()
}

#[test]
fn print_trap_reaches_the_console() {
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            let text = stage_str(memory, 0, "module says hello");
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = text;
            host.syscall(memory, HostOp::Print.code(), &words)?;
        }
        Ok(0)
    });
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert!(session
        .core
        .console
        .log_lines()
        .iter()
        .any(|line| line == "module says hello"));
}

#[test]
fn unknown_trap_numbers_are_never_ignored() {
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            host.syscall(memory, 9_999, &[0; MAX_TRAP_ARGS])?;
        }
        Ok(0)
    });
    session.start_client_module().unwrap();

    let err = session.render_frame(0).unwrap_err();
    assert!(matches!(err, HostError::DropSession { .. }));
    assert_eq!(
        session
            .registry
            .call_depth(skirmish_module_abi::ModuleRole::GameClient),
        0,
    );
}

#[test]
fn error_trap_carries_the_module_reason() {
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            let text = stage_str(memory, 0, "shader not found");
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = text;
            host.syscall(memory, HostOp::Error.code(), &words)?;
        }
        Ok(0)
    });
    session.start_client_module().unwrap();

    match session.render_frame(0).unwrap_err() {
        HostError::DropSession { reason } => assert_eq!(reason, "shader not found"),
        other => panic!("unexpected error class: {other:?}"),
    }
}

#[test]
fn protected_cvars_ignore_module_sets() {
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            let name = stage_str(memory, 0, "fs_game");
            let value = stage_str(memory, 1, "evil");
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = name;
            words[1] = value;
            host.syscall(memory, HostOp::CvarSet.code(), &words)?;
        }
        Ok(0)
    });
    session.core.cvars.register("fs_game", "base", CVAR_PROTECTED);
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert_eq!(session.core.cvars.string("fs_game"), "base");
}

#[test]
fn cvar_views_register_and_refresh() {
    let views: Rc<RefCell<Vec<CvarView>>> = Rc::new(RefCell::new(Vec::new()));
    let captured = views.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if !draw(op) {
            return Ok(0);
        }
        let mut captured = captured.borrow_mut();
        if captured.is_empty() {
            let dest = memory.base() as i32 + 8192;
            let name = stage_str(memory, 0, "cg_fov");
            let default_value = stage_str(memory, 1, "90");
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = dest;
            words[1] = name;
            words[2] = default_value;
            words[3] = CVAR_ARCHIVE as i32;
            host.syscall(memory, HostOp::CvarRegister.code(), &words)?;
            captured.push(unstage_record(memory, dest));
        } else {
            let view = captured[0].clone();
            let staged = stage_record(memory, 40, &view);
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = staged;
            host.syscall(memory, HostOp::CvarUpdate.code(), &words)?;
            captured.push(unstage_record(memory, staged));
        }
        Ok(0)
    });
    session.start_client_module().unwrap();

    session.render_frame(0).unwrap();
    {
        let views = views.borrow();
        assert_ne!(views[0].handle, 0);
        assert_eq!(views[0].integer, 90);
    }

    session.core.cvars.set("cg_fov", "110");
    session.render_frame(0).unwrap();
    let views = views.borrow();
    assert_eq!(views[1].integer, 110);
    assert_eq!(views[1].handle, views[0].handle);
    assert!(views[1].modification_count > views[0].modification_count);
}

#[test]
fn game_state_view_marshals_occupied_slots() {
    let seen: Rc<RefCell<Option<GameStateView>>> = Rc::new(RefCell::new(None));
    let captured = seen.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let dest = memory.base() as i32 + 8192;
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = dest;
            words[1] = 8192;
            host.syscall(memory, HostOp::GetGameState.code(), &words)?;
            *captured.borrow_mut() = Some(unstage_record(memory, dest));
        }
        Ok(0)
    });
    session.core.game_state.set(2, "two").unwrap();
    session.core.game_state.set(9, "nine").unwrap();
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    let view = seen.borrow_mut().take().unwrap();
    assert_eq!(view.strings.len(), 2);
    assert_eq!(view.strings[0].value, "two");
    assert_eq!(view.strings[1].index, 9);
}

#[test]
fn snapshot_trap_reports_retrievability() {
    let results: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let captured = results.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let dest = memory.base() as i32 + 8192;
            for number in [40, 3] {
                let mut words = [0i32; MAX_TRAP_ARGS];
                words[0] = number;
                words[1] = dest;
                words[2] = 16384;
                let got = host.syscall(memory, HostOp::GetSnapshot.code(), &words)?;
                captured.borrow_mut().push(got);
            }
        }
        Ok(0)
    });
    for n in 0..=40 {
        session.core.snapshots.record(
            StoredSnapshot {
                message_num: n,
                server_time: i64::from(n) * 50,
                ..StoredSnapshot::default()
            },
            &[],
        );
    }
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert_eq!(*results.borrow(), vec![1, 0]);
}

#[test]
fn key_catcher_set_preserves_the_console_bit() {
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = KEYCATCH_UI;
            host.syscall(memory, HostOp::KeySetCatcher.code(), &words)?;
        }
        Ok(0)
    });
    session.core.keys.catcher = KEYCATCH_CONSOLE;
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert_eq!(session.core.keys.catcher, KEYCATCH_UI | KEYCATCH_CONSOLE);
}

#[test]
fn get_value_probes_extension_traps() {
    let answers: Rc<RefCell<Vec<(i32, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let captured = answers.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let dest = memory.base() as i32 + 8192;
            for key in ["trap_IsRecordingDemo", "trap_Unknown"] {
                let key_handle = stage_str(memory, 0, key);
                let mut words = [0i32; MAX_TRAP_ARGS];
                words[0] = dest;
                words[1] = 64;
                words[2] = key_handle;
                let found = host.syscall(memory, HostOp::GetValue.code(), &words)?;
                let text = if found != 0 {
                    unstage_str(memory, dest)
                } else {
                    String::new()
                };
                captured.borrow_mut().push((found, text));
            }
        }
        Ok(0)
    });
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    let answers = answers.borrow();
    assert_eq!(answers[0].0, 1);
    assert_eq!(answers[0].1, HostOp::IsRecordingDemo.code().to_string());
    assert_eq!(answers[1], (0, String::new()));
}

struct CapsuleSpy {
    flags: Rc<RefCell<Vec<bool>>>,
}

impl CollisionService for CapsuleSpy {
    fn load_map(&mut self, name: &str) {
        NullCollision.load_map(name)
    }
    fn inline_model_count(&self) -> i32 {
        0
    }
    fn inline_model(&self, _index: i32) -> i32 {
        0
    }
    fn temp_model(&mut self, _mins: [f32; 3], _maxs: [f32; 3], capsule: bool) -> i32 {
        self.flags.borrow_mut().push(capsule);
        0
    }
    fn point_contents(&self, _point: [f32; 3], _model: i32) -> i32 {
        0
    }
    fn transformed_point_contents(
        &self,
        _point: [f32; 3],
        _model: i32,
        _origin: [f32; 3],
        _angles: [f32; 3],
    ) -> i32 {
        0
    }
    fn trace(
        &self,
        _start: [f32; 3],
        end: [f32; 3],
        _mins: [f32; 3],
        _maxs: [f32; 3],
        _model: i32,
        _contents_mask: i32,
        capsule: bool,
    ) -> TraceResultView {
        self.flags.borrow_mut().push(capsule);
        TraceResultView {
            fraction: 1.0,
            end_pos: end,
            ..TraceResultView::default()
        }
    }
    fn transformed_trace(
        &self,
        start: [f32; 3],
        end: [f32; 3],
        mins: [f32; 3],
        maxs: [f32; 3],
        model: i32,
        contents_mask: i32,
        _origin: [f32; 3],
        _angles: [f32; 3],
        capsule: bool,
    ) -> TraceResultView {
        self.trace(start, end, mins, maxs, model, contents_mask, capsule)
    }
}

#[test]
fn capsule_and_box_traces_share_one_implementation() {
    let flags: Rc<RefCell<Vec<bool>>> = Rc::new(RefCell::new(Vec::new()));
    let spy_flags = flags.clone();
    let result: Rc<RefCell<Option<TraceResultView>>> = Rc::new(RefCell::new(None));
    let captured = result.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let dest = memory.base() as i32 + 8192;
            memory.write_vec3(memory.base() as i32, [0.0, 0.0, 0.0]).unwrap();
            memory
                .write_vec3(memory.base() as i32 + 12, [64.0, 0.0, 0.0])
                .unwrap();
            for trap in [
                HostOp::CollisionBoxTrace,
                HostOp::CollisionCapsuleTrace,
            ] {
                let mut words = [0i32; MAX_TRAP_ARGS];
                words[0] = dest;
                words[1] = memory.base() as i32;
                words[2] = memory.base() as i32 + 12;
                host.syscall(memory, trap.code(), &words)?;
            }
            *captured.borrow_mut() = Some(unstage_record(memory, dest));
        }
        Ok(0)
    });
    session.core.services.collision = Box::new(CapsuleSpy { flags: spy_flags });
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert_eq!(*flags.borrow(), vec![false, true]);
    let trace = result.borrow_mut().take().unwrap();
    assert_eq!(trace.fraction, 1.0);
    assert_eq!(trace.end_pos, [64.0, 0.0, 0.0]);
}

#[test]
fn update_screen_repaints_through_a_live_interface_module() {
    let ui_draws: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
    let counted = ui_draws.clone();
    let mut session = session_with_module(|host, memory, op, _args| {
        if draw(op) {
            host.syscall(memory, HostOp::UpdateScreen.code(), &[0; MAX_TRAP_ARGS])?;
        }
        Ok(0)
    });
    register_ui(&mut session, counted);
    session.start_client_module().unwrap();

    session.render_frame(0).unwrap();
    assert_eq!(*ui_draws.borrow(), 1);
    assert_eq!(
        session
            .registry
            .call_depth(skirmish_module_abi::ModuleRole::Ui),
        0,
    );
}

fn register_ui(session: &mut crate::session::Session, counter: Rc<RefCell<u32>>) {
    super::register_ui_module(session, move |_host, _memory, op, _args| {
        if draw(op) {
            *counter.borrow_mut() += 1;
        }
        Ok(0)
    });
    skirmish_module_host::create_module(
        &mut session.registry,
        skirmish_module_abi::ModuleRole::Ui,
        skirmish_module_abi::BackendKind::Native,
        &session.catalog,
        &session.images,
        &session.limits,
    )
    .unwrap();
}

#[test]
fn math_traps_reinterpret_bit_patterns() {
    let outputs: Rc<RefCell<Vec<f32>>> = Rc::new(RefCell::new(Vec::new()));
    let captured = outputs.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let mut words = [0i32; MAX_TRAP_ARGS];
            words[0] = f32_to_word(2.7);
            let floor = host.syscall(memory, HostOp::MathFloor.code(), &words)?;
            let ceil = host.syscall(memory, HostOp::MathCeil.code(), &words)?;
            words[0] = f32_to_word(2.0);
            let acos = host.syscall(memory, HostOp::MathArcCos.code(), &words)?;
            let mut captured = captured.borrow_mut();
            captured.push(word_to_f32(floor));
            captured.push(word_to_f32(ceil));
            captured.push(word_to_f32(acos));
        }
        Ok(0)
    });
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    let outputs = outputs.borrow();
    assert_eq!(outputs[0], 2.0);
    assert_eq!(outputs[1], 3.0);
    // Out-of-domain input pins to the endpoint instead of NaN.
    assert_eq!(outputs[2], 0.0);
}

#[test]
fn tokenized_command_state_is_visible_through_the_arg_traps() {
    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let captured = seen.clone();
    let mut session = session_with_module(move |host, memory, op, _args| {
        if draw(op) {
            let argc = host.syscall(memory, HostOp::CmdArgc.code(), &[0; MAX_TRAP_ARGS])?;
            let dest = memory.base() as i32 + 8192;
            for index in 0..argc {
                let mut words = [0i32; MAX_TRAP_ARGS];
                words[0] = index;
                words[1] = dest;
                words[2] = 256;
                host.syscall(memory, HostOp::CmdArgv.code(), &words)?;
                captured.borrow_mut().push(unstage_str(memory, dest));
            }
        }
        Ok(0)
    });
    session
        .core
        .console
        .tokenize_current("follow \"the leader\"");
    session.start_client_module().unwrap();
    session.render_frame(0).unwrap();

    assert_eq!(*seen.borrow(), vec!["follow", "the leader"]);
}
