//! Numbered-trap dispatcher.
//!
//! Every trap a module raises lands here. Dispatch is a dense table of
//! handler functions indexed by operation code, validated complete against
//! the declared enumeration when the dispatcher is built. Handlers marshal
//! arguments through the caller's memory view, call into host state or a
//! black-box service, and return a single result word.
//!
//! Structured records cross the boundary as length-prefixed CBOR; vector
//! triples as packed little-endian floats; strings NUL-terminated.

use serde::de::DeserializeOwned;
use serde::Serialize;
use skirmish_module_abi::ops::GET_VALUE_KEYS;
use skirmish_module_abi::views::{
    MarkFragmentsRequest, SceneDefView, SceneEntityView, CvarView,
};
use skirmish_module_abi::{
    f32_to_word, word_to_f32, EntryOp, HostError, HostOp, ModuleRole, MAX_TRAP_ARGS,
};
use skirmish_module_host::{call_module, ModuleCaller, ModuleMemory, ModuleRegistry};

use crate::session::ClientSyscalls;
use crate::state::{ClientCore, KEYCATCH_CONSOLE};

/// Longest string a trap will scan out of module memory.
const MAX_TRAP_STRING: u32 = 8192;
/// Ceiling for one staged record.
const MAX_STAGED_BYTES: usize = 64 * 1024;

/// The trap's argument words, after the trap number.
#[derive(Debug, Clone, Copy)]
pub struct TrapArgs {
    words: [i32; MAX_TRAP_ARGS],
}

impl TrapArgs {
    pub fn new(words: [i32; MAX_TRAP_ARGS]) -> Self {
        Self { words }
    }

    pub fn word(&self, index: usize) -> i32 {
        self.words[index]
    }

    pub fn float(&self, index: usize) -> f32 {
        word_to_f32(self.words[index])
    }
}

pub struct TrapContext<'a> {
    pub core: &'a mut ClientCore,
    pub registry: &'a mut ModuleRegistry,
    pub memory: &'a mut ModuleMemory,
    pub caller: ModuleCaller,
    pub args: TrapArgs,
    pub dispatcher: &'a Dispatcher,
}

impl TrapContext<'_> {
    fn read_str(&self, index: usize) -> Result<String, HostError> {
        self.memory.read_str(self.args.word(index), MAX_TRAP_STRING)
    }

    /// Null vector handles mean the zero vector, mirroring "no bounds".
    fn read_vec3(&self, index: usize) -> Result<[f32; 3], HostError> {
        let handle = self.args.word(index);
        if handle == 0 {
            return Ok([0.0; 3]);
        }
        self.memory.read_vec3(handle)
    }

    fn read_opt_vec3(&self, index: usize) -> Result<Option<[f32; 3]>, HostError> {
        let handle = self.args.word(index);
        if handle == 0 {
            return Ok(None);
        }
        self.memory.read_vec3(handle).map(Some)
    }

    fn read_axis(&self, index: usize) -> Result<[[f32; 3]; 3], HostError> {
        let handle = self.args.word(index);
        Ok([
            self.memory.read_vec3(handle)?,
            self.memory.read_vec3(handle + 12)?,
            self.memory.read_vec3(handle + 24)?,
        ])
    }

    /// Decode a record the module staged (length-prefixed CBOR).
    fn read_staged<T: DeserializeOwned>(&self, index: usize) -> Result<T, HostError> {
        let handle = self.args.word(index);
        let len = self.memory.read_i32(handle)?;
        if len < 0 || len as usize > MAX_STAGED_BYTES {
            return Err(HostError::drop_session(format!(
                "staged record length {len} out of contract",
            )));
        }
        let bytes = self.memory.read(handle + 4, len as u32)?;
        serde_cbor::from_slice(bytes).map_err(|err| {
            HostError::drop_session(format!("staged record decode failed: {err}"))
        })
    }

    /// Encode a record into module memory at `handle`, length-prefixed.
    fn write_staged<T: Serialize>(&mut self, handle: i32, value: &T) -> Result<(), HostError> {
        let bytes = serde_cbor::to_vec(value).map_err(|err| {
            HostError::drop_session(format!("record encode failed: {err}"))
        })?;
        self.memory.write_i32(handle, bytes.len() as i32)?;
        self.memory.write(handle + 4, &bytes)
    }

    /// Encode into a module-declared `(dest, dest_len)` buffer pair.
    fn write_view<T: Serialize>(
        &mut self,
        handle_index: usize,
        cap_index: usize,
        value: &T,
    ) -> Result<(), HostError> {
        let handle = self.args.word(handle_index);
        let cap = self.args.word(cap_index);
        let bytes = serde_cbor::to_vec(value).map_err(|err| {
            HostError::drop_session(format!("record encode failed: {err}"))
        })?;
        if cap < 0 || bytes.len() + 4 > cap as usize {
            return Err(HostError::drop_session(format!(
                "marshalled record of {} bytes exceeds destination of {cap}",
                bytes.len() + 4,
            )));
        }
        self.memory.write_i32(handle, bytes.len() as i32)?;
        self.memory.write(handle + 4, &bytes)
    }

    fn write_str(&mut self, handle_index: usize, cap_index: usize, text: &str) -> Result<u32, HostError> {
        let handle = self.args.word(handle_index);
        let cap = self.args.word(cap_index).max(0) as u32;
        self.memory.write_str(handle, cap, text)
    }
}

type Handler = fn(&mut TrapContext<'_>) -> Result<i32, HostError>;

pub struct Dispatcher {
    table: Vec<Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Build the handler table and validate it dense and complete against
    /// the declared operation enumeration.
    pub fn new() -> Self {
        let mut table: Vec<Handler> = Vec::with_capacity(HostOp::COUNT);
        for (index, op) in HostOp::ALL.iter().enumerate() {
            assert_eq!(op.code() as usize, index, "trap table must stay dense");
            table.push(handler_for(*op));
        }
        Self { table }
    }

    pub fn dispatch(
        &self,
        core: &mut ClientCore,
        registry: &mut ModuleRegistry,
        memory: &mut ModuleMemory,
        caller: ModuleCaller,
        trap: i32,
        args: &[i32; MAX_TRAP_ARGS],
    ) -> Result<i32, HostError> {
        let Some(op) = HostOp::from_code(trap) else {
            // The module is presumed compromised or version-mismatched.
            return Err(HostError::drop_session(format!(
                "bad system trap {trap} from {}",
                caller.role.name(),
            )));
        };
        let handler = self.table[op.code() as usize];
        let mut ctx = TrapContext {
            core,
            registry,
            memory,
            caller,
            args: TrapArgs::new(*args),
            dispatcher: self,
        };
        handler(&mut ctx)
    }
}

fn handler_for(op: HostOp) -> Handler {
    match op {
        HostOp::Print => trap_print,
        HostOp::Error => trap_error,
        HostOp::Milliseconds => trap_milliseconds,
        HostOp::CvarRegister => trap_cvar_register,
        HostOp::CvarUpdate => trap_cvar_update,
        HostOp::CvarSet => trap_cvar_set,
        HostOp::CvarStringBuffer => trap_cvar_string_buffer,
        HostOp::CmdArgc => trap_cmd_argc,
        HostOp::CmdArgv => trap_cmd_argv,
        HostOp::CmdArgs => trap_cmd_args,
        HostOp::FsOpen => trap_fs_open,
        HostOp::FsRead => trap_fs_read,
        HostOp::FsWrite => trap_fs_write,
        HostOp::FsClose => trap_fs_close,
        HostOp::FsSeek => trap_fs_seek,
        HostOp::SendConsoleCommand => trap_send_console_command,
        HostOp::AddCommand => trap_add_command,
        HostOp::RemoveCommand => trap_remove_command,
        HostOp::SendClientCommand => trap_send_client_command,
        HostOp::UpdateScreen => trap_update_screen,
        HostOp::CollisionLoadMap => trap_collision_load_map,
        HostOp::CollisionInlineModelCount => trap_collision_inline_model_count,
        HostOp::CollisionInlineModel => trap_collision_inline_model,
        HostOp::CollisionTempBoxModel => trap_collision_temp_box_model,
        HostOp::CollisionTempCapsuleModel => trap_collision_temp_capsule_model,
        HostOp::CollisionPointContents => trap_collision_point_contents,
        HostOp::CollisionTransformedPointContents => trap_collision_transformed_point_contents,
        HostOp::CollisionBoxTrace => trap_collision_box_trace,
        HostOp::CollisionCapsuleTrace => trap_collision_capsule_trace,
        HostOp::CollisionTransformedBoxTrace => trap_collision_transformed_box_trace,
        HostOp::CollisionTransformedCapsuleTrace => trap_collision_transformed_capsule_trace,
        HostOp::MarkFragments => trap_mark_fragments,
        HostOp::SoundStart => trap_sound_start,
        HostOp::SoundStartLocal => trap_sound_start_local,
        HostOp::SoundClearLoops => trap_sound_clear_loops,
        HostOp::SoundAddLoop => trap_sound_add_loop,
        HostOp::SoundAddRealLoop => trap_sound_add_real_loop,
        HostOp::SoundStopLoop => trap_sound_stop_loop,
        HostOp::SoundUpdateEntity => trap_sound_update_entity,
        HostOp::SoundRespatialize => trap_sound_respatialize,
        HostOp::SoundRegister => trap_sound_register,
        HostOp::SoundStartBackgroundTrack => trap_sound_start_background,
        HostOp::RenderLoadWorld => trap_render_load_world,
        HostOp::RenderRegisterModel => trap_render_register_model,
        HostOp::RenderRegisterSkin => trap_render_register_skin,
        HostOp::RenderRegisterShader => trap_render_register_shader,
        HostOp::RenderRegisterShaderNoMip => trap_render_register_shader_no_mip,
        HostOp::RenderRegisterFont => trap_render_register_font,
        HostOp::RenderClearScene => trap_render_clear_scene,
        HostOp::RenderAddEntity => trap_render_add_entity,
        HostOp::RenderAddPoly => trap_render_add_poly,
        HostOp::RenderAddPolys => trap_render_add_polys,
        HostOp::RenderLightForPoint => trap_render_light_for_point,
        HostOp::RenderAddLight => trap_render_add_light,
        HostOp::RenderAddAdditiveLight => trap_render_add_additive_light,
        HostOp::RenderScene => trap_render_scene,
        HostOp::RenderSetColor => trap_render_set_color,
        HostOp::RenderDrawStretchPic => trap_render_draw_stretch_pic,
        HostOp::RenderModelBounds => trap_render_model_bounds,
        HostOp::RenderLerpTag => trap_render_lerp_tag,
        HostOp::GetGlconfig => trap_get_glconfig,
        HostOp::GetGameState => trap_get_game_state,
        HostOp::GetCurrentSnapshotNumber => trap_get_current_snapshot_number,
        HostOp::GetSnapshot => trap_get_snapshot,
        HostOp::GetServerCommand => trap_get_server_command,
        HostOp::GetCurrentCmdNumber => trap_get_current_cmd_number,
        HostOp::GetUserCmd => trap_get_user_cmd,
        HostOp::SetUserCmdValue => trap_set_user_cmd_value,
        HostOp::MemoryRemaining => trap_memory_remaining,
        HostOp::KeyIsDown => trap_key_is_down,
        HostOp::KeyGetCatcher => trap_key_get_catcher,
        HostOp::KeySetCatcher => trap_key_set_catcher,
        HostOp::KeyGetKey => trap_key_get_key,
        HostOp::MathFloor => trap_math_floor,
        HostOp::MathCeil => trap_math_ceil,
        HostOp::MathArcCos => trap_math_arc_cos,
        HostOp::TestPrintInt => trap_test_print_int,
        HostOp::TestPrintFloat => trap_test_print_float,
        HostOp::RealTime => trap_real_time,
        HostOp::SnapVector => trap_snap_vector,
        HostOp::SoundStopBackgroundTrack => trap_sound_stop_background,
        HostOp::RenderRemapShader => trap_render_remap_shader,
        HostOp::GetEntityToken => trap_get_entity_token,
        HostOp::RenderInPvs => trap_render_in_pvs,
        HostOp::RenderAddEntityExt => trap_render_add_entity_ext,
        HostOp::RenderAddLinearLight => trap_render_add_linear_light,
        HostOp::RenderForceFixedLightMode => trap_render_force_fixed_light_mode,
        HostOp::IsRecordingDemo => trap_is_recording_demo,
        HostOp::GetValue => trap_get_value,
    }
}

// --- console and timing -------------------------------------------------

fn trap_print(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = ctx.read_str(0)?;
    ctx.core.console.print(text);
    Ok(0)
}

fn trap_error(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = ctx.read_str(0)?;
    Err(HostError::drop_session(text))
}

fn trap_milliseconds(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.realtime as i32)
}

// --- cvars --------------------------------------------------------------

fn trap_cvar_register(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(1)?;
    let default_value = ctx.read_str(2)?;
    let flags = ctx.args.word(3) as u32;
    let view =
        ctx.core
            .cvars
            .register_for_module(&name, &default_value, flags, ctx.caller.privileged);
    let dest = ctx.args.word(0);
    if dest != 0 {
        ctx.write_staged(dest, &view)?;
    }
    Ok(0)
}

fn trap_cvar_update(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let view: CvarView = ctx.read_staged(0)?;
    if let Some(fresh) = ctx.core.cvars.update_view(&view) {
        ctx.write_staged(ctx.args.word(0), &fresh)?;
    }
    Ok(0)
}

fn trap_cvar_set(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    let value = ctx.read_str(1)?;
    ctx.core.cvars.set_safe(&name, &value);
    Ok(0)
}

fn trap_cvar_string_buffer(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    let value = ctx
        .core
        .cvars
        .string_for_module(&name, ctx.caller.privileged);
    ctx.write_str(1, 2, &value)?;
    Ok(0)
}

// --- tokenized command access -------------------------------------------

fn trap_cmd_argc(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.console.argc() as i32)
}

fn trap_cmd_argv(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let arg = ctx.core.console.argv(ctx.args.word(0).max(0) as usize).to_string();
    ctx.write_str(1, 2, &arg)?;
    Ok(0)
}

fn trap_cmd_args(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let args = ctx.core.console.args_from(1);
    ctx.write_str(0, 1, &args)?;
    Ok(0)
}

// --- virtual files ------------------------------------------------------

fn trap_fs_open(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let path = ctx.read_str(0)?;
    let mode = ctx.args.word(2);
    let (handle, length) = ctx
        .core
        .services
        .vfs
        .open(ctx.caller.role, &path, mode);
    let handle_out = ctx.args.word(1);
    if handle_out != 0 {
        ctx.memory.write_i32(handle_out, handle)?;
    }
    Ok(length)
}

fn trap_fs_read(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let len = ctx.args.word(1).max(0) as usize;
    let handle = ctx.args.word(2);
    let data = ctx.core.services.vfs.read(handle, len);
    ctx.memory.write(ctx.args.word(0), &data)?;
    Ok(data.len() as i32)
}

fn trap_fs_write(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let len = ctx.args.word(1).max(0) as u32;
    let bytes = ctx.memory.read(ctx.args.word(0), len)?.to_vec();
    let handle = ctx.args.word(2);
    Ok(ctx.core.services.vfs.write(handle, &bytes))
}

fn trap_fs_close(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.vfs.close(ctx.args.word(0));
    Ok(0)
}

fn trap_fs_seek(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.services.vfs.seek(
        ctx.args.word(0),
        ctx.args.word(1),
        ctx.args.word(2),
    ))
}

// --- console commands ---------------------------------------------------

fn trap_send_console_command(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = ctx.read_str(0)?;
    ctx.core.console.queue_command(text);
    Ok(0)
}

fn trap_add_command(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    ctx.core
        .console
        .register_module_command(name, ctx.caller.role);
    Ok(0)
}

fn trap_remove_command(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    ctx.core.console.remove_module_command(&name);
    Ok(0)
}

fn trap_send_client_command(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = ctx.read_str(0)?;
    ctx.core.pending_reliable.push(text);
    Ok(0)
}

fn trap_update_screen(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    // Used during lengthy loads. Repaint only: pumping the event loop here
    // could tear down the module that is still on the call stack. A live
    // interface module gets to draw the intermediate frame.
    if let Some(ui) = ctx.registry.live_handle(ModuleRole::Ui) {
        if ui.role() != ctx.caller.role {
            let frame_args = [ctx.core.realtime as i32, 0, ctx.core.demo.playing as i32];
            let mut sink = ClientSyscalls {
                core: &mut *ctx.core,
                dispatcher: ctx.dispatcher,
            };
            call_module(
                &mut *ctx.registry,
                &mut sink,
                Some(ui),
                EntryOp::DrawActiveFrame,
                &frame_args,
            )?;
        }
    }
    ctx.core.services.screen.update_screen();
    Ok(0)
}

// --- collision ----------------------------------------------------------

fn trap_collision_load_map(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    ctx.core.services.collision.load_map(&name);
    Ok(0)
}

fn trap_collision_inline_model_count(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.services.collision.inline_model_count())
}

fn trap_collision_inline_model(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.services.collision.inline_model(ctx.args.word(0)))
}

fn temp_model(ctx: &mut TrapContext<'_>, capsule: bool) -> Result<i32, HostError> {
    let mins = ctx.read_vec3(0)?;
    let maxs = ctx.read_vec3(1)?;
    Ok(ctx.core.services.collision.temp_model(mins, maxs, capsule))
}

fn trap_collision_temp_box_model(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    temp_model(ctx, false)
}

fn trap_collision_temp_capsule_model(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    temp_model(ctx, true)
}

fn trap_collision_point_contents(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let point = ctx.read_vec3(0)?;
    Ok(ctx
        .core
        .services
        .collision
        .point_contents(point, ctx.args.word(1)))
}

fn trap_collision_transformed_point_contents(
    ctx: &mut TrapContext<'_>,
) -> Result<i32, HostError> {
    let point = ctx.read_vec3(0)?;
    let origin = ctx.read_vec3(2)?;
    let angles = ctx.read_vec3(3)?;
    Ok(ctx.core.services.collision.transformed_point_contents(
        point,
        ctx.args.word(1),
        origin,
        angles,
    ))
}

fn plain_trace(ctx: &mut TrapContext<'_>, capsule: bool) -> Result<i32, HostError> {
    let start = ctx.read_vec3(1)?;
    let end = ctx.read_vec3(2)?;
    let mins = ctx.read_vec3(3)?;
    let maxs = ctx.read_vec3(4)?;
    let result = ctx.core.services.collision.trace(
        start,
        end,
        mins,
        maxs,
        ctx.args.word(5),
        ctx.args.word(6),
        capsule,
    );
    ctx.write_staged(ctx.args.word(0), &result)?;
    Ok(0)
}

fn trap_collision_box_trace(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    plain_trace(ctx, false)
}

fn trap_collision_capsule_trace(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    plain_trace(ctx, true)
}

fn transformed_trace(ctx: &mut TrapContext<'_>, capsule: bool) -> Result<i32, HostError> {
    let start = ctx.read_vec3(1)?;
    let end = ctx.read_vec3(2)?;
    let mins = ctx.read_vec3(3)?;
    let maxs = ctx.read_vec3(4)?;
    let origin = ctx.read_vec3(7)?;
    let angles = ctx.read_vec3(8)?;
    let result = ctx.core.services.collision.transformed_trace(
        start,
        end,
        mins,
        maxs,
        ctx.args.word(5),
        ctx.args.word(6),
        origin,
        angles,
        capsule,
    );
    ctx.write_staged(ctx.args.word(0), &result)?;
    Ok(0)
}

fn trap_collision_transformed_box_trace(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    transformed_trace(ctx, false)
}

fn trap_collision_transformed_capsule_trace(
    ctx: &mut TrapContext<'_>,
) -> Result<i32, HostError> {
    transformed_trace(ctx, true)
}

fn trap_mark_fragments(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let request: MarkFragmentsRequest = ctx.read_staged(0)?;
    let fragments = ctx.core.services.render.mark_fragments(&request);
    ctx.write_view(1, 2, &fragments)?;
    Ok(fragments.len() as i32)
}

// --- sound --------------------------------------------------------------

fn trap_sound_start(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let origin = ctx.read_opt_vec3(0)?;
    ctx.core.services.sound.start(
        origin,
        ctx.args.word(1),
        ctx.args.word(2),
        ctx.args.word(3),
    );
    Ok(0)
}

fn trap_sound_start_local(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core
        .services
        .sound
        .start_local(ctx.args.word(0), ctx.args.word(1));
    Ok(0)
}

fn trap_sound_clear_loops(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.sound.clear_loops(ctx.args.word(0) != 0);
    Ok(0)
}

fn add_loop(ctx: &mut TrapContext<'_>, real: bool) -> Result<i32, HostError> {
    let origin = ctx.read_vec3(1)?;
    let velocity = ctx.read_vec3(2)?;
    ctx.core.services.sound.add_loop(
        ctx.args.word(0),
        origin,
        velocity,
        ctx.args.word(3),
        real,
    );
    Ok(0)
}

fn trap_sound_add_loop(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_loop(ctx, false)
}

fn trap_sound_add_real_loop(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_loop(ctx, true)
}

fn trap_sound_stop_loop(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.sound.stop_loop(ctx.args.word(0));
    Ok(0)
}

fn trap_sound_update_entity(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let origin = ctx.read_vec3(1)?;
    ctx.core
        .services
        .sound
        .update_entity(ctx.args.word(0), origin);
    Ok(0)
}

fn trap_sound_respatialize(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let origin = ctx.read_vec3(1)?;
    let axis = ctx.read_axis(2)?;
    ctx.core.services.sound.respatialize(
        ctx.args.word(0),
        origin,
        axis,
        ctx.args.word(3) != 0,
    );
    Ok(0)
}

fn trap_sound_register(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    Ok(ctx
        .core
        .services
        .sound
        .register(&name, ctx.args.word(1) != 0))
}

fn trap_sound_start_background(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let intro = ctx.read_str(0)?;
    let looped = ctx.read_str(1)?;
    ctx.core.services.sound.start_background(&intro, &looped);
    Ok(0)
}

fn trap_sound_stop_background(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.sound.stop_background();
    Ok(0)
}

// --- renderer -----------------------------------------------------------

fn trap_render_load_world(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    ctx.core.services.render.load_world(&name);
    Ok(0)
}

fn trap_render_register_model(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    Ok(ctx.core.services.render.register_model(&name))
}

fn trap_render_register_skin(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    Ok(ctx.core.services.render.register_skin(&name))
}

fn trap_render_register_shader(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    Ok(ctx.core.services.render.register_shader(&name, true))
}

fn trap_render_register_shader_no_mip(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    Ok(ctx.core.services.render.register_shader(&name, false))
}

fn trap_render_register_font(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(0)?;
    let font = ctx
        .core
        .services
        .render
        .register_font(&name, ctx.args.word(1));
    ctx.write_staged(ctx.args.word(2), &font)?;
    Ok(0)
}

fn trap_render_clear_scene(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.render.clear_scene();
    Ok(0)
}

fn add_entity(ctx: &mut TrapContext<'_>, extended: bool) -> Result<i32, HostError> {
    let entity: SceneEntityView = ctx.read_staged(0)?;
    ctx.core.services.render.add_entity(&entity, extended);
    Ok(0)
}

fn trap_render_add_entity(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_entity(ctx, false)
}

fn trap_render_add_entity_ext(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_entity(ctx, true)
}

fn read_poly_verts(
    ctx: &TrapContext<'_>,
    handle: i32,
    count: i64,
) -> Result<Vec<[f32; 3]>, HostError> {
    if count < 0 {
        return Err(HostError::drop_session("negative poly vertex count"));
    }
    (0..count)
        .map(|i| ctx.memory.read_vec3(handle + (i as i32) * 12))
        .collect()
}

fn trap_render_add_poly(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let verts = read_poly_verts(ctx, ctx.args.word(2), ctx.args.word(1) as i64)?;
    ctx.core
        .services
        .render
        .add_polys(ctx.args.word(0), &verts, 1);
    Ok(0)
}

fn trap_render_add_polys(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let per_poly = ctx.args.word(1) as i64;
    let polys = ctx.args.word(3) as i64;
    let verts = read_poly_verts(ctx, ctx.args.word(2), per_poly * polys)?;
    ctx.core
        .services
        .render
        .add_polys(ctx.args.word(0), &verts, polys as i32);
    Ok(0)
}

fn trap_render_light_for_point(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let point = ctx.read_vec3(0)?;
    match ctx.core.services.render.light_for_point(point) {
        Some((ambient, directed, direction)) => {
            ctx.memory.write_vec3(ctx.args.word(1), ambient)?;
            ctx.memory.write_vec3(ctx.args.word(2), directed)?;
            ctx.memory.write_vec3(ctx.args.word(3), direction)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

fn add_light(ctx: &mut TrapContext<'_>, additive: bool) -> Result<i32, HostError> {
    let origin = ctx.read_vec3(0)?;
    let rgb = [ctx.args.float(2), ctx.args.float(3), ctx.args.float(4)];
    ctx.core
        .services
        .render
        .add_light(origin, ctx.args.float(1), rgb, additive);
    Ok(0)
}

fn trap_render_add_light(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_light(ctx, false)
}

fn trap_render_add_additive_light(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    add_light(ctx, true)
}

fn trap_render_add_linear_light(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let start = ctx.read_vec3(0)?;
    let end = ctx.read_vec3(1)?;
    let rgb = [ctx.args.float(3), ctx.args.float(4), ctx.args.float(5)];
    ctx.core
        .services
        .render
        .add_linear_light(start, end, ctx.args.float(2), rgb);
    Ok(0)
}

fn trap_render_scene(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let def: SceneDefView = ctx.read_staged(0)?;
    ctx.core.services.render.render_scene(&def);
    Ok(0)
}

fn trap_render_set_color(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let handle = ctx.args.word(0);
    let rgba = if handle == 0 {
        None
    } else {
        let bytes = ctx.memory.read(handle, 16)?;
        let mut rgba = [0.0f32; 4];
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            rgba[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(rgba)
    };
    ctx.core.services.render.set_color(rgba);
    Ok(0)
}

fn trap_render_draw_stretch_pic(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.services.render.draw_stretch_pic(
        ctx.args.float(0),
        ctx.args.float(1),
        ctx.args.float(2),
        ctx.args.float(3),
        ctx.args.float(4),
        ctx.args.float(5),
        ctx.args.float(6),
        ctx.args.float(7),
        ctx.args.word(8),
    );
    Ok(0)
}

fn trap_render_model_bounds(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let (mins, maxs) = ctx.core.services.render.model_bounds(ctx.args.word(0));
    ctx.memory.write_vec3(ctx.args.word(1), mins)?;
    ctx.memory.write_vec3(ctx.args.word(2), maxs)?;
    Ok(0)
}

fn trap_render_lerp_tag(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let name = ctx.read_str(5)?;
    let tag = ctx.core.services.render.lerp_tag(
        ctx.args.word(1),
        ctx.args.word(2),
        ctx.args.word(3),
        ctx.args.float(4),
        &name,
    );
    match tag {
        Some((origin, axis)) => {
            let out = ctx.args.word(0);
            ctx.memory.write_vec3(out, origin)?;
            for (i, row) in axis.iter().enumerate() {
                ctx.memory.write_vec3(out + 12 + (i as i32) * 12, *row)?;
            }
            Ok(1)
        }
        None => Ok(0),
    }
}

fn trap_render_remap_shader(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let old_shader = ctx.read_str(0)?;
    let new_shader = ctx.read_str(1)?;
    let offset = ctx.read_str(2)?;
    ctx.core
        .services
        .render
        .remap_shader(&old_shader, &new_shader, &offset);
    Ok(0)
}

fn trap_get_entity_token(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    match ctx.core.services.render.next_entity_token() {
        Some(token) => {
            ctx.write_str(0, 1, &token)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

fn trap_render_in_pvs(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let a = ctx.read_vec3(0)?;
    let b = ctx.read_vec3(1)?;
    Ok(ctx.core.services.render.in_pvs(a, b) as i32)
}

fn trap_render_force_fixed_light_mode(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core.cvars.register("r_lightMode", "1", 0);
    ctx.core.cvars.check_range("r_lightMode", 1, 2);
    Ok(0)
}

// --- host state fetches -------------------------------------------------

fn trap_get_glconfig(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let view = ctx.core.glconfig.clone();
    ctx.write_view(0, 1, &view)?;
    Ok(0)
}

fn trap_get_game_state(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let view = ctx.core.game_state.view();
    ctx.write_view(0, 1, &view)?;
    Ok(0)
}

fn trap_get_current_snapshot_number(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let (number, server_time) = ctx.core.snapshots.current_numbers();
    ctx.memory.write_i32(ctx.args.word(0), number)?;
    ctx.memory.write_i32(ctx.args.word(1), server_time as i32)?;
    Ok(0)
}

fn trap_get_snapshot(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    match ctx.core.snapshots.get(ctx.args.word(0))? {
        Some(view) => {
            ctx.write_view(1, 2, &view)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

fn trap_get_server_command(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.get_server_command(ctx.args.word(0))? as i32)
}

fn trap_get_current_cmd_number(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.user_cmds.current_number())
}

fn trap_get_user_cmd(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    match ctx.core.user_cmds.get(ctx.args.word(0))? {
        Some(cmd) => {
            ctx.write_view(1, 2, &cmd)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

fn trap_set_user_cmd_value(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    ctx.core
        .user_cmds
        .set_module_value(ctx.args.word(0), ctx.args.float(1));
    Ok(0)
}

fn trap_memory_remaining(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.memory_remaining)
}

// --- input --------------------------------------------------------------

fn trap_key_is_down(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.keys.down.contains(&ctx.args.word(0)) as i32)
}

fn trap_key_get_catcher(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.keys.catcher)
}

fn trap_key_set_catcher(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    // The module can never close the host console.
    ctx.core.keys.catcher = ctx.args.word(0) | (ctx.core.keys.catcher & KEYCATCH_CONSOLE);
    Ok(0)
}

fn trap_key_get_key(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let binding = ctx.read_str(0)?;
    Ok(ctx.core.keys.bindings.get(&binding).copied().unwrap_or(-1))
}

// --- math helpers -------------------------------------------------------

fn trap_math_floor(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(f32_to_word(ctx.args.float(0).floor()))
}

fn trap_math_ceil(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(f32_to_word(ctx.args.float(0).ceil()))
}

fn trap_math_arc_cos(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    // Domain-clamped: out-of-range inputs pin to the nearest endpoint
    // instead of producing NaN.
    let value = ctx.args.float(0);
    let result = if value > 1.0 {
        0.0
    } else if value < -1.0 {
        std::f32::consts::PI
    } else {
        value.acos()
    };
    Ok(f32_to_word(result))
}

fn trap_test_print_int(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = format!("{}", ctx.args.word(2));
    Ok(ctx.write_str(0, 1, &text)? as i32)
}

fn trap_test_print_float(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let text = format!("{:.6}", ctx.args.float(2));
    Ok(ctx.write_str(0, 1, &text)? as i32)
}

fn trap_real_time(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let view = skirmish_module_abi::views::RealTimeView {
        unix_seconds: ctx.core.real_time_seconds,
    };
    ctx.write_view(0, 1, &view)?;
    Ok(ctx.core.real_time_seconds as i32)
}

fn trap_snap_vector(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let handle = ctx.args.word(0);
    let v = ctx.memory.read_vec3(handle)?;
    ctx.memory.write_vec3(handle, v.map(f32::round))?;
    Ok(0)
}

// --- demo introspection and capability probe ----------------------------

fn trap_is_recording_demo(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    Ok(ctx.core.demo.recording as i32)
}

fn trap_get_value(ctx: &mut TrapContext<'_>) -> Result<i32, HostError> {
    let key = ctx.read_str(2)?;
    for (name, op) in GET_VALUE_KEYS {
        if key.eq_ignore_ascii_case(name) {
            ctx.write_str(0, 1, &op.code().to_string())?;
            return Ok(1);
        }
    }
    Ok(0)
}
