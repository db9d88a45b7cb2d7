//! Operation codes crossing the module boundary in both directions.
//!
//! `EntryOp` is the host-to-module direction; `HostOp` is the trap number a
//! module passes back through its bound syscall callable. Both enumerations
//! are dense and append-only: existing codes and their argument order never
//! change, new functionality is appended with new codes. Modules built
//! against an older table keep working; newer capabilities are discovered
//! through [`HostOp::GetValue`].

/// Host-to-module entry operations.
///
/// Every call uses the uniform `main_entry(op, a0, a1, a2)` convention;
/// operations needing more context read agreed-upon records from their own
/// memory rather than growing the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EntryOp {
    /// `(server_message_sequence, last_executed_command, client_num)`.
    Init = 0,
    Shutdown = 1,
    /// Claim query for the currently tokenized console command; nonzero
    /// result means the module handled it.
    ConsoleCommand = 2,
    /// `(server_time, stereo_view, demo_playback)`.
    DrawActiveFrame = 3,
}

impl EntryOp {
    pub fn code(self) -> i32 {
        self as i32
    }
}

macro_rules! host_ops {
    ( $( $(#[$meta:meta])* $name:ident = $code:literal, )+ ) => {
        /// Module-to-host trap numbers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum HostOp {
            $( $(#[$meta])* $name = $code, )+
        }

        impl HostOp {
            pub const ALL: &'static [HostOp] = &[ $( HostOp::$name, )+ ];
            pub const COUNT: usize = Self::ALL.len();

            pub fn code(self) -> i32 {
                self as i32
            }

            /// Dense decode; returns `None` for anything outside the table.
            pub fn from_code(code: i32) -> Option<HostOp> {
                if code < 0 {
                    return None;
                }
                Self::ALL.get(code as usize).copied()
            }
        }
    };
}

host_ops! {
    // Console and timing.
    /// `(text)` — print to the host console.
    Print = 0,
    /// `(text)` — module-raised session error; never returns to the module.
    Error = 1,
    /// Host frame clock in milliseconds.
    Milliseconds = 2,

    // Cvar access. Set operations route through the host safety filter.
    /// `(view, name, default_value, flags)` — register and receive a view.
    CvarRegister = 3,
    /// `(view)` — refresh a previously registered view if modified.
    CvarUpdate = 4,
    /// `(name, value)`.
    CvarSet = 5,
    /// `(name, dest, dest_len)`.
    CvarStringBuffer = 6,

    // Tokenized command access for the command being claimed or replayed.
    CmdArgc = 7,
    /// `(index, dest, dest_len)`.
    CmdArgv = 8,
    /// `(dest, dest_len)` — everything after the command name.
    CmdArgs = 9,

    // Virtual file I/O. Handles are scoped to the owning module and closed
    // in bulk when it shuts down.
    /// `(path, handle_out, mode)` — returns length or -1.
    FsOpen = 10,
    /// `(dest, len, handle)`.
    FsRead = 11,
    /// `(src, len, handle)`.
    FsWrite = 12,
    /// `(handle)`.
    FsClose = 13,
    /// `(handle, offset, origin)`.
    FsSeek = 14,

    // Console command plumbing.
    /// `(text)` — queue text for deferred execution by the host.
    SendConsoleCommand = 15,
    /// `(name)` — reserve a name so the host offers it back to the module
    /// through the claim entry point instead of executing it itself.
    AddCommand = 16,
    /// `(name)`.
    RemoveCommand = 17,
    /// `(text)` — append a reliable command to the server stream.
    SendClientCommand = 18,
    /// Repaint during lengthy loads. Must never pump the outer event loop.
    UpdateScreen = 19,

    // Collision queries. Capsule variants share the box implementation with
    // a shape flag.
    /// `(map_name)`.
    CollisionLoadMap = 20,
    CollisionInlineModelCount = 21,
    /// `(index)`.
    CollisionInlineModel = 22,
    /// `(mins, maxs)` — returns a temporary model handle.
    CollisionTempBoxModel = 23,
    CollisionTempCapsuleModel = 24,
    /// `(point, model)`.
    CollisionPointContents = 25,
    /// `(point, model, origin, angles)`.
    CollisionTransformedPointContents = 26,
    /// `(result, start, end, mins, maxs, model, contents_mask)`.
    CollisionBoxTrace = 27,
    CollisionCapsuleTrace = 28,
    /// `(result, start, end, mins, maxs, model, contents_mask, origin, angles)`.
    CollisionTransformedBoxTrace = 29,
    CollisionTransformedCapsuleTrace = 30,
    /// `(request, dest, dest_len)` — returns fragment count.
    MarkFragments = 31,

    // Sound.
    /// `(origin, entity, channel, sfx)`.
    SoundStart = 32,
    /// `(sfx, channel)`.
    SoundStartLocal = 33,
    /// `(kill_all)`.
    SoundClearLoops = 34,
    /// `(entity, origin, velocity, sfx)`.
    SoundAddLoop = 35,
    SoundAddRealLoop = 36,
    /// `(entity)`.
    SoundStopLoop = 37,
    /// `(entity, origin)`.
    SoundUpdateEntity = 38,
    /// `(entity, origin, axis, in_water)`.
    SoundRespatialize = 39,
    /// `(name, compressed)` — returns a sound handle.
    SoundRegister = 40,
    /// `(intro, loop)`.
    SoundStartBackgroundTrack = 41,

    // Renderer.
    /// `(map_name)`.
    RenderLoadWorld = 42,
    /// `(name)` — returns a model handle.
    RenderRegisterModel = 43,
    RenderRegisterSkin = 44,
    RenderRegisterShader = 45,
    RenderRegisterShaderNoMip = 46,
    /// `(name, point_size, font_out)`.
    RenderRegisterFont = 47,
    RenderClearScene = 48,
    /// `(entity)`.
    RenderAddEntity = 49,
    /// `(shader, vert_count, verts)`.
    RenderAddPoly = 50,
    /// `(shader, vert_count, verts, poly_count)`.
    RenderAddPolys = 51,
    /// `(point, ambient_out, directed_out, dir_out)`.
    RenderLightForPoint = 52,
    /// `(origin, intensity, r, g, b)` — float words.
    RenderAddLight = 53,
    RenderAddAdditiveLight = 54,
    /// `(scene_def)`.
    RenderScene = 55,
    /// `(rgba)` — null handle restores the default.
    RenderSetColor = 56,
    /// `(x, y, w, h, s1, t1, s2, t2, shader)` — eight float words.
    RenderDrawStretchPic = 57,
    /// `(model, mins_out, maxs_out)`.
    RenderModelBounds = 58,
    /// `(tag_out, model, start_frame, end_frame, frac, tag_name)`.
    RenderLerpTag = 59,

    // Host state fetches.
    /// `(dest, dest_len)`.
    GetGlconfig = 60,
    /// `(dest, dest_len)` — the configuration-string table.
    GetGameState = 61,
    /// `(number_out, time_out)`.
    GetCurrentSnapshotNumber = 62,
    /// `(number, dest, dest_len)` — returns 1 when retrievable.
    GetSnapshot = 63,
    /// `(number)` — returns 1 when a command is ready for the module.
    GetServerCommand = 64,
    GetCurrentCmdNumber = 65,
    /// `(number, dest, dest_len)` — returns 1 when still in the ring.
    GetUserCmd = 66,
    /// `(value, sensitivity)` — sensitivity is a float word.
    SetUserCmdValue = 67,
    MemoryRemaining = 68,

    // Input.
    /// `(key)`.
    KeyIsDown = 69,
    KeyGetCatcher = 70,
    /// `(mask)` — the console bit cannot be cleared from module context.
    KeySetCatcher = 71,
    /// `(binding)`.
    KeyGetKey = 72,

    // Math helpers operating on float words.
    MathFloor = 73,
    MathCeil = 74,
    MathArcCos = 75,
    /// `(dest, dest_len, value)` — development formatting check.
    TestPrintInt = 76,
    TestPrintFloat = 77,

    /// `(dest, dest_len)` — wall-clock time; returns epoch seconds.
    RealTime = 78,
    /// `(vector)` — round three float components to integral values.
    SnapVector = 79,
    SoundStopBackgroundTrack = 80,
    /// `(old_shader, new_shader, time_offset)`.
    RenderRemapShader = 81,
    /// `(dest, dest_len)` — returns 1 while tokens remain.
    GetEntityToken = 82,
    /// `(point_a, point_b)`.
    RenderInPvs = 83,

    // Appended extensions. Older modules never see these codes; newer
    // modules probe for them through GetValue.
    /// `(entity)` — scene add with extended shading.
    RenderAddEntityExt = 84,
    /// `(start, end, intensity, r, g, b)` — float words after the handles.
    RenderAddLinearLight = 85,
    RenderForceFixedLightMode = 86,
    IsRecordingDemo = 87,
    /// `(dest, dest_len, key)` — capability probe; writes the code for a
    /// named extension and returns 1, or returns 0 for unknown keys.
    GetValue = 88,
}

/// Probe keys understood by [`HostOp::GetValue`], paired with the codes
/// they report.
pub const GET_VALUE_KEYS: &[(&str, HostOp)] = &[
    ("trap_SceneAddEntityExt", HostOp::RenderAddEntityExt),
    ("trap_SceneAddLinearLight", HostOp::RenderAddLinearLight),
    ("trap_ForceFixedLightMode", HostOp::RenderForceFixedLightMode),
    ("trap_IsRecordingDemo", HostOp::IsRecordingDemo),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_op_table_is_dense() {
        for (index, op) in HostOp::ALL.iter().enumerate() {
            assert_eq!(op.code() as usize, index, "{op:?} breaks density");
        }
    }

    #[test]
    fn host_op_decode_round_trips() {
        for op in HostOp::ALL {
            assert_eq!(HostOp::from_code(op.code()), Some(*op));
        }
        assert_eq!(HostOp::from_code(-1), None);
        assert_eq!(HostOp::from_code(HostOp::COUNT as i32), None);
    }

    #[test]
    fn get_value_keys_point_at_extension_block() {
        for (key, op) in GET_VALUE_KEYS {
            assert!(op.code() >= HostOp::RenderAddEntityExt.code(), "{key} maps below the extension block");
        }
    }
}
