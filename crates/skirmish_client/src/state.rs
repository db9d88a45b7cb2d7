//! Client-side state owned exclusively by the host.
//!
//! Everything a module can observe lives here and is exposed only through
//! read-oriented traps that copy data out. Nothing is shared by reference
//! across the trust boundary.

use skirmish_module_abi::views::GlConfigView;

use crate::clock::ClockState;
use crate::commands::ServerCommandRing;
use crate::console::Console;
use crate::cvar::CvarTable;
use crate::game_state::GameStateTable;
use crate::services::HostServices;
use crate::snapshot::SnapshotHistory;
use crate::usercmd::UserCmdHistory;

/// Connection lifecycle. The clock primes while `Loading`/`Primed` and the
/// first valid snapshot promotes to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Loading,
    Primed,
    Active,
}

/// Demo playback and recording flags.
#[derive(Debug, Clone, Default)]
pub struct DemoState {
    pub playing: bool,
    pub recording: bool,
    /// The first snapshot after a gamestate would cause a time skip when it
    /// lands on the same frame; playback skips exactly one frame.
    pub first_frame_skipped: bool,
    pub timedemo_start: i64,
    pub timedemo_frames: i64,
    pub timedemo_base: i64,
}

pub const KEYCATCH_CONSOLE: i32 = 0x0001;
pub const KEYCATCH_UI: i32 = 0x0002;
pub const KEYCATCH_MESSAGE: i32 = 0x0004;
pub const KEYCATCH_GAME: i32 = 0x0008;

/// Keyboard state as the traps see it.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pub catcher: i32,
    pub down: std::collections::BTreeSet<i32>,
    pub bindings: std::collections::BTreeMap<String, i32>,
}

pub struct ClientCore {
    pub game_state: GameStateTable,
    pub snapshots: SnapshotHistory,
    pub user_cmds: UserCmdHistory,
    pub server_commands: ServerCommandRing,
    pub clock: ClockState,
    pub cvars: CvarTable,
    pub console: Console,
    pub keys: KeyState,
    pub services: HostServices,
    pub connection: ConnectionState,
    pub demo: DemoState,
    pub glconfig: GlConfigView,

    /// Sequence of the last transport-level message, handed to the module
    /// at initialization.
    pub server_message_sequence: i32,
    pub client_num: i32,
    /// A local simulation authority is running in-process.
    pub sv_running: bool,
    pub sv_paused: bool,
    pub cheat_server: bool,
    pub map_name: String,

    /// Wall time in milliseconds, advanced once per frame by the embedder.
    pub realtime: i64,
    pub frametime: i64,
    pub real_time_seconds: i64,
    pub memory_remaining: i32,

    /// Reliable commands queued for the transport to deliver upstream.
    pub pending_reliable: Vec<String>,
}

impl ClientCore {
    pub fn new(services: HostServices) -> Self {
        Self {
            game_state: GameStateTable::new(),
            snapshots: SnapshotHistory::new(),
            user_cmds: UserCmdHistory::new(),
            server_commands: ServerCommandRing::new(),
            clock: ClockState::default(),
            cvars: CvarTable::new(),
            console: Console::new(),
            keys: KeyState::default(),
            services,
            connection: ConnectionState::Idle,
            demo: DemoState::default(),
            glconfig: GlConfigView::default(),
            server_message_sequence: 0,
            client_num: 0,
            sv_running: false,
            sv_paused: false,
            cheat_server: false,
            map_name: String::new(),
            realtime: 0,
            frametime: 0,
            real_time_seconds: 0,
            memory_remaining: 32 << 20,
            pending_reliable: Vec::new(),
        }
    }

    /// Advance the per-frame clocks.
    pub fn begin_frame(&mut self, realtime: i64) {
        self.frametime = (realtime - self.realtime).max(0);
        self.realtime = realtime;
    }

    /// Hand queued reliable commands to the transport.
    pub fn take_pending_reliable(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_reliable)
    }
}
