//! Client side of the Skirmish module boundary.
//!
//! The host process owns every piece of session state — configuration
//! strings, snapshot and command history, input, the clock, cvars, the
//! console — and exposes it to loaded gameplay modules through the
//! numbered-trap dispatcher. Rendering, audio, collision, and file access
//! are consumed as black-box services.

mod clock;
mod commands;
mod config;
mod console;
mod cvar;
mod dispatcher;
mod game_state;
mod services;
mod session;
mod snapshot;
mod state;
mod usercmd;
mod util;

#[cfg(test)]
mod tests;

pub use clock::{ClockState, FAST_ADJUST_MS, RESET_TIME_MS, TIMEDEMO_STEP_MS};
pub use commands::{
    ServerCommandRing, BIG_COMMAND_CHARS, COMMAND_BACKUP, MAX_COMMAND_RESCANS,
};
pub use config::{ClientConfig, ConfigError, DEFAULT_CONFIG_FILE_NAME};
pub use console::{tokenize, CommandOwner, Console};
pub use cvar::{
    Cvar, CvarTable, CVAR_ARCHIVE, CVAR_CHEAT, CVAR_PRIVATE, CVAR_PROTECTED, CVAR_ROM,
    CVAR_USER_CREATED,
};
pub use dispatcher::{Dispatcher, TrapArgs, TrapContext};
pub use game_state::{
    info_value_for_key, GameStateTable, CS_SERVERINFO, CS_SYSTEMINFO, MAX_CONFIG_STRINGS,
    MAX_GAMESTATE_CHARS,
};
pub use services::{
    CollisionService, DemoFeed, DemoMessage, HostServices, MemoryVfs, NullCollision,
    NullRender, NullScreen, NullSound, RenderService, ScreenService, SoundService, VfsService,
    FS_MODE_APPEND, FS_MODE_READ, FS_MODE_WRITE,
};
pub use session::{ClientSyscalls, Session};
pub use snapshot::{
    SnapshotHistory, StoredSnapshot, MAX_ENTITY_HISTORY, MAX_SNAPSHOT_ENTITIES,
    SNAPSHOT_BACKUP, SNAPSHOT_NOT_ACTIVE,
};
pub use state::{
    ClientCore, ConnectionState, DemoState, KeyState, KEYCATCH_CONSOLE, KEYCATCH_GAME,
    KEYCATCH_MESSAGE, KEYCATCH_UI,
};
pub use usercmd::{UserCmdHistory, CMD_BACKUP};
pub use util::StorageError;
