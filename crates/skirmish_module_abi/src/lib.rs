//! Shared host/guest contract for Skirmish gameplay modules.
//!
//! A module is a unit of semi-trusted gameplay logic bound to one logical
//! role. The host invokes it through a uniform fixed-arity entry point and
//! the module calls back into the host through a single numbered trap. This
//! crate holds everything both sides must agree on: roles, entry operations,
//! the trap enumeration, calling-convention limits, the marshalled view
//! types, and the severity-classed host error.

use serde::{Deserialize, Serialize};

pub mod ops;
pub mod views;

pub use ops::{EntryOp, HostOp};

/// Maximum number of argument words after the operation code in an
/// entry-point call. Callers exceeding this hit a contract violation at the
/// marshalling boundary rather than undefined behavior.
pub const MAX_CALL_ARGS: usize = 3;

/// Number of argument words carried by every trap, after the trap number.
/// Wide operations use all of them; narrow ones ignore the tail.
pub const MAX_TRAP_ARGS: usize = 9;

/// Reserved bytes at each edge of a module's memory arena. Small argument
/// records may be addressed right up to a region edge; the guard keeps such
/// accesses from ever touching memory the module does not own.
pub const MEMORY_GUARD_BYTES: u32 = 1024;

/// Offset value meaning "no buffer".
pub const NULL_HANDLE: i32 = 0;

/// Version of the host service set. A module declares the version it was
/// built against; mismatches are load failures, not runtime surprises.
pub const HOST_API_VERSION: u32 = 3;

/// Logical roles a loaded module can fill. At most one live module per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleRole {
    GameServer,
    GameClient,
    Ui,
}

impl ModuleRole {
    pub const COUNT: usize = 3;
    pub const ALL: [ModuleRole; Self::COUNT] =
        [ModuleRole::GameServer, ModuleRole::GameClient, ModuleRole::Ui];

    /// Bare module name, used when composing artifact names.
    pub fn name(self) -> &'static str {
        match self {
            ModuleRole::GameServer => "game_server",
            ModuleRole::GameClient => "game_client",
            ModuleRole::Ui => "game_ui",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ModuleRole::GameServer => 0,
            ModuleRole::GameClient => 1,
            ModuleRole::Ui => 2,
        }
    }
}

/// How a module's code is executed.
///
/// `Native` modules are compiled into the host process and registered in a
/// catalog; they run at full trust. `Interpreted` modules are loaded from a
/// bytecode image into a guarded address space and run at reduced trust,
/// which among other things filters their view of private cvars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Native,
    Interpreted,
}

impl BackendKind {
    /// Whether slots of this kind may read and register private cvars.
    pub fn privileged(self) -> bool {
        matches!(self, BackendKind::Native)
    }
}

/// Resource ceilings applied to interpreted module execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleLimits {
    pub max_mem_bytes: u64,
    pub max_fuel: u64,
    pub max_call_ms: u64,
}

impl Default for ModuleLimits {
    fn default() -> Self {
        Self {
            max_mem_bytes: 64 * 1024 * 1024,
            max_fuel: 10_000_000,
            max_call_ms: 2_000,
        }
    }
}

/// Severity-classed errors raised at the host/module boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Invariant violation scoped to the current session: tear the session
    /// down and return to idle. The process survives.
    DropSession { reason: String },
    /// The server or module explicitly signalled termination; the cause is
    /// propagated to the user-facing layer verbatim.
    Disconnect { reason: String },
    /// Parameter contract violated in a way that indicates a build or
    /// version mismatch. Not recoverable.
    Fatal { reason: String },
}

impl HostError {
    pub fn drop_session(reason: impl Into<String>) -> Self {
        HostError::DropSession {
            reason: reason.into(),
        }
    }

    pub fn disconnect(reason: impl Into<String>) -> Self {
        HostError::Disconnect {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        HostError::Fatal {
            reason: reason.into(),
        }
    }
}

/// Reinterpret a trap argument word as an IEEE-754 single.
///
/// Float arguments travel across the boundary as raw bit patterns; this is
/// a reinterpretation, not a numeric conversion.
pub fn word_to_f32(word: i32) -> f32 {
    f32::from_bits(word as u32)
}

/// Inverse of [`word_to_f32`], for returning float results.
pub fn f32_to_word(value: f32) -> i32 {
    value.to_bits() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_stable() {
        assert_eq!(ModuleRole::GameServer.name(), "game_server");
        assert_eq!(ModuleRole::GameClient.name(), "game_client");
        assert_eq!(ModuleRole::Ui.name(), "game_ui");
    }

    #[test]
    fn role_indices_are_dense() {
        for (i, role) in ModuleRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
    }

    #[test]
    fn float_words_round_trip_bit_patterns() {
        for value in [0.0_f32, -0.0, 1.5, -123.625, f32::MIN_POSITIVE] {
            assert_eq!(word_to_f32(f32_to_word(value)).to_bits(), value.to_bits());
        }
        // NaN payloads survive because nothing numeric happens in between.
        let nan_bits = 0x7fc0_1234_u32;
        assert_eq!(word_to_f32(nan_bits as i32).to_bits(), nan_bits);
    }

    #[test]
    fn only_native_backends_are_privileged() {
        assert!(BackendKind::Native.privileged());
        assert!(!BackendKind::Interpreted.privileged());
    }
}
