//! Registry of live module slots.
//!
//! One slot per logical role, at most one live module per slot. The
//! registry is an explicit object created by the host process and passed by
//! reference to whatever needs to create, call, or free modules; nothing in
//! this crate reaches for ambient state.

use skirmish_module_abi::{BackendKind, HostError, ModuleRole};

use crate::call::ModuleBackend;
use crate::memory::ModuleMemory;

/// Opaque reference to a loaded module. Generations make handles stale
/// after the slot is freed, so a forgotten copy can never address a
/// different module that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHandle {
    pub(crate) role: ModuleRole,
    pub(crate) generation: u64,
}

impl ModuleHandle {
    pub fn role(self) -> ModuleRole {
        self.role
    }
}

pub(crate) struct LiveModule {
    pub(crate) name: String,
    pub(crate) kind: BackendKind,
    /// Checked out together with `memory` for the duration of a call frame.
    pub(crate) backend: Option<Box<dyn ModuleBackend>>,
    pub(crate) memory: Option<ModuleMemory>,
    pub(crate) call_depth: u32,
    pub(crate) privileged: bool,
    pub(crate) generation: u64,
}

pub struct ModuleRegistry {
    slots: [Option<LiveModule>; ModuleRole::COUNT],
    forced_unload: bool,
    next_generation: u64,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None],
            forced_unload: false,
            next_generation: 0,
        }
    }

    pub(crate) fn slot(&self, role: ModuleRole) -> Option<&LiveModule> {
        self.slots[role.index()].as_ref()
    }

    pub(crate) fn slot_mut(&mut self, role: ModuleRole) -> Option<&mut LiveModule> {
        self.slots[role.index()].as_mut()
    }

    pub(crate) fn install(
        &mut self,
        role: ModuleRole,
        name: String,
        kind: BackendKind,
        backend: Box<dyn ModuleBackend>,
        memory: ModuleMemory,
    ) -> ModuleHandle {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.slots[role.index()] = Some(LiveModule {
            name,
            kind,
            backend: Some(backend),
            memory: Some(memory),
            call_depth: 0,
            privileged: kind.privileged(),
            generation,
        });
        ModuleHandle { role, generation }
    }

    pub fn is_live(&self, role: ModuleRole) -> bool {
        self.slot(role).is_some()
    }

    /// Handle for an already-live role, if any.
    pub fn live_handle(&self, role: ModuleRole) -> Option<ModuleHandle> {
        self.slot(role).map(|slot| ModuleHandle {
            role,
            generation: slot.generation,
        })
    }

    pub fn module_name(&self, role: ModuleRole) -> Option<&str> {
        self.slot(role).map(|slot| slot.name.as_str())
    }

    pub fn backend_kind(&self, role: ModuleRole) -> Option<BackendKind> {
        self.slot(role).map(|slot| slot.kind)
    }

    pub fn call_depth(&self, role: ModuleRole) -> u32 {
        self.slot(role).map_or(0, |slot| slot.call_depth)
    }

    pub fn is_privileged(&self, role: ModuleRole) -> bool {
        self.slot(role).is_some_and(|slot| slot.privileged)
    }

    /// Raised exclusively while unwinding an unrecoverable host error, so
    /// that modules still on the call stack can be torn down anyway.
    pub fn begin_forced_unload(&mut self) {
        self.forced_unload = true;
    }

    pub fn end_forced_unload(&mut self) {
        self.forced_unload = false;
    }

    pub fn forced_unload_active(&self) -> bool {
        self.forced_unload
    }

    /// Free the module in `role`'s slot. A no-op on an empty slot. Freeing
    /// a module with a live call frame is a contract violation unless the
    /// forced-unload flag is set, in which case the free proceeds and is
    /// logged; the unwinding call frame notices the generation change and
    /// discards its checked-out backend instead of restoring it.
    pub fn free(&mut self, role: ModuleRole) -> Result<(), HostError> {
        let Some(slot) = self.slots[role.index()].as_mut() else {
            return Ok(());
        };
        if slot.call_depth > 0 {
            if !self.forced_unload {
                return Err(HostError::fatal(format!(
                    "freeing module '{}' with {} live call frame(s)",
                    slot.name, slot.call_depth,
                )));
            }
            tracing::warn!(module = %slot.name, "forcefully unloading module on the call stack");
        }
        let mut slot = self.slots[role.index()].take().expect("slot checked above");
        if let Some(backend) = slot.backend.as_mut() {
            backend.teardown();
        }
        Ok(())
    }

    /// Free every live slot.
    pub fn free_all(&mut self) -> Result<(), HostError> {
        for role in ModuleRole::ALL {
            self.free(role)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{HostSyscalls, ModuleBackend};
    use skirmish_module_abi::MAX_CALL_ARGS;

    struct InertModule;

    impl ModuleBackend for InertModule {
        fn main_entry(
            &mut self,
            _host: &mut dyn HostSyscalls,
            _memory: &mut ModuleMemory,
            _op: i32,
            _args: [i32; MAX_CALL_ARGS],
        ) -> Result<i32, HostError> {
            Ok(0)
        }
    }

    fn installed(registry: &mut ModuleRegistry, role: ModuleRole) -> ModuleHandle {
        registry.install(
            role,
            role.name().to_string(),
            BackendKind::Native,
            Box::new(InertModule),
            ModuleMemory::with_guard(64, 16),
        )
    }

    #[test]
    fn free_on_empty_slot_is_a_no_op() {
        let mut registry = ModuleRegistry::new();
        registry.free(ModuleRole::Ui).unwrap();
        registry.free(ModuleRole::Ui).unwrap();
    }

    #[test]
    fn free_refuses_live_call_frames_without_forced_unload() {
        let mut registry = ModuleRegistry::new();
        installed(&mut registry, ModuleRole::GameClient);
        registry
            .slot_mut(ModuleRole::GameClient)
            .unwrap()
            .call_depth = 1;

        let err = registry.free(ModuleRole::GameClient).unwrap_err();
        assert!(matches!(err, HostError::Fatal { .. }));
        assert!(registry.is_live(ModuleRole::GameClient));
    }

    #[test]
    fn forced_unload_frees_a_running_module_and_empties_the_slot() {
        let mut registry = ModuleRegistry::new();
        installed(&mut registry, ModuleRole::GameClient);
        registry
            .slot_mut(ModuleRole::GameClient)
            .unwrap()
            .call_depth = 1;

        registry.begin_forced_unload();
        registry.free(ModuleRole::GameClient).unwrap();
        registry.end_forced_unload();
        assert!(!registry.is_live(ModuleRole::GameClient));
    }

    #[test]
    fn generations_distinguish_reinstalled_slots() {
        let mut registry = ModuleRegistry::new();
        let first = installed(&mut registry, ModuleRole::Ui);
        registry.free(ModuleRole::Ui).unwrap();
        let second = installed(&mut registry, ModuleRole::Ui);
        assert_ne!(first, second);
        assert_eq!(registry.live_handle(ModuleRole::Ui), Some(second));
    }
}
