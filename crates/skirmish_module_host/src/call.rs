//! Call marshalling between the host and a loaded module.
//!
//! Entry-point calls use a fixed argument array with an explicit arity cap.
//! While a call frame is live the slot's backend and memory are checked
//! out, the slot's depth is raised, and every trap the module raises flows
//! through the bound [`SyscallSink`]. Depth bookkeeping is restored on
//! every exit path, including module-raised errors.

use skirmish_module_abi::{EntryOp, HostError, ModuleRole, MAX_CALL_ARGS, MAX_TRAP_ARGS};

use crate::memory::ModuleMemory;
use crate::registry::{ModuleHandle, ModuleRegistry};

/// Identity of the module a trap arrived from, as the dispatcher sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCaller {
    pub handle: ModuleHandle,
    pub role: ModuleRole,
    pub privileged: bool,
}

/// Host side of the trap table: one numbered entry point, demultiplexed by
/// the receiver. Handlers may re-enter [`call_module`] for a different
/// role through the registry they are handed.
pub trait SyscallSink {
    fn syscall(
        &mut self,
        registry: &mut ModuleRegistry,
        memory: &mut ModuleMemory,
        caller: ModuleCaller,
        trap: i32,
        args: &[i32; MAX_TRAP_ARGS],
    ) -> Result<i32, HostError>;
}

/// What a running module sees: its own memory plus the single trap entry.
pub trait HostSyscalls {
    fn syscall(
        &mut self,
        memory: &mut ModuleMemory,
        trap: i32,
        args: &[i32; MAX_TRAP_ARGS],
    ) -> Result<i32, HostError>;
}

/// An executable module body. Implementations are either natively
/// registered Rust values or loaded interpreted images; both answer the
/// same uniform entry convention.
pub trait ModuleBackend {
    fn main_entry(
        &mut self,
        host: &mut dyn HostSyscalls,
        memory: &mut ModuleMemory,
        op: i32,
        args: [i32; MAX_CALL_ARGS],
    ) -> Result<i32, HostError>;

    /// Backend-specific teardown hook, invoked once on free.
    fn teardown(&mut self) {}
}

struct BoundSink<'a> {
    registry: &'a mut ModuleRegistry,
    sink: &'a mut dyn SyscallSink,
    caller: ModuleCaller,
}

impl HostSyscalls for BoundSink<'_> {
    fn syscall(
        &mut self,
        memory: &mut ModuleMemory,
        trap: i32,
        args: &[i32; MAX_TRAP_ARGS],
    ) -> Result<i32, HostError> {
        self.sink
            .syscall(self.registry, memory, self.caller, trap, args)
    }
}

/// Invoke a module's entry point.
///
/// A missing handle or an arity above [`MAX_CALL_ARGS`] is a contract
/// violation of the unrecoverable class. A stale handle (the slot was freed
/// or reloaded since) is treated the same way: it indicates host wiring
/// that survived a lifecycle event it should not have.
pub fn call_module(
    registry: &mut ModuleRegistry,
    sink: &mut dyn SyscallSink,
    handle: Option<ModuleHandle>,
    op: EntryOp,
    args: &[i32],
) -> Result<i32, HostError> {
    let Some(handle) = handle else {
        return Err(HostError::fatal("module call with empty handle"));
    };
    if args.len() > MAX_CALL_ARGS {
        return Err(HostError::fatal(format!(
            "module call with {} args exceeds the {MAX_CALL_ARGS}-arg convention",
            args.len(),
        )));
    }

    let role = handle.role;
    let caller = {
        let Some(slot) = registry.slot_mut(role) else {
            return Err(HostError::fatal(format!(
                "module call on empty {} slot",
                role.name(),
            )));
        };
        if slot.generation != handle.generation {
            return Err(HostError::fatal(format!(
                "stale module handle for {}",
                role.name(),
            )));
        }
        if slot.backend.is_none() {
            return Err(HostError::fatal(format!(
                "module '{}' re-entered while on the call stack",
                slot.name,
            )));
        }
        slot.call_depth += 1;
        ModuleCaller {
            handle,
            role,
            privileged: slot.privileged,
        }
    };

    let slot = registry.slot_mut(role).expect("slot checked above");
    let mut backend = slot.backend.take().expect("backend checked above");
    let mut memory = slot.memory.take().expect("memory travels with backend");

    let mut padded = [0i32; MAX_CALL_ARGS];
    padded[..args.len()].copy_from_slice(args);

    tracing::trace!(role = role.name(), op = op.code(), "module call");
    let mut bound = BoundSink {
        registry: &mut *registry,
        sink: &mut *sink,
        caller,
    };
    let result = backend.main_entry(&mut bound, &mut memory, op.code(), padded);

    // Restore the frame. If a forced unload emptied or replaced the slot
    // while we were running, the checked-out backend must not resurrect it.
    match registry.slot_mut(role) {
        Some(slot) if slot.generation == handle.generation => {
            slot.backend = Some(backend);
            slot.memory = Some(memory);
            slot.call_depth -= 1;
        }
        _ => {
            tracing::warn!(
                role = role.name(),
                "module slot freed during a live call; dropping the unwound backend"
            );
            backend.teardown();
        }
    }

    result
}
