//! Sandbox side of the module boundary.
//!
//! This crate owns everything between "a role needs a module" and "the
//! module's entry point ran": the registry of live slots, the loader for
//! both backend kinds, the call marshaller with its reentrancy bookkeeping,
//! and the guarded memory arena every slot communicates through.

mod call;
mod loader;
mod memory;
mod registry;

#[cfg(feature = "wasm")]
mod wasm;

pub use call::{call_module, HostSyscalls, ModuleBackend, ModuleCaller, SyscallSink};
pub use loader::{
    create_module, restart_module, digest_hex, ImageStore, LoadError, ModuleArtifact,
    NativeCatalog, NativeModuleSpec, MODULE_ARENA_BYTES,
};
pub use memory::ModuleMemory;
pub use registry::{ModuleHandle, ModuleRegistry};

#[cfg(feature = "wasm")]
pub use wasm::{WasmModuleBackend, WasmRuntime, WasmRuntimeConfig};
