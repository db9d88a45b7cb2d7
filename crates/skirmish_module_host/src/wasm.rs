//! Interpreted module backend.
//!
//! Images are validated, compiled, and run inside their own guarded address
//! space with fuel and memory ceilings. The uniform entry convention maps
//! onto a `vm_main(op, a0, a1, a2) -> i32` export; the slot arena is staged
//! into guest memory before each call and read back after, so the checked
//! translation semantics hold for interpreted modules exactly as for native
//! ones.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use skirmish_module_abi::{HostError, ModuleLimits, MAX_CALL_ARGS};

use crate::call::{HostSyscalls, ModuleBackend};
use crate::loader::{digest_hex, LoadError, ModuleArtifact};
use crate::memory::ModuleMemory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmRuntimeConfig {
    pub max_cache_entries: usize,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: 32,
        }
    }
}

/// Shared compilation state: one engine and one compiled-image cache.
pub struct WasmRuntime {
    engine: wasmtime::Engine,
    compiled_cache: Arc<Mutex<CompiledImageCache>>,
}

static SHARED_RUNTIME: OnceLock<WasmRuntime> = OnceLock::new();

impl WasmRuntime {
    pub fn new(config: WasmRuntimeConfig) -> Self {
        let mut engine_config = wasmtime::Config::new();
        engine_config.consume_fuel(true);
        engine_config.wasm_multi_value(true);
        engine_config.wasm_reference_types(true);
        engine_config.wasm_threads(false);
        engine_config.cranelift_nan_canonicalization(true);
        engine_config.debug_info(false);
        let engine =
            wasmtime::Engine::new(&engine_config).expect("failed to initialize wasm engine");
        Self {
            engine,
            compiled_cache: Arc::new(Mutex::new(CompiledImageCache::new(
                config.max_cache_entries,
            ))),
        }
    }

    /// Process-wide runtime. Compiled images are keyed by digest, so one
    /// cache serves every registry.
    pub fn shared() -> &'static WasmRuntime {
        SHARED_RUNTIME.get_or_init(|| WasmRuntime::new(WasmRuntimeConfig::default()))
    }

    fn compile_cached(
        &self,
        digest: &str,
        bytes: &[u8],
    ) -> Result<Arc<wasmtime::Module>, LoadError> {
        let mut cache = self.compiled_cache.lock().expect("compiled cache poisoned");
        if let Some(module) = cache.get(digest) {
            return Ok(module);
        }
        drop(cache);

        let module = wasmtime::Module::new(&self.engine, bytes).map_err(|err| {
            LoadError::ImageRejected {
                reason: format!("compile failed: {err}"),
            }
        })?;
        let module = Arc::new(module);
        let mut cache = self.compiled_cache.lock().expect("compiled cache poisoned");
        cache.insert(digest.to_string(), module.clone());
        Ok(module)
    }

    #[cfg(test)]
    fn compiled_cache_len(&self) -> usize {
        self.compiled_cache
            .lock()
            .expect("compiled cache poisoned")
            .len()
    }

    /// Verify the image digest, compile, instantiate, and resolve the two
    /// required exports.
    pub fn load(
        &self,
        artifact: &ModuleArtifact,
        limits: ModuleLimits,
    ) -> Result<WasmModuleBackend, LoadError> {
        let computed = digest_hex(&artifact.bytes);
        if computed != artifact.digest {
            return Err(LoadError::DigestMismatch {
                expected: artifact.digest.clone(),
                found: computed,
            });
        }
        let module = self.compile_cached(&artifact.digest, &artifact.bytes)?;

        let mut store = wasmtime::Store::new(&self.engine, ());
        let linker = wasmtime::Linker::new(&self.engine);
        let instance =
            linker
                .instantiate(&mut store, &module)
                .map_err(|err| LoadError::ImageRejected {
                    reason: format!("instantiate failed: {err}"),
                })?;
        let memory =
            instance
                .get_memory(&mut store, "memory")
                .ok_or_else(|| LoadError::ImageRejected {
                    reason: "missing memory export".to_string(),
                })?;
        let entry = instance
            .get_typed_func::<(i32, i32, i32, i32), i32>(&mut store, "vm_main")
            .map_err(|err| LoadError::ImageRejected {
                reason: format!("missing vm_main export: {err}"),
            })?;

        Ok(WasmModuleBackend {
            name: artifact.name.clone(),
            store,
            memory,
            entry,
            limits,
        })
    }
}

pub struct WasmModuleBackend {
    name: String,
    store: wasmtime::Store<()>,
    memory: wasmtime::Memory,
    entry: wasmtime::TypedFunc<(i32, i32, i32, i32), i32>,
    limits: ModuleLimits,
}

impl WasmModuleBackend {
    fn trap_error(&self, err: wasmtime::Error) -> HostError {
        if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
            let reason = match trap {
                wasmtime::Trap::OutOfFuel => {
                    format!("module '{}' exhausted its fuel budget", self.name)
                }
                other => format!("module '{}' trapped: {other}", self.name),
            };
            return HostError::drop_session(reason);
        }
        HostError::drop_session(format!("module '{}' failed: {err}", self.name))
    }

    fn ensure_guest_capacity(&mut self, needed: u64) -> Result<(), HostError> {
        const WASM_PAGE_SIZE: u64 = 65_536;
        let current_pages = self.memory.size(&self.store);
        let current_size = current_pages.saturating_mul(WASM_PAGE_SIZE);
        if needed <= current_size {
            return Ok(());
        }
        let required_pages = needed.div_ceil(WASM_PAGE_SIZE);
        let delta = required_pages.saturating_sub(current_pages);
        self.memory
            .grow(&mut self.store, delta)
            .map_err(|err| self.trap_error(err))?;
        Ok(())
    }
}

impl ModuleBackend for WasmModuleBackend {
    fn main_entry(
        &mut self,
        _host: &mut dyn HostSyscalls,
        memory: &mut ModuleMemory,
        op: i32,
        args: [i32; MAX_CALL_ARGS],
    ) -> Result<i32, HostError> {
        let start = Instant::now();
        if self.limits.max_fuel > 0 {
            self.store
                .set_fuel(self.limits.max_fuel)
                .map_err(|err| self.trap_error(err))?;
        }

        // Stage the arena's addressable span at matching guest offsets so
        // handles mean the same thing on both sides of the call.
        let base = memory.base() as usize;
        self.ensure_guest_capacity(memory.limit() as u64)?;
        self.memory
            .write(&mut self.store, base, memory.usable())
            .map_err(|err| self.trap_error(err))?;

        let result = self
            .entry
            .call(&mut self.store, (op, args[0], args[1], args[2]))
            .map_err(|err| self.trap_error(err))?;

        let guest_size = self.memory.data_size(&self.store) as u64;
        if guest_size > self.limits.max_mem_bytes {
            return Err(HostError::drop_session(format!(
                "module '{}' exceeded its memory ceiling ({guest_size} bytes)",
                self.name,
            )));
        }
        if start.elapsed().as_millis() as u64 > self.limits.max_call_ms {
            return Err(HostError::drop_session(format!(
                "module '{}' exceeded its call time budget",
                self.name,
            )));
        }

        self.memory
            .read(&self.store, base, memory.usable_mut())
            .map_err(|err| self.trap_error(err))?;

        Ok(result)
    }
}

struct CompiledImageCache {
    max_entries: usize,
    cache: BTreeMap<String, Arc<wasmtime::Module>>,
    lru: VecDeque<String>,
}

impl CompiledImageCache {
    fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            cache: BTreeMap::new(),
            lru: VecDeque::new(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cache.len()
    }

    fn get(&mut self, digest: &str) -> Option<Arc<wasmtime::Module>> {
        let module = self.cache.get(digest)?.clone();
        self.touch(digest);
        Some(module)
    }

    fn insert(&mut self, digest: String, module: Arc<wasmtime::Module>) {
        self.cache.insert(digest.clone(), module);
        self.touch(&digest);
        self.prune();
    }

    fn touch(&mut self, digest: &str) {
        self.lru.retain(|entry| entry != digest);
        self.lru.push_back(digest.to_string());
    }

    fn prune(&mut self) {
        if self.max_entries == 0 {
            self.cache.clear();
            self.lru.clear();
            return;
        }
        while self.cache.len() > self.max_entries {
            if let Some(evicted) = self.lru.pop_front() {
                self.cache.remove(&evicted);
            } else {
                break;
            }
        }
    }
}
