//! Module resolution and lifecycle.
//!
//! A role resolves to a concrete implementation through one of two paths:
//! the native catalog of statically registered module factories, or an
//! interpreted image loaded from the image store (behind the `wasm`
//! feature). Resolution failures are ordinary values — the caller decides
//! whether a missing module aborts the session or falls back.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use skirmish_module_abi::{
    BackendKind, HostError, ModuleLimits, ModuleRole, HOST_API_VERSION,
};

use crate::call::ModuleBackend;
use crate::memory::ModuleMemory;
use crate::registry::{ModuleHandle, ModuleRegistry};

/// Addressable bytes in each slot's memory arena, guards excluded.
pub const MODULE_ARENA_BYTES: u32 = 256 * 1024;

/// Why a module could not be resolved or loaded. Non-fatal by design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    ArtifactMissing { artifact: String },
    IncompatibleApi { artifact: String, expected: u32, found: u32 },
    DigestMismatch { expected: String, found: String },
    ImageRejected { reason: String },
    BackendUnavailable { reason: String },
}

/// Compute the hex sha256 digest of an artifact's bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// An interpreted module image, addressed by its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArtifact {
    pub name: String,
    pub digest: String,
    pub bytes: Vec<u8>,
}

/// Store of interpreted images keyed by composed artifact name.
#[derive(Default)]
pub struct ImageStore {
    images: BTreeMap<String, ModuleArtifact>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register image bytes under `name`, verifying the declared digest.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        digest: impl Into<String>,
        bytes: &[u8],
    ) -> Result<(), LoadError> {
        let name = name.into();
        let digest = digest.into();
        let computed = digest_hex(bytes);
        if computed != digest {
            return Err(LoadError::DigestMismatch {
                expected: digest,
                found: computed,
            });
        }
        self.images.insert(
            name.clone(),
            ModuleArtifact {
                name,
                digest,
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleArtifact> {
        self.images.get(name)
    }
}

type NativeFactory = Box<dyn Fn() -> Box<dyn ModuleBackend>>;

/// A natively registered module: its factory plus the host service version
/// it was built against. Both must check out before the slot is populated.
pub struct NativeModuleSpec {
    api_version: u32,
    create: NativeFactory,
}

impl NativeModuleSpec {
    pub fn new(create: impl Fn() -> Box<dyn ModuleBackend> + 'static) -> Self {
        Self {
            api_version: HOST_API_VERSION,
            create: Box::new(create),
        }
    }

    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }
}

/// Catalog of native module implementations, keyed by the composed
/// artifact name a role resolves to.
#[derive(Default)]
pub struct NativeCatalog {
    entries: BTreeMap<String, NativeModuleSpec>,
}

impl NativeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: ModuleRole, spec: NativeModuleSpec) {
        self.entries.insert(artifact_name(role), spec);
    }

    fn resolve(&self, artifact: &str) -> Option<&NativeModuleSpec> {
        self.entries.get(artifact)
    }
}

/// Compose the platform artifact name for a role: bare role name plus the
/// architecture tag.
pub(crate) fn artifact_name(role: ModuleRole) -> String {
    format!("{}_{}", role.name(), std::env::consts::ARCH)
}

/// Resolve `role` to a concrete implementation and populate its slot.
///
/// Idempotent for a live role: the existing handle is returned unchanged.
pub fn create_module(
    registry: &mut ModuleRegistry,
    role: ModuleRole,
    kind: BackendKind,
    catalog: &NativeCatalog,
    images: &ImageStore,
    limits: &ModuleLimits,
) -> Result<ModuleHandle, LoadError> {
    if let Some(handle) = registry.live_handle(role) {
        return Ok(handle);
    }

    let artifact = artifact_name(role);
    let backend: Box<dyn ModuleBackend> = match kind {
        BackendKind::Native => {
            let spec = catalog
                .resolve(&artifact)
                .ok_or_else(|| LoadError::ArtifactMissing {
                    artifact: artifact.clone(),
                })?;
            if spec.api_version != HOST_API_VERSION {
                return Err(LoadError::IncompatibleApi {
                    artifact,
                    expected: HOST_API_VERSION,
                    found: spec.api_version,
                });
            }
            (spec.create)()
        }
        BackendKind::Interpreted => load_interpreted(&artifact, images, limits)?,
    };

    tracing::info!(module = %artifact, kind = ?kind, "module loaded");
    let memory = ModuleMemory::new(MODULE_ARENA_BYTES);
    Ok(registry.install(role, artifact, kind, backend, memory))
}

#[cfg(feature = "wasm")]
fn load_interpreted(
    artifact: &str,
    images: &ImageStore,
    limits: &ModuleLimits,
) -> Result<Box<dyn ModuleBackend>, LoadError> {
    let image = images.get(artifact).ok_or_else(|| LoadError::ArtifactMissing {
        artifact: artifact.to_string(),
    })?;
    let runtime = crate::wasm::WasmRuntime::shared();
    Ok(Box::new(runtime.load(image, limits.clone())?))
}

#[cfg(not(feature = "wasm"))]
fn load_interpreted(
    _artifact: &str,
    _images: &ImageStore,
    _limits: &ModuleLimits,
) -> Result<Box<dyn ModuleBackend>, LoadError> {
    Err(LoadError::BackendUnavailable {
        reason: "interpreted backend not compiled in".to_string(),
    })
}

/// Reload a role's module data without perturbing host-side wiring: the
/// role and backend kind are captured, the slot is freed, and the module is
/// recreated through the same resolution path.
pub fn restart_module(
    registry: &mut ModuleRegistry,
    handle: ModuleHandle,
    catalog: &NativeCatalog,
    images: &ImageStore,
    limits: &ModuleLimits,
) -> Result<ModuleHandle, HostError> {
    let role = handle.role();
    let Some(kind) = registry.backend_kind(role) else {
        return Err(HostError::fatal(format!(
            "restart of empty {} slot",
            role.name(),
        )));
    };
    registry.free(role)?;
    create_module(registry, role, kind, catalog, images, limits).map_err(|err| {
        HostError::drop_session(format!("restart of {} failed: {err:?}", role.name()))
    })
}
