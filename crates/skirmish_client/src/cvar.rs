//! Console variables and the module-facing safety filter.
//!
//! Modules see cvars only through marshalled views keyed by host-assigned
//! handles. Set operations from module context route through a filter that
//! silently refuses protected and read-only variables; private variables
//! are visible only to privileged (native) modules.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_module_abi::views::CvarView;

use crate::util::{read_json_from_path, write_json_to_path, StorageError};

pub const CVAR_ARCHIVE: u32 = 0x0001;
pub const CVAR_PROTECTED: u32 = 0x0002;
pub const CVAR_PRIVATE: u32 = 0x0004;
pub const CVAR_ROM: u32 = 0x0008;
pub const CVAR_CHEAT: u32 = 0x0010;
pub const CVAR_USER_CREATED: u32 = 0x0020;

#[derive(Debug, Clone, PartialEq)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub reset_string: String,
    pub value: f32,
    pub integer: i32,
    pub flags: u32,
    pub modification_count: i32,
}

impl Cvar {
    fn new(name: &str, value: &str, flags: u32) -> Self {
        let mut cvar = Self {
            name: name.to_string(),
            string: String::new(),
            reset_string: value.to_string(),
            value: 0.0,
            integer: 0,
            flags,
            modification_count: 0,
        };
        cvar.assign(value);
        cvar
    }

    fn assign(&mut self, value: &str) {
        self.string = value.to_string();
        self.value = value.parse().unwrap_or(0.0);
        self.integer = value
            .parse()
            .unwrap_or_else(|_| self.value as i32);
        self.modification_count += 1;
    }
}

pub struct CvarTable {
    vars: BTreeMap<String, Cvar>,
    /// Handle index to name, for module-registered views.
    handles: Vec<String>,
    pub cheats_enabled: bool,
}

impl Default for CvarTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CvarTable {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            handles: Vec::new(),
            cheats_enabled: false,
        }
    }

    /// Host-side registration. An existing cvar keeps its value and picks
    /// up any new flags.
    pub fn register(&mut self, name: &str, value: &str, flags: u32) -> &Cvar {
        let entry = self
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Cvar::new(name, value, flags));
        entry.flags |= flags;
        entry
    }

    pub fn get(&self, name: &str) -> Option<&Cvar> {
        self.vars.get(name)
    }

    pub fn string(&self, name: &str) -> &str {
        self.get(name).map(|cvar| cvar.string.as_str()).unwrap_or("")
    }

    pub fn value(&self, name: &str) -> f32 {
        self.get(name).map_or(0.0, |cvar| cvar.value)
    }

    pub fn integer(&self, name: &str) -> i32 {
        self.get(name).map_or(0, |cvar| cvar.integer)
    }

    /// Host-side set: always takes effect, creating on first use.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.vars.get_mut(name) {
            Some(cvar) => {
                if cvar.string != value {
                    cvar.assign(value);
                }
            }
            None => {
                self.vars
                    .insert(name.to_string(), Cvar::new(name, value, CVAR_USER_CREATED));
            }
        }
    }

    /// Module-side set. Attempts against protected, private, or read-only
    /// variables are silently refused; cheat variables require cheats to
    /// be enabled. Unknown names are created as ordinary user cvars.
    pub fn set_safe(&mut self, name: &str, value: &str) {
        if let Some(cvar) = self.vars.get(name) {
            if cvar.flags & (CVAR_PROTECTED | CVAR_PRIVATE | CVAR_ROM) != 0 {
                tracing::debug!(name, "refusing module set of restricted cvar");
                return;
            }
            if cvar.flags & CVAR_CHEAT != 0 && !self.cheats_enabled {
                tracing::debug!(name, "refusing module set of cheat cvar");
                return;
            }
        }
        self.set(name, value);
    }

    fn view_of(&self, handle: i32, cvar: &Cvar) -> CvarView {
        CvarView {
            handle,
            modification_count: cvar.modification_count,
            value: cvar.value,
            integer: cvar.integer,
            string: cvar.string.clone(),
        }
    }

    /// Module registration: ensure the cvar exists and hand back a view.
    /// An unprivileged module asking for a private variable gets the empty
    /// view instead.
    pub fn register_for_module(
        &mut self,
        name: &str,
        value: &str,
        flags: u32,
        privileged: bool,
    ) -> CvarView {
        if !privileged {
            if let Some(existing) = self.vars.get(name) {
                if existing.flags & CVAR_PRIVATE != 0 {
                    return CvarView::default();
                }
            }
        }
        self.register(name, value, flags);
        let handle = match self.handles.iter().position(|n| n == name) {
            Some(index) => index as i32 + 1,
            None => {
                self.handles.push(name.to_string());
                self.handles.len() as i32
            }
        };
        let cvar = &self.vars[name];
        self.view_of(handle, cvar)
    }

    /// Refresh a module's view if the variable changed since.
    pub fn update_view(&self, view: &CvarView) -> Option<CvarView> {
        if view.handle <= 0 {
            return None;
        }
        let name = self.handles.get(view.handle as usize - 1)?;
        let cvar = self.vars.get(name)?;
        if cvar.modification_count == view.modification_count {
            return None;
        }
        Some(self.view_of(view.handle, cvar))
    }

    /// String fetch with the private filter applied.
    pub fn string_for_module(&self, name: &str, privileged: bool) -> String {
        match self.get(name) {
            Some(cvar) if cvar.flags & CVAR_PRIVATE != 0 && !privileged => String::new(),
            Some(cvar) => cvar.string.clone(),
            None => String::new(),
        }
    }

    /// Reset every cheat variable to its default; run after module init
    /// whenever cheats are not allowed.
    pub fn set_cheat_state(&mut self) {
        if self.cheats_enabled {
            return;
        }
        for cvar in self.vars.values_mut() {
            if cvar.flags & CVAR_CHEAT != 0 && cvar.string != cvar.reset_string {
                let reset = cvar.reset_string.clone();
                cvar.assign(&reset);
            }
        }
    }

    /// Clamp an integer cvar into `[min, max]`, creating it at `min` when
    /// absent.
    pub fn check_range(&mut self, name: &str, min: i32, max: i32) {
        let current = match self.get(name) {
            Some(cvar) => cvar.integer,
            None => {
                self.register(name, &min.to_string(), 0);
                return;
            }
        };
        let clamped = current.clamp(min, max);
        if clamped != current {
            self.set(name, &clamped.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArchiveFile {
    cvars: BTreeMap<String, String>,
}

impl CvarTable {
    /// Persist every archived cvar.
    pub fn save_archive(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let cvars = self
            .vars
            .values()
            .filter(|cvar| cvar.flags & CVAR_ARCHIVE != 0)
            .map(|cvar| (cvar.name.clone(), cvar.string.clone()))
            .collect();
        write_json_to_path(&ArchiveFile { cvars }, path.as_ref())
    }

    /// Restore archived values over the current table.
    pub fn load_archive(&mut self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let file: ArchiveFile = read_json_from_path(path.as_ref())?;
        for (name, value) in file.cvars {
            self.register(&name, &value, CVAR_ARCHIVE);
            self.set(&name, &value);
        }
        Ok(())
    }
}
