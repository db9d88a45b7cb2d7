//! Configuration-string table.
//!
//! All session configuration strings live in one append-only byte arena
//! indexed by a fixed slot table. Offset 0 is reserved to mean "empty", so
//! unset slots cost nothing. Any confirmed slot change rebuilds the arena
//! wholesale; readers always observe either the old table or the new one.

use skirmish_module_abi::views::{ConfigStringEntry, GameStateView};
use skirmish_module_abi::HostError;

pub const MAX_CONFIG_STRINGS: usize = 1024;
pub const MAX_GAMESTATE_CHARS: usize = 16000;

/// Well-known slots.
pub const CS_SERVERINFO: usize = 0;
pub const CS_SYSTEMINFO: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateTable {
    offsets: Vec<u32>,
    data: Vec<u8>,
}

impl Default for GameStateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStateTable {
    pub fn new() -> Self {
        Self {
            offsets: vec![0; MAX_CONFIG_STRINGS],
            // Byte 0 is the shared empty string.
            data: vec![0],
        }
    }

    /// Bytes used in the arena, reserved byte included.
    pub fn data_count(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, index: usize) -> &str {
        let Some(&offset) = self.offsets.get(index) else {
            return "";
        };
        if offset == 0 {
            return "";
        }
        let start = offset as usize;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.data.len(), |nul| start + nul);
        std::str::from_utf8(&self.data[start..end]).unwrap_or("")
    }

    /// Set slot `index`, rebuilding the table when the value actually
    /// changes. Returns whether a rebuild happened. Every unchanged slot
    /// keeps its exact content; only offsets move.
    pub fn set(&mut self, index: usize, value: &str) -> Result<bool, HostError> {
        if index >= MAX_CONFIG_STRINGS {
            return Err(HostError::drop_session(format!(
                "bad configstring index {index}"
            )));
        }
        if self.get(index) == value {
            return Ok(false);
        }

        let old = self.clone();
        let mut rebuilt = Self::new();
        for slot in 0..MAX_CONFIG_STRINGS {
            let entry = if slot == index { value } else { old.get(slot) };
            if entry.is_empty() {
                continue;
            }
            if rebuilt.data.len() + entry.len() + 1 > MAX_GAMESTATE_CHARS {
                return Err(HostError::drop_session(
                    "configstring arena capacity exceeded",
                ));
            }
            rebuilt.offsets[slot] = rebuilt.data.len() as u32;
            rebuilt.data.extend_from_slice(entry.as_bytes());
            rebuilt.data.push(0);
        }
        *self = rebuilt;
        Ok(true)
    }

    /// Occupied slots, ascending, for marshalling out to a module.
    pub fn view(&self) -> GameStateView {
        let strings = (0..MAX_CONFIG_STRINGS)
            .filter(|&slot| self.offsets[slot] != 0)
            .map(|slot| ConfigStringEntry {
                index: slot as u32,
                value: self.get(slot).to_string(),
            })
            .collect();
        GameStateView { strings }
    }
}

/// Look up `key` in a `\key\value\` info string.
pub fn info_value_for_key<'a>(info: &'a str, key: &str) -> &'a str {
    let mut fields = info.split('\\').skip(1);
    while let (Some(k), Some(v)) = (fields.next(), fields.next()) {
        if k.eq_ignore_ascii_case(key) {
            return v;
        }
    }
    ""
}
