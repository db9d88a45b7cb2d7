//! Client configuration file.
//!
//! A small TOML file seeds the tunable cvars before any module loads;
//! everything here remains live-adjustable through the cvar table
//! afterwards.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cvar::{CvarTable, CVAR_ARCHIVE};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "skirmish_client.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fixed latency trade-off in milliseconds; negative values trade
    /// smoothness for responsiveness.
    pub time_nudge: i32,
    /// Scale factor for the ping-derived automatic nudge; 0 disables it.
    pub auto_nudge: f32,
    pub show_time_delta: bool,
    pub timescale: f32,
    pub timedemo: bool,
    /// Script text flushed once when the first live snapshot arrives.
    pub on_enter_world: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            time_nudge: 0,
            auto_nudge: 0.0,
            show_time_delta: false,
            timescale: 1.0,
            timedemo: false,
            on_enter_world: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl From<io::Error> for ConfigError {
    fn from(error: io::Error) -> Self {
        ConfigError::Io(error.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}

impl ClientConfig {
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    /// Seed the cvar table. Values stay live-tunable afterwards.
    pub fn apply(&self, cvars: &mut CvarTable) {
        cvars.register("cl_timeNudge", &self.time_nudge.to_string(), CVAR_ARCHIVE);
        cvars.register("cl_autoNudge", &self.auto_nudge.to_string(), CVAR_ARCHIVE);
        cvars.register(
            "cl_showTimeDelta",
            if self.show_time_delta { "1" } else { "0" },
            0,
        );
        cvars.register("timescale", &self.timescale.to_string(), 0);
        cvars.register("timedemo", if self.timedemo { "1" } else { "0" }, 0);
        cvars.register("cl_activeAction", &self.on_enter_world, 0);
    }
}
