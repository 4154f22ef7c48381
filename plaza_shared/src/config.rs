//! Configuration system.
//!
//! Loads plaza configuration from JSON strings (file IO left to the binaries).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{appearance::SheetMeta, math::IVec2};

/// Where the local player's sprite sheet lives and how it is laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSource {
    pub path: String,
    #[serde(flatten)]
    pub meta: SheetMeta,
}

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlazaConfig {
    /// Server listen / connect address, e.g. `127.0.0.1:8000`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Spawn point used when a handshake carries no position.
    #[serde(default = "default_spawn")]
    pub spawn: IVec2,
    /// Outbound movement rate (client only).
    #[serde(default = "default_emit_hz")]
    pub emit_hz: u32,
    /// Render/update loop rate (client only).
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Connect + handshake budget before going offline (client only).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Player color as `#rrggbb` (client only).
    #[serde(default = "default_player_color")]
    pub player_color: String,
    /// Custom sprite sheet (client only).
    #[serde(default)]
    pub sheet: Option<SheetSource>,
}

fn default_server_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_spawn() -> IVec2 {
    IVec2::new(600, 380)
}

fn default_emit_hz() -> u32 {
    30
}

fn default_tick_hz() -> u32 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    600
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_player_color() -> String {
    "#64b5f6".to_string()
}

impl Default for PlazaConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            spawn: default_spawn(),
            emit_hz: default_emit_hz(),
            tick_hz: default_tick_hz(),
            connect_timeout_ms: default_connect_timeout_ms(),
            player_name: default_player_name(),
            player_color: default_player_color(),
            sheet: None,
        }
    }
}

impl PlazaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.emit_hz.max(1) as f64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
