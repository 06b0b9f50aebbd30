// Archers configuration types
// All settings with defaults matching the tuned game constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // Relay WebSocket URL shared by hosts and clients
    pub relay_url: String,

    // STUN server for the server-reflexive candidate (empty = host candidate only)
    pub stun_server: String,

    // Handshake guids presented to the relay by each role
    pub client_guid: String,
    pub server_guid: String,

    // Pause between relay reconnect attempts
    pub relay_reconnect_ms: u64,

    // Pause between peer session rebuilds while an initiator is failing
    pub peer_reconnect_ms: u64,

    // How long discovery collects host responses
    pub discovery_window_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080".to_string(),
            stun_server: "stun.cloudflare.com:3478".to_string(),
            client_guid: "51c1a7fa-c862-4b74-a886-86d782c4dd82".to_string(),
            server_guid: "71c497e0-50f5-4c7c-a8c9-9f26061413eb".to_string(),
            relay_reconnect_ms: 10_000,
            peer_reconnect_ms: 15_000,
            discovery_window_ms: 1_000,
        }
    }
}

impl NetworkConfig {
    pub fn relay_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.relay_reconnect_ms)
    }

    pub fn peer_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.peer_reconnect_ms)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn stun_server(&self) -> Option<&str> {
        Some(self.stun_server.as_str()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    // Simulation step for every started room
    pub tick_interval_ms: u64,

    // How long an empty room stays frozen before it is destroyed
    pub rejoin_grace_ms: u64,

    // Grid dimensions; zombies enter at x = map_width - 1 and lose at x < 0
    pub map_width: i32,
    pub map_height: i32,

    pub zombie_health: i32,

    // Cells a zombie walks per tick
    pub zombie_step: i32,

    // Spawn rate at room creation and its per-tick growth
    pub base_zombies_per_tick: f64,
    pub zombies_per_tick_increment: f64,

    // Ticks per half wave of the spawn curve
    pub wave_tick_length: u64,

    // Population cap per room
    pub max_zombies: usize,

    // Ticks a dead zombie lingers (for the death animation) before removal
    pub dead_decay_ticks: u32,

    // Damage of one arrow, sent by clients with every shot
    pub arrow_damage: i32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            rejoin_grace_ms: 30_000,
            map_width: 32,
            map_height: 10,
            zombie_health: 100,
            zombie_step: 1,
            base_zombies_per_tick: 0.5,
            zombies_per_tick_increment: 0.1,
            wave_tick_length: 10,
            max_zombies: 100,
            dead_decay_ticks: 2,
            arrow_damage: 50,
        }
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rejoin_grace(&self) -> Duration {
        Duration::from_millis(self.rejoin_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    // Max level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    // File written instead of stderr when --debug is given
    pub debug_log_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug_log_path: "/tmp/archers-debug.log".to_string(),
        }
    }
}
