// Configuration module for Archers
// Handles loading and managing relay, game and logging settings from TOML

pub mod loader;
pub mod types;

pub use loader::load_config;
pub use types::{Config, GameConfig, LoggingConfig, NetworkConfig};
