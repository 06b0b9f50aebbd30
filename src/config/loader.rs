// Configuration file loading and creation

use super::types::Config;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("archers");

    // Create config directory if it doesn't exist
    fs::create_dir_all(&path).ok();

    path.push("config.toml");
    path
}

/// Load configuration from file, or create default if it doesn't exist
pub fn load_config() -> Result<Config, io::Error> {
    let config_path = get_config_path();

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        validate(parse_config(&contents))
    } else {
        create_default_config(&config_path)?;
        Ok(Config::default())
    }
}

/// Parse config text, falling back to defaults on malformed input
pub fn parse_config(contents: &str) -> Config {
    match toml::from_str(contents) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet, the config decides where it goes
            eprintln!("Warning: Failed to parse config file: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    }
}

/// Reject values the host loop cannot run with
pub fn validate(config: Config) -> Result<Config, io::Error> {
    let game = &config.game;
    let problem = if game.tick_interval_ms == 0 {
        Some("game.tick_interval_ms must be greater than 0")
    } else if game.map_width < 1 {
        Some("game.map_width must be at least 1")
    } else if game.map_height < 1 {
        Some("game.map_height must be at least 1")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid config: {}", problem),
        )),
        None => Ok(config),
    }
}

/// Create a default configuration file with helpful comments
pub fn create_default_config(path: &Path) -> Result<(), io::Error> {
    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let commented_toml = format!(
        "# Archers Configuration File\n\
         # After editing, restart the host or client for changes to take effect\n\
         #\n\
         # [network] relay_url must point at a running `relay` binary\n\
         # [game] settings only matter on the hosting side\n\
         # [logging] level: \"error\", \"warn\", \"info\", \"debug\", \"trace\"\n\n\
         {}",
        toml_string
    );

    fs::write(path, commented_toml)?;
    println!("Created default config file at: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        let parsed: Config = toml::from_str(&toml_string).unwrap();

        assert_eq!(parsed.network.relay_url, config.network.relay_url);
        assert_eq!(parsed.game.tick_interval_ms, config.game.tick_interval_ms);
        assert_eq!(parsed.game.max_zombies, config.game.max_zombies);
        assert_eq!(parsed.logging.level, config.logging.level);
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let partial_toml = r#"
            [game]
            tick_interval_ms = 500
        "#;

        let config = parse_config(partial_toml);

        assert_eq!(config.game.tick_interval_ms, 500);
        assert_eq!(config.game.rejoin_grace_ms, 30_000);
        assert_eq!(config.game.map_width, 32);
        assert_eq!(config.network.discovery_window_ms, 1_000);
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let config = parse_config("[game\ntick_interval_ms = ");
        assert_eq!(config.game.tick_interval_ms, 2_000);
    }

    #[test]
    fn test_zero_tick_interval_is_rejected() {
        let config = parse_config("[game]\ntick_interval_ms = 0\n");
        let err = validate(config).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_empty_map_is_rejected() {
        let config = parse_config("[game]\nmap_height = 0\n");
        assert!(validate(config).unwrap_err().to_string().contains("map_height"));

        let config = parse_config("[game]\nmap_width = 0\n");
        assert!(validate(config).is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(Config::default()).is_ok());
    }

    #[test]
    fn test_empty_stun_server_disables_stun() {
        let config = parse_config("[network]\nstun_server = \"\"\n");
        assert!(config.network.stun_server().is_none());
    }
}
