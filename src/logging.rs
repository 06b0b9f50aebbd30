// Logging setup for Archers
// stderr by default; --debug sends everything to a truncated file instead

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::Level;

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig, debug: bool) -> io::Result<()> {
    let result = if debug {
        let file = open_debug_log(&config.debug_log_path)?;
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG.max(parse_level(&config.level)))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_max_level(parse_level(&config.level))
            .with_writer(io::stderr)
            .try_init()
    };

    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Level from config text; unknown names fall back to info
pub fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

/// Create/truncate the debug log and write its header
fn open_debug_log(path: &str) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    writeln!(file, "=== Archers Debug Log ===")?;
    writeln!(file, "Session started: {:?}", SystemTime::now())?;
    writeln!(file, "To monitor: tail -f {}", path)?;
    writeln!(file, "========================================\n")?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_debug_log_is_truncated_with_header() {
        let path = std::env::temp_dir().join(format!("archers-log-{}.log", uuid::Uuid::new_v4()));
        let path_str = path.to_string_lossy().to_string();
        std::fs::write(&path, "stale line\n").unwrap();

        drop(open_debug_log(&path_str).unwrap());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("=== Archers Debug Log ==="));
        assert!(!contents.contains("stale line"));
        std::fs::remove_file(&path).ok();
    }
}
