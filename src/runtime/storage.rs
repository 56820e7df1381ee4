//! File loading and atomic write helpers
//!
//! Configuration and levels are JSON files. Writes go through a temp file
//! that is synced and renamed into place, so a reader never sees a partial
//! file.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::RuntimeConfig;
use super::level::{Level, LevelFile};

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;
        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}

/// Write runtime configuration as pretty JSON
pub fn write_config(path: &Path, config: &RuntimeConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(path, &json)
}

/// Load runtime configuration. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: RuntimeConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;
    Ok(config)
}

/// Load and validate a level file
pub fn load_level(path: &Path) -> Result<Level> {
    let data = fs::read(path).with_context(|| format!("Failed to read level: {:?}", path))?;
    let file: LevelFile =
        serde_json::from_slice(&data).with_context(|| format!("Malformed level: {:?}", path))?;
    let name = file.name.clone();
    Level::try_from(file).with_context(|| format!("Invalid level '{}'", name))
}

/// Write a level file
pub fn write_level(path: &Path, level: &Level) -> Result<()> {
    let json = serde_json::to_vec_pretty(&level.to_file()).context("Failed to serialize level")?;
    write_atomic(path, &json)
}

/// Read a script file as text
pub fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read script: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write() {
        let temp = TempDir::new().unwrap();
        let test_file = temp.path().join("test.dat");

        write_atomic(&test_file, b"first").unwrap();
        write_atomic(&test_file, b"second").unwrap();

        assert_eq!(fs::read(&test_file).unwrap(), b"second");
        assert!(!temp.path().join("test.tmp").exists());
    }

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let config = RuntimeConfig {
            tick_budget: 250,
            dedupe_animation: false,
            debug: true,
            ..RuntimeConfig::default()
        };

        write_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "tick_budget": 42 }"#).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.tick_budget, 42);
        assert_eq!(loaded.cadence, RuntimeConfig::default().cadence);
        assert_eq!(loaded.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_invalid_level_reports_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("level.json");
        fs::write(
            &path,
            r#"{ "name": "no-finish", "map": ["S.."], "expected": ["E E -"] }"#,
        )
        .unwrap();

        let err = load_level(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("no-finish"));
    }
}
