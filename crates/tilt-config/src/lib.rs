mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Returns the config directory: <config dir>/tilt-tracker/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("tilt-tracker");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <config dir>/tilt-tracker/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from the default location, or return defaults if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Save config to the default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

/// Load and validate config from `path`, or return defaults if it does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.validate()?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!("No config found, using defaults");
        Ok(AppConfig::default())
    }
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilt_imu::TrackingMode;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.tracking.mode = TrackingMode::Gyroscope;
        config.tracking.max_duration_secs = 12.5;
        config.filter.smoothing_beta = Some(0.3);
        save_config_to(&config, &path).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn invalid_values_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nalpha = -0.5\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracking\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
