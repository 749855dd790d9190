//! CLI settings, read from `<config dir>/littletask/config.toml`

use anyhow::{bail, Context, Result};
use littletask_core::RecorderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Playback speed when `--speed` is not given
    pub default_speed: f64,
    /// Seconds to wait before playback starts
    pub countdown_secs: u64,
    /// Where recordings are stored; the platform data dir when unset
    pub storage_dir: Option<PathBuf>,
    pub mouse_move_threshold: f64,
    pub channel_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let recorder = RecorderConfig::default();
        Self {
            default_speed: 1.0,
            countdown_secs: 2,
            storage_dir: None,
            mouse_move_threshold: recorder.mouse_move_threshold,
            channel_capacity: recorder.channel_capacity,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !self.default_speed.is_finite() || self.default_speed <= 0.0 {
            bail!("default_speed must be a positive number, got {}", self.default_speed);
        }
        if !self.mouse_move_threshold.is_finite() || self.mouse_move_threshold < 0.0 {
            bail!(
                "mouse_move_threshold must be zero or more, got {}",
                self.mouse_move_threshold
            );
        }
        if self.channel_capacity == 0 {
            bail!("channel_capacity must be > 0");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from the default location, or defaults when there is no file
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|d| d.join("littletask").join("config.toml"))
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            channel_capacity: self.channel_capacity,
            mouse_move_threshold: self.mouse_move_threshold,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_speed = 2.5\nstorage_dir = \"/tmp/lt\"\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.default_speed, 2.5);
        assert_eq!(settings.storage_dir, Some(PathBuf::from("/tmp/lt")));
        assert_eq!(settings.countdown_secs, 2);
        assert_eq!(settings.channel_capacity, 10_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "default_speed = 0.0\n").unwrap();
        assert!(Settings::load(&path).is_err());

        std::fs::write(&path, "channel_capacity = 0\n").unwrap();
        assert!(Settings::load(&path).is_err());

        std::fs::write(&path, "default_speed = \"fast\"\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_recorder_config() {
        let settings = Settings {
            mouse_move_threshold: 4.0,
            channel_capacity: 64,
            ..Default::default()
        };
        let config = settings.recorder_config();
        assert_eq!(config.mouse_move_threshold, 4.0);
        assert_eq!(config.channel_capacity, 64);
    }
}
