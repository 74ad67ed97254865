use crate::error::ConfigError;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:4000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    /// SQLite file for the persisted store; the platform data dir when unset.
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            database_path: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("chatline.toml"))
    }

    /// Loads from the platform config file, falling back to defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("ignoring unreadable config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("chatline.toml");
        let settings = Settings {
            server_url: "wss://chat.example.com".into(),
            database_path: Some(dir.path().join("db.sqlite")),
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatline.toml");
        fs::write(&path, "database_path = \"/tmp/x.sqlite\"\n").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/x.sqlite")));
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatline.toml");
        fs::write(&path, "server_url = [").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
