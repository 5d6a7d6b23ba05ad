//! User preferences stored as a single JSON document

use crate::{BackendKind, Error, ResourceSpec, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current config version for migration support
pub const CONFIG_VERSION: u32 = 1;

/// Directory name under the user's config dir
pub const APP_DIR: &str = "devenv-manager";

pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub version: u32,
    pub default_backend: BackendKind,
    pub default_cpus: u32,
    /// Default memory in MB
    #[serde(rename = "default_memory")]
    pub default_memory_mb: u32,
    /// Default disk in GB
    #[serde(rename = "default_disk")]
    pub default_disk_gb: u32,
    /// "auto" or a terminal command name/path
    pub terminal_emulator: String,
    pub log_level: String,
    pub window: WindowSection,
    pub multipass: MultipassSection,
    pub lxd: LxdSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MultipassSection {
    /// Extra network passed to `multipass launch --network`; empty for default
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LxdSection {
    pub storage_pool: String,
    pub network: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_backend: BackendKind::Multipass,
            default_cpus: 2,
            default_memory_mb: 2048,
            default_disk_gb: 10,
            terminal_emulator: "auto".to_string(),
            log_level: "info".to_string(),
            window: WindowSection::default(),
            multipass: MultipassSection::default(),
            lxd: LxdSection::default(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1100.0,
            height: 720.0,
        }
    }
}

impl Default for LxdSection {
    fn default() -> Self {
        Self {
            storage_pool: "default".to_string(),
            network: "lxdbr0".to_string(),
        }
    }
}

impl AppConfig {
    /// Directory holding config.json, templates.json and environments.json
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(APP_DIR)
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load config from the default path, falling back to defaults
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(&Self::default_path())
    }

    /// Load config from `path`; a missing or corrupt file yields defaults
    pub fn load_or_default_from(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Load config from a specific path
    ///
    /// Keys are applied one at a time over the defaults. A key with a value
    /// of the wrong type or out of range is skipped with a warning and keeps
    /// its default; the rest of the file still applies.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let loaded: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let serde_json::Value::Object(loaded) = loaded else {
            return Err(Error::ConfigLoad(format!(
                "{}: expected a JSON object",
                path.display()
            )));
        };

        let (config, rejected) = Self::merge_keys(Self::default(), loaded)?;
        for (key, reason) in rejected {
            log::warn!(
                "Ignoring '{}' in {}: {}; keeping the default",
                key,
                path.display(),
                reason
            );
        }

        if config.version != CONFIG_VERSION {
            log::info!(
                "Config version {} differs from {}, loading as-is",
                config.version,
                CONFIG_VERSION
            );
        }

        Ok(config)
    }

    /// Apply `incoming` key by key over `base`, returning the keys that
    /// could not be applied and why
    fn merge_keys(
        base: Self,
        incoming: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(Self, Vec<(String, String)>)> {
        let mut merged = base;
        let mut rejected = Vec::new();

        for (key, value) in incoming {
            let mut candidate = match serde_json::to_value(&merged)? {
                serde_json::Value::Object(map) => map,
                _ => return Err(Error::ConfigLoad("config is not a JSON object".to_string())),
            };
            candidate.insert(key.clone(), value);

            let attempt = serde_json::from_value::<Self>(serde_json::Value::Object(candidate))
                .map_err(Error::from)
                .and_then(|config| config.validate().map(|()| config));
            match attempt {
                Ok(config) => merged = config,
                Err(e) => rejected.push((key, e.to_string())),
            }
        }
        Ok((merged, rejected))
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Write a copy of the config somewhere else
    pub fn export_to(&self, path: &Path) -> Result<()> {
        self.save_to(path)
    }

    /// Merge the top-level keys of another config file into this one
    pub fn import_from(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let incoming: serde_json::Value = serde_json::from_str(&content)?;
        let incoming = match incoming {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::validation("Imported config must be a JSON object")),
        };

        let mut current = serde_json::to_value(&*self)?;
        if let serde_json::Value::Object(ref mut map) = current {
            for (key, value) in incoming {
                map.insert(key, value);
            }
        }

        let merged: Self = serde_json::from_value(current)?;
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.default_cpus) {
            return Err(Error::validation("Default CPUs must be between 1 and 32"));
        }
        if !(512..=32768).contains(&self.default_memory_mb) {
            return Err(Error::validation(
                "Default memory must be between 512 and 32768 MB",
            ));
        }
        if !(5..=1000).contains(&self.default_disk_gb) {
            return Err(Error::validation("Default disk must be between 5 and 1000 GB"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::validation(format!(
                "Log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if self.terminal_emulator.trim().is_empty() {
            return Err(Error::validation(
                "Terminal emulator cannot be empty (use \"auto\")",
            ));
        }
        Ok(())
    }

    /// Resource sizing pre-filled into the create dialog
    pub fn default_resources(&self) -> ResourceSpec {
        ResourceSpec::new(
            self.default_cpus,
            format!("{}M", self.default_memory_mb),
            format!("{}G", self.default_disk_gb),
        )
    }

    /// Terminal preference, `None` for automatic detection
    pub fn terminal_preference(&self) -> Option<&str> {
        let term = self.terminal_emulator.trim();
        if term.is_empty() || term.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(term)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.default_backend, BackendKind::Multipass);
        assert_eq!(config.default_cpus, 2);
        assert_eq!(config.terminal_emulator, "auto");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.default_backend = BackendKind::Lxd;
        config.default_cpus = 4;
        config.default_memory_mb = 4096;
        config.default_disk_gb = 40;
        config.terminal_emulator = "konsole".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_or_default_from(&dir.path().join("nope.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(Error::ConfigLoad(_))));
        assert_eq!(AppConfig::load_or_default_from(&path), AppConfig::default());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_backend": "lxd", "default_cpus": 6}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.default_backend, BackendKind::Lxd);
        assert_eq!(config.default_cpus, 6);
        assert_eq!(config.default_memory_mb, 2048);
        assert_eq!(config.lxd.network, "lxdbr0");
    }

    #[test]
    fn test_bad_key_keeps_the_others() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"default_backend": "docker", "default_cpus": 6, "default_memory": 1,
                "terminal_emulator": "kitty"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.default_backend, BackendKind::Multipass);
        assert_eq!(config.default_memory_mb, 2048);
        assert_eq!(config.default_cpus, 6);
        assert_eq!(config.terminal_emulator, "kitty");
        assert_eq!(AppConfig::load_or_default_from(&path), config);
    }

    #[test]
    fn test_non_object_config_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2]").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(Error::ConfigLoad(_))));
    }

    #[test]
    fn test_import_merges_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.json");
        fs::write(&path, r#"{"terminal_emulator": "alacritty", "default_disk": 20}"#).unwrap();

        let mut config = AppConfig::default();
        config.default_cpus = 8;
        config.import_from(&path).unwrap();

        assert_eq!(config.terminal_emulator, "alacritty");
        assert_eq!(config.default_disk_gb, 20);
        assert_eq!(config.default_cpus, 8);
    }

    #[test]
    fn test_import_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.json");
        fs::write(&path, r#"{"default_cpus": 0}"#).unwrap();

        let mut config = AppConfig::default();
        assert!(config.import_from(&path).is_err());
        assert_eq!(config.default_cpus, 2);
    }

    #[test]
    fn test_export_then_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.json");

        let mut config = AppConfig::default();
        config.default_backend = BackendKind::Lxd;
        config.export_to(&path).unwrap();

        config.reset();
        assert_eq!(config, AppConfig::default());

        config.import_from(&path).unwrap();
        assert_eq!(config.default_backend, BackendKind::Lxd);
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = AppConfig::default();
        config.default_memory_mb = 100;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log_level = "LOUD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_terminal_preference() {
        let mut config = AppConfig::default();
        assert_eq!(config.terminal_preference(), None);
        config.terminal_emulator = "xterm".to_string();
        assert_eq!(config.terminal_preference(), Some("xterm"));
    }
}
