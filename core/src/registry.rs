//! Metadata about environments this tool created
//!
//! Backends only know names and states; the template and sizing an
//! environment was created with are kept here so they survive restarts.
//! Lifecycle state is never read from this file.

use crate::{AppConfig, BackendKind, EnvironmentId, ResourceSpec, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub template_id: String,
    pub backend: BackendKind,
    pub resources: ResourceSpec,
    pub created_at: DateTime<Utc>,
}

/// Records keyed by "<backend>/<name>", optionally backed by a file
#[derive(Debug, Clone, Default)]
pub struct EnvironmentRegistry {
    path: Option<PathBuf>,
    records: BTreeMap<String, EnvironmentRecord>,
}

impl EnvironmentRegistry {
    /// Get the default registry path
    pub fn default_path() -> PathBuf {
        AppConfig::config_dir().join("environments.json")
    }

    /// Registry that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load records from `path`; missing or corrupt files start empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match Self::read(&path) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Ignoring environment records in {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            records,
        }
    }

    /// Files written before keys carried the backend use bare names
    fn read(path: &Path) -> Result<BTreeMap<String, EnvironmentRecord>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path)?;
        let raw: BTreeMap<String, EnvironmentRecord> = serde_json::from_str(&content)?;
        Ok(raw
            .into_iter()
            .map(|(key, record)| {
                if key.contains('/') {
                    (key, record)
                } else {
                    (record_key(&EnvironmentId::new(record.backend, key)), record)
                }
            })
            .collect())
    }

    pub fn get(&self, id: &EnvironmentId) -> Option<&EnvironmentRecord> {
        self.records.get(&record_key(id))
    }

    pub fn insert(&mut self, id: &EnvironmentId, record: EnvironmentRecord) -> Result<()> {
        self.records.insert(record_key(id), record);
        self.save()
    }

    pub fn remove(&mut self, id: &EnvironmentId) -> Result<()> {
        if self.records.remove(&record_key(id)).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.records)?)?;
        Ok(())
    }
}

/// Environment names cannot contain '/', so the key is unambiguous
fn record_key(id: &EnvironmentId) -> String {
    format!("{}/{}", id.backend, id.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record() -> EnvironmentRecord {
        EnvironmentRecord {
            template_id: "python-dev".to_string(),
            backend: BackendKind::Multipass,
            resources: ResourceSpec::new(2, "2GB", "10GB"),
            created_at: Utc::now(),
        }
    }

    fn dev1() -> EnvironmentId {
        EnvironmentId::new(BackendKind::Multipass, "dev1")
    }

    #[test]
    fn test_records_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("environments.json");

        let mut registry = EnvironmentRegistry::open(&path);
        registry.insert(&dev1(), record()).unwrap();

        let reopened = EnvironmentRegistry::open(&path);
        assert_eq!(reopened.get(&dev1()).unwrap().template_id, "python-dev");

        let mut reopened = reopened;
        reopened.remove(&dev1()).unwrap();
        assert!(EnvironmentRegistry::open(&path).get(&dev1()).is_none());
    }

    #[test]
    fn test_same_name_on_both_backends() {
        let mut registry = EnvironmentRegistry::in_memory();
        let container = EnvironmentId::new(BackendKind::Lxd, "dev1");
        let mut lxd_record = record();
        lxd_record.backend = BackendKind::Lxd;
        lxd_record.template_id = "go-dev".to_string();

        registry.insert(&dev1(), record()).unwrap();
        registry.insert(&container, lxd_record).unwrap();
        assert_eq!(registry.get(&dev1()).unwrap().template_id, "python-dev");
        assert_eq!(registry.get(&container).unwrap().template_id, "go-dev");

        registry.remove(&container).unwrap();
        assert!(registry.get(&container).is_none());
        assert!(registry.get(&dev1()).is_some());
    }

    #[test]
    fn test_name_only_keys_are_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("environments.json");
        let mut legacy = BTreeMap::new();
        legacy.insert("dev1".to_string(), record());
        fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let registry = EnvironmentRegistry::open(&path);
        assert!(registry.get(&dev1()).is_some());
        assert!(registry
            .get(&EnvironmentId::new(BackendKind::Lxd, "dev1"))
            .is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("environments.json");
        fs::write(&path, "[1, 2").unwrap();

        let registry = EnvironmentRegistry::open(&path);
        assert!(registry.get(&dev1()).is_none());
    }
}
