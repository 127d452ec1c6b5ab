//! Settings persistence
//!
//! The gate reads its settings through [`SettingsStore::load`] on every request and
//! the admin form writes them through [`SettingsStore::save`]. Both stores keep the
//! raw option map so that keys written by other tools survive a save.

use crate::settings::{GateSettings, SettingsMap};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Key/value store holding the gate settings
pub trait SettingsStore: Send + Sync {
    /// Current settings, with defaults for anything missing
    fn load(&self) -> Result<GateSettings>;

    /// Overwrite the settings and return what was stored before
    fn save(&self, settings: &GateSettings) -> Result<GateSettings>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

/// Process-local store; settings are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    options: RwLock<SettingsMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &GateSettings) -> Self {
        Self {
            options: RwLock::new(settings.to_map()),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<GateSettings> {
        Ok(GateSettings::from_map(&self.options.read()))
    }

    fn save(&self, settings: &GateSettings) -> Result<GateSettings> {
        let mut options = self.options.write();
        let previous = GateSettings::from_map(&options);
        options.extend(settings.to_map());
        Ok(previous)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// YAML file of options, cached in memory and replaced atomically on save
pub struct FileStore {
    path: PathBuf,
    options: RwLock<SettingsMap>,
}

impl FileStore {
    /// Open the store at `path`; a missing file reads as all defaults
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let options = if path.exists() {
            read_options(&path)?
        } else {
            info!("Settings file {:?} not found, starting with defaults", path);
            SettingsMap::new()
        };

        Ok(Self {
            path,
            options: RwLock::new(options),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, options: &SettingsMap) -> Result<()> {
        let yaml = serde_yaml::to_string(options)?;
        let tmp = self.path.with_extension("yaml.tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("Cannot create {:?}: {}", parent, e)))?;
        }

        let mut file = fs::File::create(&tmp)
            .map_err(|e| Error::Store(format!("Cannot write {:?}: {}", tmp, e)))?;
        file.write_all(yaml.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Store(format!("Cannot replace {:?}: {}", self.path, e)))?;

        debug!("Persisted {} options to {:?}", options.len(), self.path);
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> Result<GateSettings> {
        Ok(GateSettings::from_map(&self.options.read()))
    }

    fn save(&self, settings: &GateSettings) -> Result<GateSettings> {
        let mut options = self.options.write();
        let previous = GateSettings::from_map(&options);

        let mut updated = options.clone();
        updated.extend(settings.to_map());
        self.persist(&updated)?;
        *options = updated;

        Ok(previous)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

fn read_options(path: &Path) -> Result<SettingsMap> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Store(format!("Cannot read {:?}: {}", path, e)))?;
    if text.trim().is_empty() {
        return Ok(SettingsMap::new());
    }
    serde_yaml::from_str(&text)
        .map_err(|e| Error::Store(format!("Invalid settings file {:?}: {}", path, e)))
}
