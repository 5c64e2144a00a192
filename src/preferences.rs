use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::StorageLocation;
use crate::error::ViewerError;
use crate::store::Store;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Preferences {
    #[serde(default)]
    storage_path: Option<String>,
    #[serde(default)]
    path_authority: Option<String>,
}

/// Two string settings persisted as a small JSON document: the chosen
/// storage path and its authority. Every save rewrites the whole file.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Utf8PathBuf,
    write_lock: Mutex<()>,
}

impl PreferenceStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn save_storage_path(&self, storage_path: &str) -> Result<(), ViewerError> {
        self.edit(|prefs| prefs.storage_path = Some(storage_path.to_string()))
    }

    pub fn storage_path(&self) -> Result<Option<String>, ViewerError> {
        Ok(self.read()?.storage_path)
    }

    pub fn save_path_authority(&self, authority: &str) -> Result<(), ViewerError> {
        self.edit(|prefs| prefs.path_authority = Some(authority.to_string()))
    }

    pub fn path_authority(&self) -> Result<Option<String>, ViewerError> {
        Ok(self.read()?.path_authority)
    }

    /// Both keys must be set for a location to count as chosen.
    pub fn storage_location(&self) -> Result<Option<StorageLocation>, ViewerError> {
        let prefs = self.read()?;
        Ok(match (prefs.storage_path, prefs.path_authority) {
            (Some(path), Some(authority)) => Some(StorageLocation { path, authority }),
            _ => None,
        })
    }

    pub fn save_storage_location(&self, location: &StorageLocation) -> Result<(), ViewerError> {
        self.edit(|prefs| {
            prefs.storage_path = Some(location.path.clone());
            prefs.path_authority = Some(location.authority.clone());
        })
    }

    fn read(&self) -> Result<Preferences, ViewerError> {
        if !self.path.as_std_path().exists() {
            return Ok(Preferences::default());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| {
            ViewerError::Filesystem(format!("corrupt preferences {}: {err}", self.path))
        })
    }

    fn edit<F>(&self, apply: F) -> Result<(), ViewerError>
    where
        F: FnOnce(&mut Preferences),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        let mut prefs = self.read()?;
        apply(&mut prefs);
        let content = serde_json::to_vec_pretty(&prefs)
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&self.path, &content)
    }
}
