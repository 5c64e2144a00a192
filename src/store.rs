use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::error::ViewerError;

pub const DATABASE_FILE: &str = "repositories.db";
pub const PREFERENCES_FILE: &str = "preferences.json";

/// On-disk layout of the client's own state (cache database and preferences).
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
    home_dir: Option<Utf8PathBuf>,
}

impl Store {
    pub fn new() -> Result<Self, ViewerError> {
        let dirs = BaseDirs::new()
            .ok_or_else(|| ViewerError::Filesystem("unable to resolve home directory".to_string()))?;
        let home_dir = Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok();
        let data_root = home_dir
            .as_ref()
            .map(|home| home.join(".cache").join("github-viewer"))
            .ok_or_else(|| {
                ViewerError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            data_root,
            home_dir,
        })
    }

    pub fn new_with_root(data_root: Utf8PathBuf) -> Self {
        let home_dir = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok());
        Self {
            data_root,
            home_dir,
        }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn home_dir(&self) -> Option<&Utf8Path> {
        self.home_dir.as_deref()
    }

    pub fn database_path(&self) -> Utf8PathBuf {
        self.data_root.join(DATABASE_FILE)
    }

    pub fn preferences_path(&self) -> Utf8PathBuf {
        self.data_root.join(PREFERENCES_FILE)
    }

    pub fn ensure_root(&self) -> Result<(), ViewerError> {
        fs::create_dir_all(self.data_root.as_std_path())
            .map_err(|err| ViewerError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ViewerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/var/lib/ghv"));
        assert!(store.database_path().ends_with("ghv/repositories.db"));
        assert!(store.preferences_path().ends_with("ghv/preferences.json"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("value.json");

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"second");
        assert!(!path.with_extension("tmp").as_std_path().exists());
    }
}
