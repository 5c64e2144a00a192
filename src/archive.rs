use std::fs;
use std::io::{self, Read};
use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::domain::StorageLocation;
use crate::error::ViewerError;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Persists a downloaded byte stream under a chosen storage location.
pub trait ArchiveWriter: Send + Sync {
    /// Writes `{file_name}.zip` and returns the logical path of the new file.
    fn write_archive(
        &self,
        stream: &mut dyn Read,
        location: &StorageLocation,
        file_name: &str,
    ) -> Result<String, ViewerError>;
}

#[derive(Debug, Clone)]
pub struct FsArchiveWriter {
    verify: bool,
}

impl FsArchiveWriter {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }
}

impl ArchiveWriter for FsArchiveWriter {
    fn write_archive(
        &self,
        stream: &mut dyn Read,
        location: &StorageLocation,
        file_name: &str,
    ) -> Result<String, ViewerError> {
        let dir = tree_dir(location)?;
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| ViewerError::Filesystem(format!("create {dir}: {err}")))?;

        let target = dir.join(format!("{file_name}.{ARCHIVE_EXTENSION}"));
        let mut temp = tempfile::Builder::new()
            .prefix("ghv-archive")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        io::copy(stream, temp.as_file_mut())
            .map_err(|err| ViewerError::Filesystem(format!("write {target}: {err}")))?;
        temp.as_file_mut()
            .sync_all()
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;

        if self.verify {
            validate_zip(temp.path())?;
        }

        if target.as_std_path().exists() {
            fs::remove_file(target.as_std_path())
                .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        }
        temp.persist(target.as_std_path())
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;

        Ok(build_file_path(location, &target))
    }
}

/// Resolves the directory a location points at. The tree path must stay
/// inside its authority.
pub fn tree_dir(location: &StorageLocation) -> Result<Utf8PathBuf, ViewerError> {
    let authority = Utf8Path::new(&location.authority);
    if location.authority.trim().is_empty() || !authority.is_absolute() {
        return Err(ViewerError::UnsupportedLocation(format!(
            "authority must be an absolute directory: {:?}",
            location.authority
        )));
    }

    let mut dir = authority.to_path_buf();
    for component in Utf8Path::new(&location.path).components() {
        match component {
            Utf8Component::Normal(part) => dir.push(part),
            Utf8Component::CurDir => {}
            _ => {
                return Err(ViewerError::UnsupportedLocation(format!(
                    "path escapes its authority: {}",
                    location.path
                )));
            }
        }
    }
    Ok(dir)
}

/// Rebuilds the display path of `file` as the authority followed by the
/// directory chain down to the file.
pub fn build_file_path(location: &StorageLocation, file: &Utf8Path) -> String {
    let authority = Utf8Path::new(&location.authority);
    let mut chain = Vec::new();
    let mut current = Some(file);
    while let Some(node) = current {
        if node == authority {
            break;
        }
        if let Some(name) = node.file_name() {
            chain.push(name);
        }
        current = node.parent();
    }
    chain.reverse();

    let mut path = authority.to_path_buf();
    for name in chain {
        path.push(name);
    }
    path.into_string()
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), ViewerError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        ViewerError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| ViewerError::InvalidArchive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ViewerError::InvalidArchive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(ViewerError::InvalidArchive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| ViewerError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn validate_zip(zip_path: &Path) -> Result<(), ViewerError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        ViewerError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| ViewerError::InvalidArchive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ViewerError::InvalidArchive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| ViewerError::InvalidArchive(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn zip_bytes() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("hello-main/README.md", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"# hello\n").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn temp_location() -> (tempfile::TempDir, StorageLocation) {
        let temp = tempfile::tempdir().unwrap();
        let authority = temp.path().to_str().unwrap().to_string();
        (temp, StorageLocation::new("Downloads/repos", authority))
    }

    #[test]
    fn writes_zip_and_returns_resolvable_path() {
        let (_temp, location) = temp_location();
        let writer = FsArchiveWriter::new(true);
        let bytes = zip_bytes();

        let path = writer
            .write_archive(&mut Cursor::new(bytes.clone()), &location, "hello_1")
            .unwrap();

        assert!(path.ends_with("Downloads/repos/hello_1.zip"));
        assert!(path.starts_with(&location.authority));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn invalid_archive_is_rejected_and_not_left_behind() {
        let (_temp, location) = temp_location();
        let writer = FsArchiveWriter::new(true);

        let err = writer
            .write_archive(&mut Cursor::new(b"not a zip".to_vec()), &location, "bad_2")
            .unwrap_err();
        assert_matches!(err, ViewerError::InvalidArchive(_));

        let dir = tree_dir(&location).unwrap();
        assert!(!dir.join("bad_2.zip").as_std_path().exists());
    }

    #[test]
    fn unverified_writer_accepts_any_bytes() {
        let (_temp, location) = temp_location();
        let writer = FsArchiveWriter::new(false);
        let path = writer
            .write_archive(&mut Cursor::new(b"raw".to_vec()), &location, "raw_3")
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"raw");
    }

    #[test]
    fn escaping_tree_path_is_unsupported() {
        let location = StorageLocation::new("../etc", "/home/alice");
        assert_matches!(tree_dir(&location), Err(ViewerError::UnsupportedLocation(_)));

        let relative_authority = StorageLocation::new("repos", "home");
        assert_matches!(
            tree_dir(&relative_authority),
            Err(ViewerError::UnsupportedLocation(_))
        );
    }

    #[test]
    fn logical_path_walks_directory_chain() {
        let location = StorageLocation::new("a/b", "/home/alice");
        let file = Utf8Path::new("/home/alice/a/b/proj_1.zip");
        assert_eq!(
            build_file_path(&location, file),
            "/home/alice/a/b/proj_1.zip"
        );
    }

    #[test]
    fn extract_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("archive.zip");
        std::fs::write(&zip_path, zip_bytes()).unwrap();

        let out = temp.path().join("out");
        extract_zip(&zip_path, &out).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.join("hello-main/README.md")).unwrap(),
            "# hello\n"
        );
    }
}
