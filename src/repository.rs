use std::sync::Arc;

use camino::Utf8Path;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::archive::ArchiveWriter;
use crate::cache::RepositoryCache;
use crate::domain::{OwnerLogin, RepositoryRecord, StorageLocation};
use crate::error::ViewerError;
use crate::github::{ArchiveStream, GithubClient};
use crate::preferences::PreferenceStore;

/// Single access point over the remote source, the cache, the preference
/// store, and the archive writer.
pub struct Repository<G: GithubClient, W: ArchiveWriter> {
    github: G,
    cache: RepositoryCache,
    preferences: PreferenceStore,
    writer: W,
}

impl<G: GithubClient, W: ArchiveWriter> Repository<G, W> {
    pub fn new(github: G, cache: RepositoryCache, preferences: PreferenceStore, writer: W) -> Self {
        Self {
            github,
            cache,
            preferences,
            writer,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    /// Downloaded records whose file still exists. Rows whose file has gone
    /// missing get their local path cleared and are left out.
    pub fn fetch_downloaded_records(&self) -> Result<Vec<RepositoryRecord>, ViewerError> {
        let loaded = self.cache.loaded()?;
        let mut present = Vec::with_capacity(loaded.len());
        for mut record in loaded {
            let exists = record
                .local_path
                .as_deref()
                .map(|path| Utf8Path::new(path).as_std_path().exists())
                .unwrap_or(false);
            if exists {
                present.push(record);
                continue;
            }
            warn!(
                id = record.id,
                path = record.local_path.as_deref().unwrap_or_default(),
                "downloaded archive is missing, clearing local path"
            );
            record.local_path = None;
            self.cache.update(&record)?;
        }
        Ok(present)
    }

    /// Fresh records for `login`. Any non-success response yields an empty
    /// list; only an unreachable host is reported as an error.
    pub fn search_by_owner(&self, login: &OwnerLogin) -> Result<Vec<RepositoryRecord>, ViewerError> {
        let response = self.github.load_user_repositories(login)?;
        let code = response.code;
        match response.into_data() {
            Some(remote) => Ok(remote.into_iter().map(RepositoryRecord::from).collect()),
            None => {
                debug!(login = login.as_str(), status = code.code(), "no repositories");
                Ok(Vec::new())
            }
        }
    }

    pub fn fetch_archive(&self, record: &RepositoryRecord) -> Option<ArchiveStream> {
        self.github
            .download_repository(&record.owner_login, &record.project_name)
            .into_data()
    }

    /// Writes the archive for `record` and returns its logical path, or
    /// `None` when the file could not be produced.
    pub fn store_archive(
        &self,
        mut stream: ArchiveStream,
        location: &StorageLocation,
        record: &RepositoryRecord,
    ) -> Option<String> {
        match self
            .writer
            .write_archive(&mut stream, location, &record.archive_name())
        {
            Ok(path) => {
                info!(id = record.id, %path, "archive stored");
                Some(path)
            }
            Err(err) => {
                warn!(id = record.id, error = %err, "failed to store archive");
                None
            }
        }
    }

    /// Fetches and stores the archive using the saved storage location.
    pub fn download(&self, record: &RepositoryRecord) -> Result<Option<String>, ViewerError> {
        let location = self
            .storage_location()?
            .ok_or(ViewerError::MissingStorageLocation)?;
        Ok(self
            .fetch_archive(record)
            .and_then(|stream| self.store_archive(stream, &location, record)))
    }

    pub fn persist(&self, record: &RepositoryRecord) -> Result<(), ViewerError> {
        self.cache.insert(record)
    }

    pub fn mark_updated(&self, record: &RepositoryRecord) -> Result<(), ViewerError> {
        self.cache.update(record)
    }

    pub fn record_by_id(&self, id: i64) -> Result<Option<RepositoryRecord>, ViewerError> {
        self.cache.get_by_id(id)
    }

    pub fn cached_by_owner(&self, login: &OwnerLogin) -> Result<Vec<RepositoryRecord>, ViewerError> {
        self.cache.get_by_owner(login.as_str())
    }

    pub fn subscribe_downloaded(&self) -> watch::Receiver<Vec<RepositoryRecord>> {
        self.cache.subscribe_loaded()
    }

    pub fn storage_location(&self) -> Result<Option<StorageLocation>, ViewerError> {
        self.preferences.storage_location()
    }

    pub fn save_storage_location(&self, location: &StorageLocation) -> Result<(), ViewerError> {
        self.preferences.save_storage_location(location)
    }
}
