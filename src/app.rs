use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info};

use crate::archive::{ArchiveWriter, FsArchiveWriter, extract_zip};
use crate::cache::RepositoryCache;
use crate::config::ResolvedConfig;
use crate::domain::{OwnerLogin, RepositoryRecord, StorageLocation};
use crate::downloads::DownloadsController;
use crate::error::ViewerError;
use crate::events::Notification;
use crate::github::{GithubClient, GithubHttpClient};
use crate::preferences::PreferenceStore;
use crate::repository::Repository;
use crate::search::SearchController;
use crate::store::Store;
use crate::tasks::{BackgroundScope, blocking};

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub login: String,
    pub unreachable: bool,
    pub repositories: Vec<RepositoryRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadsResult {
    pub repositories: Vec<RepositoryRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub id: i64,
    pub owner_login: String,
    pub project_name: String,
    pub notifications: Vec<Notification>,
    pub local_path: Option<String>,
    pub extracted_to: Option<String>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationResult {
    pub path: Option<String>,
    pub authority: Option<String>,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub dest: Option<Utf8PathBuf>,
    pub extract: bool,
}

/// Composition root: owns the facade and the process-wide task scope and
/// hands out screen controllers wired to them.
pub struct App<G: GithubClient, W: ArchiveWriter> {
    store: Store,
    config: ResolvedConfig,
    repository: Arc<Repository<G, W>>,
    scope: BackgroundScope,
}

impl App<GithubHttpClient, FsArchiveWriter> {
    pub fn build(config: ResolvedConfig, store: Store) -> Result<Self, ViewerError> {
        let github = GithubHttpClient::new(&config.api_base_url, config.request_timeout)?;
        let writer = FsArchiveWriter::new(config.verify_archives);
        Self::new(config, store, github, writer)
    }
}

impl<G, W> App<G, W>
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    pub fn new(
        config: ResolvedConfig,
        store: Store,
        github: G,
        writer: W,
    ) -> Result<Self, ViewerError> {
        store.ensure_root()?;
        let cache = RepositoryCache::open(&store.database_path())?;
        let preferences = PreferenceStore::new(store.preferences_path());
        let repository = Repository::new(github, cache, preferences, writer).into_shared();
        debug!(root = %store.data_root(), "application store ready");
        Ok(Self {
            store,
            config,
            repository,
            scope: BackgroundScope::new(),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<Repository<G, W>> {
        &self.repository
    }

    pub fn scope(&self) -> &BackgroundScope {
        &self.scope
    }

    pub fn search_controller(&self) -> SearchController<G, W> {
        SearchController::new(
            self.repository.clone(),
            self.scope.clone(),
            self.config.search_debounce,
        )
    }

    pub fn downloads_controller(&self) -> DownloadsController<G, W> {
        DownloadsController::new(self.repository.clone())
    }

    /// Storage location for a user-entered directory. Relative paths are
    /// taken from the current directory.
    pub fn location_for(&self, dir: &Utf8Path) -> Result<StorageLocation, ViewerError> {
        let dir = absolute_dir(dir)?;
        Ok(StorageLocation::from_dir(&dir, self.store.home_dir()))
    }

    /// Waits for background work such as cache inserts and archive writes.
    pub async fn shutdown(&self) {
        self.scope.drain().await;
    }

    pub async fn search(&self, login: OwnerLogin) -> SearchResult {
        let controller = self.search_controller();
        let mut notifications = controller.subscribe_notifications();
        controller.search(login.clone()).await;
        self.scope.drain().await;

        let mut unreachable = false;
        loop {
            match notifications.try_recv() {
                Ok(Notification::UnknownHost) => unreachable = true,
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }

        SearchResult {
            login: login.to_string(),
            unreachable,
            repositories: controller.visible(),
        }
    }

    /// Runs the whole download flow for one repository of `login`.
    /// `choose_dir` answers the path request when no location is stored and
    /// none was passed in `options`.
    pub async fn download<F>(
        &self,
        login: OwnerLogin,
        project: &str,
        options: DownloadOptions,
        choose_dir: F,
    ) -> Result<DownloadResult, ViewerError>
    where
        F: FnOnce() -> Option<Utf8PathBuf>,
    {
        let controller = self.search_controller();
        controller.search(login.clone()).await;
        self.scope.drain().await;

        let record = controller
            .visible()
            .into_iter()
            .find(|record| record.project_name.eq_ignore_ascii_case(project))
            .ok_or_else(|| ViewerError::RecordNotFound(format!("{login}/{project}")))?;

        if let Some(dest) = &options.dest {
            let location = self.location_for(dest)?;
            let repository = self.repository.clone();
            blocking(move || repository.save_storage_location(&location)).await?;
        }

        let mut notifications = controller.subscribe_notifications();
        let mut path_requests = controller.subscribe_path_requests();
        controller.on_download_requested(record.clone()).await?;

        if path_requests.try_recv().is_ok() {
            let dir = choose_dir().ok_or(ViewerError::MissingStorageLocation)?;
            controller.on_location_chosen(self.location_for(&dir)?).await?;
        }

        let mut seen = Vec::new();
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    seen.push(notification);
                    if notification.ends_download() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        self.scope.drain().await;

        match seen.last() {
            Some(Notification::DownloadFailed) => {
                return Err(ViewerError::GithubHttp(format!(
                    "archive for {login}/{} is unavailable",
                    record.project_name
                )));
            }
            Some(Notification::FileCacheFailed) => {
                return Err(ViewerError::Filesystem(format!(
                    "archive for {login}/{} could not be written",
                    record.project_name
                )));
            }
            _ => {}
        }

        let repository = self.repository.clone();
        let id = record.id;
        let stored = blocking(move || repository.record_by_id(id)).await?;
        let local_path = stored.and_then(|record| record.local_path);

        let extracted_to = match (&local_path, options.extract) {
            (Some(path), true) => Some(extract_next_to(path, &record.archive_name()).await?),
            _ => None,
        };

        info!(id, path = local_path.as_deref().unwrap_or_default(), "download complete");
        Ok(DownloadResult {
            id,
            owner_login: record.owner_login,
            project_name: record.project_name,
            notifications: seen,
            local_path,
            extracted_to,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub async fn downloads(&self) -> Result<DownloadsResult, ViewerError> {
        let repository = self.repository.clone();
        let repositories = blocking(move || repository.fetch_downloaded_records()).await?;
        Ok(DownloadsResult { repositories })
    }

    pub fn set_location(&self, dir: &Utf8Path) -> Result<LocationResult, ViewerError> {
        let location = self.location_for(dir)?;
        crate::archive::tree_dir(&location)?;
        self.repository.save_storage_location(&location)?;
        self.location()
    }

    pub fn location(&self) -> Result<LocationResult, ViewerError> {
        let location = self.repository.storage_location()?;
        let directory = match &location {
            Some(location) => Some(crate::archive::tree_dir(location)?.into_string()),
            None => None,
        };
        Ok(LocationResult {
            path: location.as_ref().map(|location| location.path.clone()),
            authority: location.map(|location| location.authority),
            directory,
        })
    }
}

async fn extract_next_to(path: &str, name: &str) -> Result<String, ViewerError> {
    let zip_path = Utf8PathBuf::from(path);
    let target = zip_path
        .parent()
        .map(|parent| parent.join(name))
        .unwrap_or_else(|| Utf8PathBuf::from(name));
    let out = target.clone();
    blocking(move || extract_zip(zip_path.as_std_path(), out.as_std_path())).await?;
    Ok(target.into_string())
}

fn absolute_dir(dir: &Utf8Path) -> Result<Utf8PathBuf, ViewerError> {
    let joined = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        let cwd = std::env::current_dir()
            .map_err(|err| ViewerError::Filesystem(format!("current directory: {err}")))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
            ViewerError::Filesystem(format!("non UTF-8 current directory: {}", path.display()))
        })?;
        cwd.join(dir)
    };

    let mut normalized = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_str()),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_dir_resolves_dot_segments() {
        let dir = absolute_dir(Utf8Path::new("/srv/./archives/../repos")).unwrap();
        assert_eq!(dir, Utf8PathBuf::from("/srv/repos"));

        let relative = absolute_dir(Utf8Path::new("out")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("out"));
    }
}
