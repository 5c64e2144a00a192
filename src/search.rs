//! Search screen controller: debounced owner search merged with the local
//! cache, plus the download flow started from the search results.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::archive::ArchiveWriter;
use crate::domain::{OwnerLogin, RepositoryRecord, StorageLocation};
use crate::error::ViewerError;
use crate::events::{Notification, PathRequest};
use crate::github::GithubClient;
use crate::repository::Repository;
use crate::tasks::{BackgroundScope, ScreenTasks, blocking, lock};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// No query in flight and nothing to show.
    Idle,
    Loading,
    /// Results are visible; a query may still be updating them.
    Ready,
}

#[derive(Debug, Default)]
struct Session {
    last_input: String,
    active_login: Option<String>,
    /// Login whose network results the visible list currently holds.
    shown_for: Option<String>,
    pending_download: Option<RepositoryRecord>,
}

struct Shared<G: GithubClient, W: ArchiveWriter> {
    repository: Arc<Repository<G, W>>,
    scope: BackgroundScope,
    debounce: Duration,
    state_tx: watch::Sender<SearchState>,
    records_tx: watch::Sender<Vec<RepositoryRecord>>,
    notifications: broadcast::Sender<Notification>,
    path_requests: broadcast::Sender<PathRequest>,
    session: Mutex<Session>,
}

pub struct SearchController<G: GithubClient, W: ArchiveWriter> {
    shared: Arc<Shared<G, W>>,
    screen: ScreenTasks,
}

impl<G, W> SearchController<G, W>
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    pub fn new(
        repository: Arc<Repository<G, W>>,
        scope: BackgroundScope,
        debounce: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SearchState::Idle);
        let (records_tx, _) = watch::channel(Vec::new());
        let (notifications, _) = broadcast::channel(EVENT_CAPACITY);
        let (path_requests, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                repository,
                scope,
                debounce,
                state_tx,
                records_tx,
                notifications,
                path_requests,
                session: Mutex::new(Session::default()),
            }),
            screen: ScreenTasks::default(),
        }
    }

    pub fn state(&self) -> watch::Receiver<SearchState> {
        self.shared.state_tx.subscribe()
    }

    pub fn records(&self) -> watch::Receiver<Vec<RepositoryRecord>> {
        self.shared.records_tx.subscribe()
    }

    pub fn visible(&self) -> Vec<RepositoryRecord> {
        self.shared.records_tx.borrow().clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.shared.notifications.subscribe()
    }

    pub fn subscribe_path_requests(&self) -> broadcast::Receiver<PathRequest> {
        self.shared.path_requests.subscribe()
    }

    pub fn has_pending_download(&self) -> bool {
        lock(&self.shared.session).pending_download.is_some()
    }

    /// Restarts the debounce window for `text`. Empty input and input equal
    /// to the previous one are ignored. Must run inside a Tokio runtime.
    pub fn on_query_changed(&self, text: &str) {
        {
            let mut session = lock(&self.shared.session);
            if text.is_empty() || text == session.last_input {
                return;
            }
            session.last_input = text.to_string();
            session.active_login = Some(text.trim().to_string());
        }

        let shared = self.shared.clone();
        let text = text.to_string();
        self.screen.restart_debounce(async move {
            tokio::time::sleep(shared.debounce).await;
            match text.parse::<OwnerLogin>() {
                Ok(login) => shared.search(login).await,
                Err(err) => {
                    debug!(error = %err, "skipping search for invalid login");
                    shared.reset_idle();
                }
            }
        });
    }

    /// Searches `login` immediately, bypassing the debounce window.
    pub async fn search(&self, login: OwnerLogin) {
        {
            let mut session = lock(&self.shared.session);
            session.last_input = login.as_str().to_string();
            session.active_login = Some(login.as_str().to_string());
        }
        self.shared.search(login).await;
    }

    pub async fn on_download_requested(&self, record: RepositoryRecord) -> Result<(), ViewerError> {
        self.shared.request_download(record).await
    }

    pub async fn on_location_chosen(&self, location: StorageLocation) -> Result<(), ViewerError> {
        self.shared.location_chosen(location).await
    }

    /// Screen-scoped variant of [`SearchController::on_download_requested`]
    /// for callers that cannot await.
    pub fn spawn_download(&self, record: RepositoryRecord) {
        let shared = self.shared.clone();
        self.screen.spawn(async move {
            if let Err(err) = shared.request_download(record).await {
                warn!(error = %err, "download request failed");
                shared.notify(Notification::DownloadFailed);
            }
        });
    }

    pub fn spawn_location_chosen(&self, location: StorageLocation) {
        let shared = self.shared.clone();
        self.screen.spawn(async move {
            if let Err(err) = shared.location_chosen(location).await {
                warn!(error = %err, "resuming download failed");
                shared.notify(Notification::DownloadFailed);
            }
        });
    }
}

impl<G, W> Shared<G, W>
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    fn notify(&self, notification: Notification) {
        // No subscribers is fine: nobody is looking at the screen.
        let _ = self.notifications.send(notification);
    }

    fn is_active(&self, login: &str) -> bool {
        lock(&self.session).active_login.as_deref() == Some(login)
    }

    fn is_shown(&self, login: &str) -> bool {
        lock(&self.session).shown_for.as_deref() == Some(login)
    }

    /// Clears the list after an input that cannot be searched replaced the
    /// query in flight.
    fn reset_idle(&self) {
        {
            let mut session = lock(&self.session);
            session.active_login = None;
            session.shown_for = None;
        }
        self.records_tx.send_replace(Vec::new());
        self.state_tx.send_replace(SearchState::Idle);
    }

    async fn search(self: &Arc<Self>, login: OwnerLogin) {
        let key = login.as_str().to_string();
        self.state_tx.send_replace(SearchState::Loading);

        let repository = self.repository.clone();
        let owner = login.clone();
        let cached = blocking(move || repository.cached_by_owner(&owner))
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "reading cached repositories failed");
                Vec::new()
            });

        if !cached.is_empty() && !self.is_shown(&key) && self.is_active(&key) {
            debug!(login = %key, count = cached.len(), "showing cached repositories");
            self.state_tx.send_replace(SearchState::Ready);
            self.records_tx.send_replace(cached.clone());
        }

        let repository = self.repository.clone();
        let owner = login.clone();
        let loaded = match blocking(move || repository.search_by_owner(&owner)).await {
            Ok(loaded) => loaded,
            Err(ViewerError::Unreachable(reason)) => {
                warn!(%reason, "GitHub unreachable");
                self.notify(Notification::UnknownHost);
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "repository search failed");
                Vec::new()
            }
        };

        if !self.is_active(&key) {
            debug!(login = %key, "dropping stale search response");
            return;
        }

        if loaded.is_empty() && cached.is_empty() {
            self.state_tx.send_replace(SearchState::Idle);
            self.records_tx.send_replace(Vec::new());
            lock(&self.session).shown_for = None;
            return;
        }

        let fresh = if self.is_shown(&key) {
            let visible = self.records_tx.borrow().clone();
            let fresh: Vec<RepositoryRecord> = loaded
                .into_iter()
                .filter(|record| !visible.contains(record))
                .collect();
            if !fresh.is_empty() {
                self.records_tx
                    .send_modify(|records| records.extend(fresh.iter().cloned()));
            }
            fresh
        } else {
            if !loaded.is_empty() {
                self.records_tx.send_replace(loaded.clone());
            }
            loaded
        };

        self.state_tx.send_replace(SearchState::Ready);
        lock(&self.session).shown_for = Some(key);
        self.cache_in_background(fresh);
    }

    fn cache_in_background(&self, records: Vec<RepositoryRecord>) {
        if records.is_empty() {
            return;
        }
        let repository = self.repository.clone();
        self.scope.spawn(async move {
            let result = blocking(move || {
                let mut inserted = 0usize;
                for record in &records {
                    match repository.persist(record) {
                        Ok(()) => inserted += 1,
                        Err(err) if err.is_already_cached() => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok(inserted)
            })
            .await;
            match result {
                Ok(inserted) => debug!(inserted, "cached repositories"),
                Err(err) => warn!(error = %err, "caching repositories failed"),
            }
        });
    }

    async fn request_download(self: &Arc<Self>, record: RepositoryRecord) -> Result<(), ViewerError> {
        let repository = self.repository.clone();
        let id = record.id;
        let cached = blocking(move || repository.record_by_id(id)).await?;
        let cached = match cached {
            Some(cached) if !cached.is_downloaded() => cached,
            _ => {
                self.notify(Notification::AlreadyDownloaded);
                return Ok(());
            }
        };

        let repository = self.repository.clone();
        let location = blocking(move || repository.storage_location()).await?;
        match location {
            Some(location) => self.download(cached, location).await,
            None => {
                lock(&self.session).pending_download = Some(cached);
                let _ = self.path_requests.send(PathRequest { record_id: id });
                Ok(())
            }
        }
    }

    async fn location_chosen(self: &Arc<Self>, location: StorageLocation) -> Result<(), ViewerError> {
        let repository = self.repository.clone();
        let chosen = location.clone();
        self.scope.spawn(async move {
            if let Err(err) = blocking(move || repository.save_storage_location(&chosen)).await {
                warn!(error = %err, "saving storage location failed");
            }
        });

        let pending = lock(&self.session).pending_download.take();
        match pending {
            Some(record) => self.download(record, location).await,
            None => Ok(()),
        }
    }

    async fn download(
        self: &Arc<Self>,
        record: RepositoryRecord,
        location: StorageLocation,
    ) -> Result<(), ViewerError> {
        let repository = self.repository.clone();
        let target = record.clone();
        let stream = blocking(move || Ok(repository.fetch_archive(&target))).await?;
        let Some(stream) = stream else {
            self.notify(Notification::DownloadFailed);
            return Ok(());
        };
        self.notify(Notification::DownloadStarted);

        let shared = self.clone();
        self.scope.spawn(async move {
            let repository = shared.repository.clone();
            let outcome = blocking(move || {
                let mut record = record;
                match repository.store_archive(stream, &location, &record) {
                    Some(path) => {
                        record.local_path = Some(path);
                        repository.mark_updated(&record)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
            .await;
            match outcome {
                Ok(true) => shared.notify(Notification::DownloadFinished),
                Ok(false) => shared.notify(Notification::FileCacheFailed),
                Err(err) => {
                    warn!(error = %err, "recording downloaded archive failed");
                    shared.notify(Notification::FileCacheFailed);
                }
            }
        });
        Ok(())
    }
}
