//! Downloads screen controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::archive::ArchiveWriter;
use crate::domain::RepositoryRecord;
use crate::github::GithubClient;
use crate::repository::Repository;
use crate::tasks::{ScreenTasks, blocking};

pub struct DownloadsController<G: GithubClient, W: ArchiveWriter> {
    repository: Arc<Repository<G, W>>,
    records_tx: Arc<watch::Sender<Vec<RepositoryRecord>>>,
    started: AtomicBool,
    screen: ScreenTasks,
}

impl<G, W> DownloadsController<G, W>
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    pub fn new(repository: Arc<Repository<G, W>>) -> Self {
        let (records_tx, _) = watch::channel(Vec::new());
        Self {
            repository,
            records_tx: Arc::new(records_tx),
            started: AtomicBool::new(false),
            screen: ScreenTasks::default(),
        }
    }

    pub fn records(&self) -> watch::Receiver<Vec<RepositoryRecord>> {
        self.records_tx.subscribe()
    }

    pub fn visible(&self) -> Vec<RepositoryRecord> {
        self.records_tx.borrow().clone()
    }

    /// Publishes the reconciled downloads list, then keeps appending records
    /// the cache reports that are not shown yet. Runs once per controller.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let repository = self.repository.clone();
        let records_tx = self.records_tx.clone();
        self.screen.spawn(async move {
            let mut updates = repository.subscribe_downloaded();
            updates.mark_unchanged();

            let reconcile = repository.clone();
            match blocking(move || reconcile.fetch_downloaded_records()).await {
                Ok(initial) => {
                    debug!(count = initial.len(), "downloads reconciled");
                    records_tx.send_replace(initial);
                }
                Err(err) => warn!(error = %err, "reconciling downloads failed"),
            }

            while updates.changed().await.is_ok() {
                let loaded = updates.borrow_and_update().clone();
                if loaded.is_empty() {
                    continue;
                }
                records_tx.send_if_modified(|shown| {
                    let before = shown.len();
                    for record in loaded {
                        if !shown.contains(&record) {
                            shown.push(record);
                        }
                    }
                    shown.len() != before
                });
            }
        });
    }
}
