use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::ViewerError;

/// Runs blocking leaf work (HTTP, SQLite, disk) off the async workers.
pub async fn blocking<T, F>(work: F) -> Result<T, ViewerError>
where
    F: FnOnce() -> Result<T, ViewerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Process-wide task scope for work that must outlive a screen, such as
/// caching freshly fetched records or writing an archive.
#[derive(Clone, Default)]
pub struct BackgroundScope {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Waits for every task, including tasks spawned while draining.
    pub async fn drain(&self) {
        loop {
            let pending = std::mem::take(&mut *lock(&self.tasks));
            if pending.is_empty() {
                break;
            }
            for task in pending {
                if let Err(err) = task.await {
                    warn!(error = %err, "background task failed");
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.tasks)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }
}

/// Tasks owned by one screen controller. At most one debounce timer is
/// alive; everything is aborted when the owner is dropped.
#[derive(Default)]
pub struct ScreenTasks {
    debounce: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ScreenTasks {
    pub fn restart_debounce<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        if let Some(previous) = lock(&self.debounce).replace(handle) {
            previous.abort();
        }
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    pub fn abort_all(&self) {
        if let Some(timer) = lock(&self.debounce).take() {
            timer.abort();
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

impl Drop for ScreenTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
