use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ViewerError {
    #[error("invalid GitHub login: {0}")]
    InvalidLogin(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("GitHub request failed: {0}")]
    GithubHttp(String),

    #[error("GitHub is unreachable: {0}")]
    #[diagnostic(help("check the network connection or the configured api_base_url"))]
    Unreachable(String),

    #[error("cache database error: {0}")]
    Database(String),

    #[error("repository {0} is already cached")]
    AlreadyCached(i64),

    #[error("repository not found: {0}")]
    RecordNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("unsupported storage location: {0}")]
    UnsupportedLocation(String),

    #[error("no storage location selected")]
    #[diagnostic(help("run `ghv location set <DIR>` or pass --dest"))]
    MissingStorageLocation,

    #[error("downloaded archive is not a valid zip: {0}")]
    InvalidArchive(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ViewerError {
    /// Uniqueness violations on insert mean the row is already stored.
    pub fn is_already_cached(&self) -> bool {
        matches!(self, ViewerError::AlreadyCached(_))
    }
}

impl From<tokio::task::JoinError> for ViewerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ViewerError::Task(err.to_string())
    }
}
