use std::fmt;

use serde::Serialize;

/// One-shot user-facing notifications published by the controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    AlreadyDownloaded,
    UnknownHost,
    DownloadStarted,
    DownloadFinished,
    DownloadFailed,
    FileCacheFailed,
}

impl Notification {
    pub fn message(self) -> &'static str {
        match self {
            Notification::AlreadyDownloaded => "repository is already downloaded",
            Notification::UnknownHost => "GitHub is unreachable",
            Notification::DownloadStarted => "download started",
            Notification::DownloadFinished => "download finished",
            Notification::DownloadFailed => "download failed",
            Notification::FileCacheFailed => "could not save the archive",
        }
    }

    /// No further notification follows for the same download request.
    pub fn ends_download(self) -> bool {
        matches!(
            self,
            Notification::AlreadyDownloaded
                | Notification::DownloadFinished
                | Notification::DownloadFailed
                | Notification::FileCacheFailed
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Emitted when a download waits for the user to choose a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRequest {
    pub record_id: i64,
}
