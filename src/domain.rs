use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Component, Utf8Path};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

static LOGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,37}[A-Za-z0-9])?$").unwrap());

/// One GitHub repository known to the client.
///
/// Identity is the numeric id alone: two records with the same id compare
/// equal even when their other fields differ. Use [`RepositoryRecord::is_identical`]
/// for a field-by-field comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: i64,
    pub owner_login: String,
    pub owner_avatar_url: String,
    pub project_name: String,
    pub project_url: String,
    pub project_description: String,
    pub project_stars_count: i64,
    pub local_path: Option<String>,
}

impl RepositoryRecord {
    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }

    /// File stem of the downloaded archive: `{project_name}_{id}`.
    pub fn archive_name(&self) -> String {
        format!("{}_{}", self.project_name, self.id)
    }

    pub fn is_identical(&self, other: &Self) -> bool {
        self.id == other.id
            && self.owner_login == other.owner_login
            && self.owner_avatar_url == other.owner_avatar_url
            && self.project_name == other.project_name
            && self.project_url == other.project_url
            && self.project_description == other.project_description
            && self.project_stars_count == other.project_stars_count
            && self.local_path == other.local_path
    }
}

impl PartialEq for RepositoryRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RepositoryRecord {}

impl Hash for RepositoryRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub fn lists_identical(left: &[RepositoryRecord], right: &[RepositoryRecord]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(a, b)| a.is_identical(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerLogin(String);

impl OwnerLogin {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerLogin {
    type Err = ViewerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !LOGIN_RE.is_match(trimmed) {
            return Err(ViewerError::InvalidLogin(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// User-chosen download destination.
///
/// `authority` is the root of the granted directory tree and `path` the tree
/// path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub path: String,
    pub authority: String,
}

impl StorageLocation {
    pub fn new(path: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            authority: authority.into(),
        }
    }

    /// Splits a chosen directory into an authority and a tree path. The home
    /// directory is the authority when `dir` lies under it, the filesystem
    /// root otherwise.
    pub fn from_dir(dir: &Utf8Path, home: Option<&Utf8Path>) -> Self {
        if let Some(home) = home {
            if let Ok(relative) = dir.strip_prefix(home) {
                return Self::new(relative.as_str(), home.as_str());
            }
        }

        let mut authority = String::from("/");
        let mut parts = Vec::new();
        for component in dir.components() {
            match component {
                Utf8Component::Prefix(prefix) => authority = format!("{}/", prefix.as_str()),
                Utf8Component::RootDir | Utf8Component::CurDir => {}
                other => parts.push(other.as_str()),
            }
        }
        Self::new(parts.join("/"), authority)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Utf8Path::new(&self.authority).join(&self.path))
    }
}
