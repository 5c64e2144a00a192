#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use github_viewer::archive::ArchiveWriter;
use github_viewer::cache::RepositoryCache;
use github_viewer::domain::{OwnerLogin, RepositoryRecord, StorageLocation};
use github_viewer::error::ViewerError;
use github_viewer::github::{
    ApiResponse, ArchiveStream, GithubClient, RemoteOwner, RemoteRepository,
};
use github_viewer::preferences::PreferenceStore;
use github_viewer::repository::Repository;

pub fn remote(id: i64, owner: &str, name: &str) -> RemoteRepository {
    RemoteRepository {
        id,
        name: name.to_string(),
        description: None,
        html_url: format!("https://github.com/{owner}/{name}"),
        stargazers_count: id * 10,
        owner: RemoteOwner {
            login: owner.to_string(),
            avatar_url: format!("https://avatars.example/{owner}"),
        },
    }
}

pub fn record(id: i64, owner: &str, name: &str) -> RepositoryRecord {
    RepositoryRecord::from(remote(id, owner, name))
}

pub fn zip_bytes() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(
            "project-main/README.md",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
    writer.write_all(b"# project\n").unwrap();
    writer.finish().unwrap().into_inner()
}

#[derive(Default)]
pub struct MockGithub {
    pub repositories: Mutex<HashMap<String, Vec<RemoteRepository>>>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub unreachable: Mutex<bool>,
    pub archive: Mutex<Option<Vec<u8>>>,
    pub search_calls: Mutex<Vec<String>>,
    pub download_calls: Mutex<usize>,
}

impl MockGithub {
    pub fn with_repositories(login: &str, repositories: Vec<RemoteRepository>) -> Self {
        let mock = Self::default();
        mock.set_repositories(login, repositories);
        mock
    }

    pub fn set_repositories(&self, login: &str, repositories: Vec<RemoteRepository>) {
        self.repositories
            .lock()
            .unwrap()
            .insert(login.to_string(), repositories);
    }

    pub fn set_delay(&self, login: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(login.to_string(), delay);
    }

    pub fn set_archive(&self, bytes: Vec<u8>) {
        *self.archive.lock().unwrap() = Some(bytes);
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> usize {
        *self.download_calls.lock().unwrap()
    }
}

/// Shared handle so tests keep inspecting the mock after handing it over.
#[derive(Clone)]
pub struct SharedGithub(pub Arc<MockGithub>);

impl Deref for SharedGithub {
    type Target = MockGithub;

    fn deref(&self) -> &MockGithub {
        &self.0
    }
}

impl GithubClient for SharedGithub {
    fn load_user_repositories(
        &self,
        login: &OwnerLogin,
    ) -> Result<ApiResponse<Vec<RemoteRepository>>, ViewerError> {
        self.search_calls
            .lock()
            .unwrap()
            .push(login.as_str().to_string());
        let delay = self.delays.lock().unwrap().get(login.as_str()).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if *self.unreachable.lock().unwrap() {
            return Err(ViewerError::Unreachable("mock host".to_string()));
        }
        Ok(
            match self.repositories.lock().unwrap().get(login.as_str()) {
                Some(repositories) => ApiResponse::ok(repositories.clone()),
                None => ApiResponse::no_data(),
            },
        )
    }

    fn download_repository(&self, _owner: &str, _project: &str) -> ApiResponse<ArchiveStream> {
        *self.download_calls.lock().unwrap() += 1;
        match self.archive.lock().unwrap().clone() {
            Some(bytes) => ApiResponse::ok(Box::new(Cursor::new(bytes)) as ArchiveStream),
            None => ApiResponse::failed(),
        }
    }
}

/// Writes archives under a temp directory, or fails every write.
#[derive(Default)]
pub struct MockWriter {
    pub fail: Mutex<bool>,
    pub writes: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct SharedWriter(pub Arc<MockWriter>);

impl Deref for SharedWriter {
    type Target = MockWriter;

    fn deref(&self) -> &MockWriter {
        &self.0
    }
}

impl ArchiveWriter for SharedWriter {
    fn write_archive(
        &self,
        stream: &mut dyn Read,
        location: &StorageLocation,
        file_name: &str,
    ) -> Result<String, ViewerError> {
        if *self.fail.lock().unwrap() {
            return Err(ViewerError::Filesystem("disk full".to_string()));
        }
        let dir = Utf8Path::new(&location.authority).join(&location.path);
        std::fs::create_dir_all(dir.as_std_path()).unwrap();
        let target = dir.join(format!("{file_name}.zip"));
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        std::fs::write(target.as_std_path(), bytes).unwrap();
        self.writes.lock().unwrap().push(file_name.to_string());
        Ok(target.into_string())
    }
}

pub struct Fixture {
    pub temp: tempfile::TempDir,
    pub github: SharedGithub,
    pub writer: SharedWriter,
    pub repository: Arc<Repository<SharedGithub, SharedWriter>>,
}

impl Fixture {
    pub fn new(github: MockGithub) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let github = SharedGithub(Arc::new(github));
        let writer = SharedWriter(Arc::new(MockWriter::default()));
        let cache = RepositoryCache::open(&root.join("repositories.db")).unwrap();
        let preferences = PreferenceStore::new(root.join("preferences.json"));
        let repository =
            Repository::new(github.clone(), cache, preferences, writer.clone()).into_shared();
        Self {
            temp,
            github,
            writer,
            repository,
        }
    }

    pub fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp.path().to_path_buf()).unwrap()
    }

    pub fn location(&self) -> StorageLocation {
        StorageLocation::new("archives", self.root().as_str())
    }
}
