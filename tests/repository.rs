mod common;

use std::io::Cursor;

use assert_matches::assert_matches;

use common::{Fixture, MockGithub, record, remote};
use github_viewer::error::ViewerError;
use github_viewer::github::ArchiveStream;

#[test]
fn reconciliation_clears_missing_paths_once() {
    let fixture = Fixture::new(MockGithub::default());
    let root = fixture.root();

    let present_path = root.join("present.zip");
    std::fs::write(present_path.as_std_path(), b"zip").unwrap();

    let mut present = record(1, "octo", "present");
    present.local_path = Some(present_path.to_string());
    let mut missing = record(2, "octo", "missing");
    missing.local_path = Some(root.join("gone.zip").to_string());
    fixture.repository.persist(&present).unwrap();
    fixture.repository.persist(&missing).unwrap();

    let mut updates = fixture.repository.subscribe_downloaded();
    updates.mark_unchanged();

    let records = fixture.repository.fetch_downloaded_records().unwrap();
    assert_eq!(records, vec![present.clone()]);
    assert!(updates.has_changed().unwrap());

    let stored = fixture.repository.record_by_id(2).unwrap().unwrap();
    assert_eq!(stored.local_path, None);

    updates.mark_unchanged();
    let again = fixture.repository.fetch_downloaded_records().unwrap();
    assert_eq!(again, vec![present]);
    assert!(!updates.has_changed().unwrap());
}

#[test]
fn reconciliation_of_empty_cache_is_empty() {
    let fixture = Fixture::new(MockGithub::default());
    assert!(fixture.repository.fetch_downloaded_records().unwrap().is_empty());
}

#[test]
fn search_maps_remote_records() {
    let github = MockGithub::with_repositories("octo", vec![remote(7, "octo", "hello")]);
    let fixture = Fixture::new(github);

    let records = fixture
        .repository
        .search_by_owner(&"octo".parse().unwrap())
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].project_description, "");
    assert_eq!(records[0].owner_login, "octo");
    assert_eq!(records[0].local_path, None);
}

#[test]
fn search_without_data_is_empty_and_unreachable_propagates() {
    let fixture = Fixture::new(MockGithub::default());
    let login = "nobody".parse().unwrap();
    assert!(fixture.repository.search_by_owner(&login).unwrap().is_empty());

    *fixture.github.unreachable.lock().unwrap() = true;
    assert_matches!(
        fixture.repository.search_by_owner(&login),
        Err(ViewerError::Unreachable(_))
    );
}

#[test]
fn persist_rejects_duplicates_and_keeps_local_path() {
    let fixture = Fixture::new(MockGithub::default());
    let mut downloaded = record(3, "octo", "kept");
    downloaded.local_path = Some("/tmp/kept_3.zip".to_string());
    fixture.repository.persist(&downloaded).unwrap();

    let err = fixture
        .repository
        .persist(&record(3, "octo", "kept"))
        .unwrap_err();
    assert!(err.is_already_cached());

    let stored = fixture.repository.record_by_id(3).unwrap().unwrap();
    assert_eq!(stored.local_path.as_deref(), Some("/tmp/kept_3.zip"));
}

#[test]
fn store_archive_uses_project_and_id_as_file_name() {
    let fixture = Fixture::new(MockGithub::default());
    let target = record(9, "octo", "widget");
    let stream: ArchiveStream = Box::new(Cursor::new(b"bytes".to_vec()));

    let path = fixture
        .repository
        .store_archive(stream, &fixture.location(), &target)
        .unwrap();
    assert!(path.ends_with("archives/widget_9.zip"));
    assert_eq!(
        *fixture.writer.writes.lock().unwrap(),
        vec!["widget_9".to_string()]
    );
}

#[test]
fn store_archive_failure_collapses_to_none() {
    let fixture = Fixture::new(MockGithub::default());
    *fixture.writer.fail.lock().unwrap() = true;
    let stream: ArchiveStream = Box::new(Cursor::new(Vec::new()));

    let path = fixture
        .repository
        .store_archive(stream, &fixture.location(), &record(4, "octo", "x"));
    assert_eq!(path, None);
}

#[test]
fn download_requires_a_stored_location() {
    let fixture = Fixture::new(MockGithub::default());
    fixture.github.set_archive(b"zip".to_vec());
    let target = record(5, "octo", "thing");

    assert_matches!(
        fixture.repository.download(&target),
        Err(ViewerError::MissingStorageLocation)
    );

    fixture
        .repository
        .save_storage_location(&fixture.location())
        .unwrap();
    let path = fixture.repository.download(&target).unwrap().unwrap();
    assert!(path.ends_with("thing_5.zip"));
    assert_eq!(fixture.github.download_calls(), 1);
}

#[test]
fn failed_archive_fetch_yields_no_stream() {
    let fixture = Fixture::new(MockGithub::default());
    assert!(
        fixture
            .repository
            .fetch_archive(&record(6, "octo", "absent"))
            .is_none()
    );
}
