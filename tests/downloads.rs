mod common;

use std::time::Duration;

use common::{Fixture, MockGithub, SharedGithub, SharedWriter, record};
use github_viewer::domain::RepositoryRecord;
use github_viewer::downloads::DownloadsController;

async fn wait_for<F>(controller: &DownloadsController<SharedGithub, SharedWriter>, done: F)
where
    F: Fn(&[RepositoryRecord]) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if done(&controller.visible()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "downloads list never reached the expected state");
}

fn ids(records: &[RepositoryRecord]) -> Vec<i64> {
    records.iter().map(|record| record.id).collect()
}

#[tokio::test]
async fn publishes_reconciled_list_then_appends_new_downloads() {
    let fixture = Fixture::new(MockGithub::default());
    let root = fixture.root();
    let present_path = root.join("one_1.zip");
    std::fs::write(present_path.as_std_path(), b"zip").unwrap();

    let mut present = record(1, "octo", "one");
    present.local_path = Some(present_path.to_string());
    let mut missing = record(2, "octo", "two");
    missing.local_path = Some(root.join("two_2.zip").to_string());
    let mut later = record(3, "octo", "three");
    fixture.repository.persist(&present).unwrap();
    fixture.repository.persist(&missing).unwrap();
    fixture.repository.persist(&later).unwrap();

    let controller = DownloadsController::new(fixture.repository.clone());
    controller.start();
    controller.start();
    wait_for(&controller, |records| ids(records) == vec![1]).await;

    later.local_path = Some(root.join("three_3.zip").to_string());
    fixture.repository.mark_updated(&later).unwrap();
    wait_for(&controller, |records| ids(records) == vec![1, 3]).await;

    let stored = fixture.repository.record_by_id(2).unwrap().unwrap();
    assert_eq!(stored.local_path, None);
}

#[tokio::test]
async fn empty_cache_shows_nothing() {
    let fixture = Fixture::new(MockGithub::default());
    let controller = DownloadsController::new(fixture.repository.clone());
    let mut records = controller.records();
    controller.start();

    tokio::time::timeout(Duration::from_secs(2), records.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(controller.visible().is_empty());
}
