//! Queue driving the local filesystem executor end to end

#[path = "support/mod.rs"]
mod support;

use std::fs;
use std::sync::Arc;
use support::{account, wait_for_state};
use tempfile::TempDir;
use transfer_queue::coordinator::TransferCoordinator;
use transfer_queue::executor::LocalFsExecutor;
use transfer_queue::job::{ErrorStatus, JobState};
use transfer_queue::store::TransferStore;

struct Fixture {
    _dir: TempDir,
    local: std::path::PathBuf,
    grid: std::path::PathBuf,
    coordinator: TransferCoordinator,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("local");
    let grid = dir.path().join("grid");
    fs::create_dir_all(&local).unwrap();
    fs::create_dir_all(&grid).unwrap();

    let store = TransferStore::new_in_memory().await.unwrap();
    let coordinator = TransferCoordinator::new(store, Arc::new(LocalFsExecutor::new(&grid)));

    Fixture {
        _dir: dir,
        local,
        grid,
        coordinator,
    }
}

fn write_tree(root: &std::path::Path) {
    fs::create_dir_all(root.join("nested")).unwrap();
    fs::write(root.join("a.txt"), b"alpha").unwrap();
    fs::write(root.join("b.txt"), b"bravo").unwrap();
    fs::write(root.join("nested/c.txt"), b"charlie").unwrap();
}

#[tokio::test]
async fn test_put_then_get_round_trip() {
    let fx = fixture().await;
    let source = fx.local.join("project");
    write_tree(&source);

    let put = fx
        .coordinator
        .enqueue_put(
            source.to_str().unwrap(),
            "/tempZone/home/alice",
            "",
            account(),
        )
        .await
        .unwrap();
    let put = wait_for_state(&fx.coordinator, put.id, JobState::Complete).await;
    assert_eq!(put.error_status, ErrorStatus::Ok);

    let remote = fx.grid.join("tempZone/home/alice/project");
    assert_eq!(fs::read(remote.join("nested/c.txt")).unwrap(), b"charlie");

    // Root dir, nested dir and three files
    let items = fx.coordinator.store().items_for(put.id).await.unwrap();
    assert_eq!(items.len(), 5);
    assert!(items.iter().all(|i| !i.is_error));

    let download = fx.local.join("download");
    let get = fx
        .coordinator
        .enqueue_get(
            "/tempZone/home/alice/project",
            download.to_str().unwrap(),
            "",
            account(),
        )
        .await
        .unwrap();
    let get = wait_for_state(&fx.coordinator, get.id, JobState::Complete).await;
    assert_eq!(get.error_status, ErrorStatus::Ok);
    assert_eq!(
        fs::read(download.join("project/a.txt")).unwrap(),
        b"alpha"
    );
}

#[tokio::test]
async fn test_replicate_onto_resource() {
    let fx = fixture().await;
    write_tree(&fx.grid.join("tempZone/home/alice/data"));

    let job = fx
        .coordinator
        .enqueue_replicate("/tempZone/home/alice/data", "archiveResc", account())
        .await
        .unwrap();
    let job = wait_for_state(&fx.coordinator, job.id, JobState::Complete).await;
    assert_eq!(job.error_status, ErrorStatus::Ok);

    let replica = fx
        .grid
        .join(".replicas/archiveResc/tempZone/home/alice/data/b.txt");
    assert_eq!(fs::read(replica).unwrap(), b"bravo");
}

#[tokio::test]
async fn test_missing_source_fails_and_queue_moves_on() {
    let fx = fixture().await;
    let source = fx.local.join("present");
    write_tree(&source);

    let missing = fx
        .coordinator
        .enqueue_put(
            fx.local.join("absent").to_str().unwrap(),
            "/tempZone/home/alice",
            "",
            account(),
        )
        .await
        .unwrap();
    let present = fx
        .coordinator
        .enqueue_put(
            source.to_str().unwrap(),
            "/tempZone/home/alice",
            "",
            account(),
        )
        .await
        .unwrap();

    let missing = wait_for_state(&fx.coordinator, missing.id, JobState::Complete).await;
    assert_eq!(missing.error_status, ErrorStatus::Error);
    assert!(missing.global_error.contains("cannot read source"));

    let present = wait_for_state(&fx.coordinator, present.id, JobState::Complete).await;
    assert_eq!(present.error_status, ErrorStatus::Ok);
}

#[tokio::test]
async fn test_restart_skips_files_already_copied() {
    let fx = fixture().await;
    let source = fx.local.join("project");
    write_tree(&source);

    let job = fx
        .coordinator
        .enqueue_put(
            source.to_str().unwrap(),
            "/tempZone/home/alice",
            "",
            account(),
        )
        .await
        .unwrap();
    wait_for_state(&fx.coordinator, job.id, JobState::Complete).await;

    // Everything is at or before the checkpoint now
    let restarted = fx.coordinator.restart_transfer(job.id).await.unwrap();
    assert!(restarted.last_successful_path.ends_with("nested/c.txt"));
    wait_for_state(&fx.coordinator, job.id, JobState::Complete).await;

    let items = fx.coordinator.store().items_for(job.id).await.unwrap();
    assert_eq!(items.len(), 5);
}
