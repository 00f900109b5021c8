//! End-to-end queue behavior against a scripted executor
//!
//! Run with: cargo test --test queue_properties

#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;
use support::{
    account, coordinator_with, wait_for_processing, wait_for_state, ScriptedExecutor,
};
use transfer_queue::coordinator::{CoordinatorError, RunningStatus, TransferCoordinator};
use transfer_queue::job::{ErrorStatus, JobState, NewTransferItem, NewTransferJob, TransferKind};
use transfer_queue::store::TransferStore;

fn put_job(source: &str) -> NewTransferJob {
    NewTransferJob {
        kind: TransferKind::Put,
        source_path: source.to_string(),
        target_path: "/tempZone/home/alice".to_string(),
        resource: String::new(),
        account: account(),
    }
}

fn ok_item(source: &str) -> NewTransferItem {
    NewTransferItem {
        source_path: source.to_string(),
        target_path: format!("/tempZone/home/alice{source}"),
        is_directory: false,
        is_error: false,
        error_message: String::new(),
        transferred_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_checkpoint_only_moves_forward() {
    let store = TransferStore::new_in_memory().await.unwrap();
    let id = store.enqueue(&put_job("/src")).await.unwrap();
    store.dequeue_next().await.unwrap();

    let mut previous = String::new();
    for path in ["/src/a", "/src/b", "/src/a", "/src/c"] {
        let (job, _) = store.append_item(id, &ok_item(path)).await.unwrap();
        assert!(job.last_successful_path >= previous);
        previous = job.last_successful_path;
    }
    assert_eq!(previous, "/src/c");

    // Restart keeps it, resubmit clears it
    store.mark_complete(id, ErrorStatus::Ok).await.unwrap();
    let restarted = store.restart(id).await.unwrap();
    assert_eq!(restarted.last_successful_path, "/src/c");

    store.dequeue_next().await.unwrap();
    store.mark_complete(id, ErrorStatus::Ok).await.unwrap();
    let resubmitted = store.resubmit(id).await.unwrap();
    assert_eq!(resubmitted.last_successful_path, "");
}

#[tokio::test]
async fn test_restart_resumes_after_checkpoint() {
    let executor = Arc::new(ScriptedExecutor::numbered(10).fatal_once("/src", 3));
    let coordinator = coordinator_with(executor.clone()).await;

    let job = coordinator
        .enqueue_put("/src", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let failed = wait_for_state(&coordinator, job.id, JobState::Complete).await;
    assert_eq!(failed.error_status, ErrorStatus::Error);
    assert_eq!(failed.last_successful_path, "/src/f03");
    assert_eq!(coordinator.store().items_for(job.id).await.unwrap().len(), 3);

    coordinator.restart_transfer(job.id).await.unwrap();
    let done = wait_for_state(&coordinator, job.id, JobState::Complete).await;
    assert_eq!(done.error_status, ErrorStatus::Ok);
    assert_eq!(done.last_successful_path, "/src/f10");

    let items = coordinator.store().items_for(job.id).await.unwrap();
    assert_eq!(items.len(), 10);
    let resumed: Vec<&str> = items[3..].iter().map(|i| i.source_path.as_str()).collect();
    assert_eq!(resumed.first(), Some(&"/src/f04"));
    assert_eq!(resumed.len(), 7);
    assert_eq!(executor.executed(), vec![job.id, job.id]);
}

#[tokio::test]
async fn test_running_job_cannot_be_requeued() {
    let executor = Arc::new(ScriptedExecutor::numbered(2).gated());
    let coordinator = coordinator_with(executor.clone()).await;

    let job = coordinator
        .enqueue_put("/busy", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    wait_for_processing(&coordinator, job.id).await;

    let err = coordinator.restart_transfer(job.id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::TransferActive(id) if id == job.id));
    let err = coordinator.resubmit_transfer(job.id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::TransferActive(_)));

    executor.release();
    let done = wait_for_state(&coordinator, job.id, JobState::Complete).await;
    assert_eq!(done.error_status, ErrorStatus::Ok);
    assert_eq!(executor.executed(), vec![job.id]);
}

#[tokio::test]
async fn test_cancel_is_terminal_and_idempotent() {
    let executor = Arc::new(ScriptedExecutor::numbered(3).gated());
    let coordinator = coordinator_with(executor.clone()).await;

    // COMPLETE stays COMPLETE
    let first = coordinator
        .enqueue_put("/done", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    executor.release();
    wait_for_state(&coordinator, first.id, JobState::Complete).await;
    let still = coordinator
        .set_transfer_as_cancelled(first.id)
        .await
        .unwrap();
    assert_eq!(still.state, JobState::Complete);

    // PROCESSING becomes CANCELLED and the executor stops
    let running = coordinator
        .enqueue_put("/running", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let queued = coordinator
        .enqueue_put("/queued", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    wait_for_processing(&coordinator, running.id).await;

    coordinator.pause().await;
    let cancelled = coordinator
        .set_transfer_as_cancelled(running.id)
        .await
        .unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    executor.release();

    let cancelled = wait_for_state(&coordinator, running.id, JobState::Cancelled).await;
    assert_eq!(cancelled.error_status, ErrorStatus::Ok);
    assert!(coordinator
        .store()
        .items_for(running.id)
        .await
        .unwrap()
        .is_empty());

    // ENQUEUED becomes CANCELLED and is never started
    let cancelled = coordinator
        .set_transfer_as_cancelled(queued.id)
        .await
        .unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    coordinator.resume().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!executor.executed().contains(&queued.id));

    let again = coordinator
        .set_transfer_as_cancelled(queued.id)
        .await
        .unwrap();
    assert_eq!(again.state, JobState::Cancelled);
}

#[tokio::test]
async fn test_purge_removes_only_complete_jobs() {
    let store = TransferStore::new_in_memory().await.unwrap();
    let processing = store.enqueue(&put_job("/a")).await.unwrap();
    let ok = store.enqueue(&put_job("/b")).await.unwrap();
    let failed = store.enqueue(&put_job("/c")).await.unwrap();

    store.mark_processing(ok).await.unwrap();
    store.mark_complete(ok, ErrorStatus::Ok).await.unwrap();
    store
        .mark_error_and_terminate(failed, "boom", "trace")
        .await
        .unwrap();
    store.mark_processing(processing).await.unwrap();

    assert_eq!(store.purge().await.unwrap(), 2);
    assert!(store.find(ok).await.unwrap().is_none());
    assert!(store.find(failed).await.unwrap().is_none());
    let kept = store.find(processing).await.unwrap().unwrap();
    assert_eq!(kept.state, JobState::Processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_claim_one_job() {
    let executor = Arc::new(ScriptedExecutor::numbered(2).gated());
    let coordinator = coordinator_with(executor.clone()).await;

    // Written straight to the store so no trigger has fired yet
    let a = coordinator.store().enqueue(&put_job("/a")).await.unwrap();
    let b = coordinator.store().enqueue(&put_job("/b")).await.unwrap();

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.process_next_if_idle().await.unwrap() }
    });
    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.process_next_if_idle().await.unwrap() }
    });
    let claimed: Vec<_> = [first.await.unwrap(), second.await.unwrap()]
        .into_iter()
        .flatten()
        .collect();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, a);
    let processing = coordinator
        .store()
        .count_in_state(JobState::Processing)
        .await
        .unwrap();
    assert_eq!(processing, 1);

    executor.release();
    executor.release();
    wait_for_state(&coordinator, a, JobState::Complete).await;
    wait_for_state(&coordinator, b, JobState::Complete).await;

    assert_eq!(executor.executed(), vec![a, b]);
    assert_eq!(executor.max_running(), 1);
}

#[tokio::test]
async fn test_pause_lets_running_job_finish() {
    let executor = Arc::new(ScriptedExecutor::numbered(2).gated());
    let coordinator = coordinator_with(executor.clone()).await;

    let a = coordinator
        .enqueue_put("/a", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let b = coordinator
        .enqueue_put("/b", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    wait_for_processing(&coordinator, a.id).await;

    coordinator.pause().await;
    assert_eq!(coordinator.running_status(), RunningStatus::Processing);
    executor.release();

    let done = wait_for_state(&coordinator, a.id, JobState::Complete).await;
    assert_eq!(done.error_status, ErrorStatus::Ok);
    assert_eq!(coordinator.running_status(), RunningStatus::Paused);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiting = coordinator.store().find(b.id).await.unwrap().unwrap();
    assert_eq!(waiting.state, JobState::Enqueued);

    let started = coordinator.resume().await.unwrap();
    assert_eq!(started.map(|j| j.id), Some(b.id));
    executor.release();
    wait_for_state(&coordinator, b.id, JobState::Complete).await;
}

#[tokio::test]
async fn test_resubmit_clears_history() {
    let executor = Arc::new(ScriptedExecutor::numbered(3));
    let coordinator = coordinator_with(executor.clone()).await;

    let job = coordinator
        .enqueue_put("/src", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let done = wait_for_state(&coordinator, job.id, JobState::Complete).await;
    assert_eq!(done.last_successful_path, "/src/f03");
    assert_eq!(coordinator.store().items_for(job.id).await.unwrap().len(), 3);

    coordinator.pause().await;
    let resubmitted = coordinator.resubmit_transfer(job.id).await.unwrap();
    assert_eq!(resubmitted.state, JobState::Enqueued);
    assert_eq!(resubmitted.last_successful_path, "");
    assert!(coordinator
        .store()
        .items_for(job.id)
        .await
        .unwrap()
        .is_empty());

    // A full re-run transfers everything again
    coordinator.resume().await.unwrap();
    wait_for_state(&coordinator, job.id, JobState::Complete).await;
    assert_eq!(coordinator.store().items_for(job.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_job_does_not_block_queue() {
    let executor = Arc::new(ScriptedExecutor::numbered(2).fatal_always("/bad"));
    let coordinator = coordinator_with(executor.clone()).await;

    let bad = coordinator
        .enqueue_put("/bad", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let good = coordinator
        .enqueue_put("/good", "/tempZone/home/alice", "", account())
        .await
        .unwrap();

    let bad = wait_for_state(&coordinator, bad.id, JobState::Complete).await;
    let good = wait_for_state(&coordinator, good.id, JobState::Complete).await;

    assert_eq!(bad.error_status, ErrorStatus::Error);
    assert_eq!(bad.global_error, "cannot reach /bad");
    assert_eq!(bad.global_error_trace, "scripted failure");
    assert_eq!(good.error_status, ErrorStatus::Ok);
    assert_eq!(coordinator.error_status(), ErrorStatus::Error);

    let errors = coordinator.store().error_queue().await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, bad.id);
}

#[tokio::test]
async fn test_file_failure_completes_with_warning() {
    let executor = Arc::new(ScriptedExecutor::numbered(3).failing_file("f02"));
    let coordinator = coordinator_with(executor.clone()).await;

    let job = coordinator
        .enqueue_put("/src", "/tempZone/home/alice", "", account())
        .await
        .unwrap();
    let done = wait_for_state(&coordinator, job.id, JobState::Complete).await;

    assert_eq!(done.error_status, ErrorStatus::Warning);
    assert_eq!(done.last_successful_path, "/src/f03");
    let errors = coordinator.store().error_items_for(job.id).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source_path, "/src/f02");
    assert_eq!(coordinator.error_status(), ErrorStatus::Warning);

    // Clearing the only warning job resets the aggregate status
    coordinator.pause().await;
    coordinator.resubmit_transfer(job.id).await.unwrap();
    assert_eq!(coordinator.error_status(), ErrorStatus::Ok);
}

#[tokio::test]
async fn test_interrupted_job_resumes_after_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());

    let id = {
        let store = TransferStore::new(&url).await.unwrap();
        let id = store.enqueue(&put_job("/src")).await.unwrap();
        store.dequeue_next().await.unwrap();
        store.append_item(id, &ok_item("/src/f01")).await.unwrap();
        store.append_item(id, &ok_item("/src/f02")).await.unwrap();
        store.close().await;
        id
    };

    let executor = Arc::new(ScriptedExecutor::numbered(5));
    let store = TransferStore::new(&url).await.unwrap();
    let coordinator = TransferCoordinator::new(store, executor.clone());

    assert_eq!(coordinator.recover().await.unwrap(), 1);
    let recovered = coordinator.store().find(id).await.unwrap().unwrap();
    assert_eq!(recovered.state, JobState::Enqueued);
    assert_eq!(recovered.last_successful_path, "/src/f02");

    coordinator.process_next_if_idle().await.unwrap();
    wait_for_state(&coordinator, id, JobState::Complete).await;
    assert_eq!(coordinator.store().items_for(id).await.unwrap().len(), 5);
    assert_eq!(coordinator.running_status(), RunningStatus::Idle);
}
