//! Shared fixtures for the queue integration tests

#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use transfer_queue::coordinator::TransferCoordinator;
use transfer_queue::executor::{
    ExecutionRequest, ExecutorError, ExecutorResult, FileProgressEvent, ProgressSink,
    TransferExecutor,
};
use transfer_queue::job::{GridAccount, JobId, JobState, TransferJob};
use transfer_queue::store::TransferStore;

/// Executor that "transfers" a fixed list of file names under the job's
/// source path, with optional gating and failure injection.
pub struct ScriptedExecutor {
    files: Vec<String>,
    failing_files: HashSet<String>,
    fatal_once: Mutex<HashMap<String, usize>>,
    fatal_always: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    started: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    executed: Mutex<Vec<JobId>>,
}

impl ScriptedExecutor {
    pub fn new(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            failing_files: HashSet::new(),
            fatal_once: Mutex::new(HashMap::new()),
            fatal_always: HashSet::new(),
            gate: None,
            started: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// `f01`..`fNN`, zero padded so lexical order is numeric order
    pub fn numbered(count: usize) -> Self {
        let names: Vec<String> = (1..=count).map(|i| format!("f{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::new(&refs)
    }

    /// Every execution waits for a `release()` before its first file.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Report this file name as a per-file failure.
    pub fn failing_file(mut self, name: &str) -> Self {
        self.failing_files.insert(name.to_string());
        self
    }

    /// The first execution of `source` dies after `after_files` files.
    pub fn fatal_once(self, source: &str, after_files: usize) -> Self {
        self.fatal_once.lock().insert(source.to_string(), after_files);
        self
    }

    /// Every execution of `source` dies before transferring anything.
    pub fn fatal_always(mut self, source: &str) -> Self {
        self.fatal_always.insert(source.to_string());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<JobId> {
        self.executed.lock().clone()
    }

    async fn run(&self, request: ExecutionRequest, progress: ProgressSink) -> ExecutorResult<()> {
        self.executed.lock().push(request.job_id);
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = self.transfer(&request, &progress).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn transfer(
        &self,
        request: &ExecutionRequest,
        progress: &ProgressSink,
    ) -> ExecutorResult<()> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ExecutorError::failed("gate closed"))?;
            permit.forget();
        }

        if self.fatal_always.contains(&request.source_path) {
            return Err(ExecutorError::Failed {
                message: format!("cannot reach {}", request.source_path),
                trace: "scripted failure".to_string(),
            });
        }
        let fatal_after = self.fatal_once.lock().remove(&request.source_path);

        let mut sent = 0;
        for name in &self.files {
            if request.control.is_cancel_requested() {
                return Err(ExecutorError::Cancelled);
            }

            let source = format!("{}/{}", request.source_path, name);
            if request.is_already_transferred(&source) {
                continue;
            }
            if fatal_after == Some(sent) {
                return Err(ExecutorError::failed(format!("connection lost at {source}")));
            }

            let target = format!("{}/{}", request.target_path, name);
            let event = if self.failing_files.contains(name) {
                FileProgressEvent::failure(source, target, "permission denied")
            } else {
                FileProgressEvent::success(source, target, false)
            };
            progress.emit(event);
            sent += 1;
            tokio::task::yield_now().await;
        }

        Ok(())
    }
}

impl TransferExecutor for ScriptedExecutor {
    fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'_, ExecutorResult<()>> {
        self.run(request, progress).boxed()
    }
}

pub fn account() -> GridAccount {
    GridAccount::new("grid.example.org", 1247, "alice", "tempZone", "obf")
}

pub async fn coordinator_with(executor: Arc<ScriptedExecutor>) -> TransferCoordinator {
    let store = TransferStore::new_in_memory().await.unwrap();
    TransferCoordinator::new(store, executor)
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Wait until `id` is in `state` and the worker has let go of it.
pub async fn wait_for_state(
    coordinator: &TransferCoordinator,
    id: JobId,
    state: JobState,
) -> TransferJob {
    wait_for(&format!("job {id} to reach {state}"), move || async move {
        let job = coordinator.store().find(id).await.unwrap().unwrap();
        job.state == state && coordinator.active_job_id().await != Some(id)
    })
    .await;
    coordinator.store().find(id).await.unwrap().unwrap()
}

pub async fn wait_for_processing(coordinator: &TransferCoordinator, id: JobId) {
    wait_for(&format!("job {id} to start"), move || async move {
        coordinator.active_job_id().await == Some(id)
    })
    .await;
}
