use crate::coordinator::error::{CoordinatorError, CoordinatorResult};
use crate::coordinator::listener::{ListenerId, ListenerRegistry, StatusListener};
use crate::coordinator::types::{QueueStatus, RunningStatus};
use crate::executor::{
    ExecutionRequest, ExecutorError, FileProgressEvent, ProgressSink, TransferControl,
    TransferExecutor,
};
use crate::job::{
    ErrorStatus, GridAccount, JobId, JobState, NewTransferJob, TransferJob, TransferKind,
};
use crate::metrics::recorder::{self, JobTimer};
use crate::store::TransferStore;
use crate::store::StoreResult;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(50);

/// Terminal write owed to the store for a job the worker has run.
#[derive(Debug, Clone)]
enum Finalize {
    Complete(ErrorStatus),
    Cancel,
    Fail { message: String, trace: String },
}

struct ActiveJob {
    id: JobId,
    control: TransferControl,
    /// Terminal write that could not be committed. The slot stays claimed
    /// until a later claim manages to write it.
    pending: Option<Finalize>,
}

#[derive(Default)]
struct QueueControl {
    paused: bool,
    active: Option<ActiveJob>,
}

/// Owns the single worker that drains the persistent queue.
///
/// At most one job is PROCESSING at a time: claiming the next job and marking
/// it active happen under one lock. The slot is released only once the job's
/// terminal state is committed.
pub struct TransferCoordinator {
    store: Arc<TransferStore>,
    executor: Arc<dyn TransferExecutor>,
    listeners: Arc<ListenerRegistry>,
    control: Arc<Mutex<QueueControl>>,
    status: Arc<RwLock<QueueStatus>>,
}

impl TransferCoordinator {
    pub fn new(store: TransferStore, executor: Arc<dyn TransferExecutor>) -> Self {
        Self {
            store: Arc::new(store),
            executor,
            listeners: Arc::new(ListenerRegistry::new()),
            control: Arc::new(Mutex::new(QueueControl::default())),
            status: Arc::new(RwLock::new(QueueStatus::default())),
        }
    }

    pub fn store(&self) -> &TransferStore {
        &self.store
    }

    // ============== Enqueue ==============

    /// Queue a local-to-grid upload
    pub async fn enqueue_put(
        &self,
        source_path: &str,
        target_path: &str,
        resource: &str,
        account: GridAccount,
    ) -> CoordinatorResult<TransferJob> {
        require("source path", source_path)?;
        require("target path", target_path)?;
        self.enqueue(NewTransferJob {
            kind: TransferKind::Put,
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            resource: resource.to_string(),
            account,
        })
        .await
    }

    /// Queue a grid-to-local download
    pub async fn enqueue_get(
        &self,
        source_path: &str,
        target_path: &str,
        resource: &str,
        account: GridAccount,
    ) -> CoordinatorResult<TransferJob> {
        require("source path", source_path)?;
        require("target path", target_path)?;
        self.enqueue(NewTransferJob {
            kind: TransferKind::Get,
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            resource: resource.to_string(),
            account,
        })
        .await
    }

    /// Queue a copy of a grid path onto `resource`
    pub async fn enqueue_replicate(
        &self,
        source_path: &str,
        resource: &str,
        account: GridAccount,
    ) -> CoordinatorResult<TransferJob> {
        require("source path", source_path)?;
        require("resource", resource)?;
        self.enqueue(NewTransferJob {
            kind: TransferKind::Replicate,
            source_path: source_path.to_string(),
            target_path: String::new(),
            resource: resource.to_string(),
            account,
        })
        .await
    }

    async fn enqueue(&self, new_job: NewTransferJob) -> CoordinatorResult<TransferJob> {
        require("account host", &new_job.account.host)?;
        require("account user name", &new_job.account.user_name)?;
        require("account zone", &new_job.account.zone)?;

        let id = self.store.enqueue(&new_job).await?;
        let job = self
            .store
            .find(id)
            .await?
            .ok_or(CoordinatorError::TransferNotFound(id))?;

        tracing::info!(
            "Enqueued {} job {}: {} -> {}",
            job.kind,
            job.id,
            job.source_path,
            job.target_path
        );
        recorder::record_job_enqueued(job.kind);

        // The job is durable at this point; a failure to start it is retried
        // by the next trigger.
        if let Err(e) = self.process_next_if_idle().await {
            tracing::warn!("Could not start queue after enqueue of job {}: {}", id, e);
        }
        self.refresh_queue_depth().await;

        Ok(job)
    }

    // ============== Queue control ==============

    /// Stop starting new jobs. A job already running is left to finish.
    pub async fn pause(&self) {
        let mut control = self.control.lock().await;
        if control.paused {
            return;
        }
        control.paused = true;
        self.status.write().paused = true;
        tracing::info!("Transfer queue paused");
        if control.active.is_none() {
            self.set_running(RunningStatus::Paused);
        }
    }

    pub async fn resume(&self) -> CoordinatorResult<Option<TransferJob>> {
        {
            let mut control = self.control.lock().await;
            if control.paused {
                control.paused = false;
                self.status.write().paused = false;
                tracing::info!("Transfer queue resumed");
                if control.active.is_none() {
                    self.set_running(RunningStatus::Idle);
                }
            }
        }
        self.process_next_if_idle().await
    }

    /// Start the oldest ENQUEUED job unless paused or already busy.
    ///
    /// Returns the job that was started, if any. Safe to call concurrently;
    /// only one caller can win the claim.
    pub async fn process_next_if_idle(&self) -> CoordinatorResult<Option<TransferJob>> {
        match self.claim_next(None).await? {
            Some((job, control)) => {
                let worker = self.clone();
                let first = job.clone();
                tokio::spawn(async move {
                    worker.drive(first, control).await;
                });
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    pub async fn active_job_id(&self) -> Option<JobId> {
        self.control.lock().await.active.as_ref().map(|a| a.id)
    }

    // ============== Job control ==============

    /// Re-run a finished or cancelled job from its checkpoint
    pub async fn restart_transfer(&self, id: JobId) -> CoordinatorResult<TransferJob> {
        self.ensure_not_active(id).await?;
        let job = self.store.restart(id).await?;
        tracing::info!("Restarted transfer job {}", id);
        self.after_requeue().await;
        Ok(job)
    }

    /// Re-run a finished or cancelled job from scratch, discarding its items
    pub async fn resubmit_transfer(&self, id: JobId) -> CoordinatorResult<TransferJob> {
        self.ensure_not_active(id).await?;
        let job = self.store.resubmit(id).await?;
        tracing::info!("Resubmitted transfer job {}", id);
        self.after_requeue().await;
        Ok(job)
    }

    /// Cancel a queued or running job. A running job stops at the next file
    /// boundary.
    pub async fn set_transfer_as_cancelled(&self, id: JobId) -> CoordinatorResult<TransferJob> {
        let control = self.control.lock().await;
        let job = self.store.cancel(id).await?;
        if job.state == JobState::Cancelled {
            if let Some(active) = control.active.as_ref().filter(|a| a.id == id) {
                active.control.request_cancel();
            }
            tracing::info!("Cancelled transfer job {}", id);
        }
        drop(control);

        self.refresh_queue_depth().await;
        Ok(job)
    }

    /// Remove every COMPLETE job and its items
    pub async fn purge(&self) -> CoordinatorResult<u64> {
        let purged = self.store.purge().await?;
        tracing::info!("Purged {} completed transfer jobs", purged);
        recorder::record_purged(purged);
        Ok(purged)
    }

    /// Requeue jobs a previous process left PROCESSING and load the error
    /// status from what is persisted. Call once before processing starts.
    pub async fn recover(&self) -> CoordinatorResult<u64> {
        let recovered = self.store.recover_interrupted().await?;
        if recovered > 0 {
            tracing::warn!("Requeued {} interrupted transfer jobs", recovered);
        }
        self.refresh_error_status().await?;
        self.refresh_queue_depth().await;
        Ok(recovered)
    }

    // ============== Status ==============

    pub fn register_listener(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = self.listeners.register(listener);
        tracing::debug!("Registered status listener {:?}", id);
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.unregister(id);
        if removed {
            tracing::debug!("Unregistered status listener {:?}", id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn status(&self) -> QueueStatus {
        *self.status.read()
    }

    pub fn running_status(&self) -> RunningStatus {
        self.status.read().running
    }

    pub fn error_status(&self) -> ErrorStatus {
        self.status.read().error
    }

    // ============== Worker ==============

    async fn claim_next(
        &self,
        finished: Option<JobId>,
    ) -> CoordinatorResult<Option<(TransferJob, TransferControl)>> {
        let mut control = self.control.lock().await;

        let pending = control
            .active
            .as_ref()
            .and_then(|a| a.pending.clone().map(|f| (a.id, f)));
        if let Some((id, finalize)) = pending {
            self.apply_finalize(id, &finalize).await?;
            control.active = None;
            self.set_running(if control.paused {
                RunningStatus::Paused
            } else {
                RunningStatus::Idle
            });
        }

        if let Some(id) = finished {
            if control.active.as_ref().is_some_and(|a| a.id == id) {
                control.active = None;
            }
            self.set_running(if control.paused {
                RunningStatus::Paused
            } else {
                RunningStatus::Idle
            });
        }

        if control.active.is_some() {
            return Ok(None);
        }
        if control.paused {
            self.set_running(RunningStatus::Paused);
            return Ok(None);
        }

        let Some(job) = self.store.dequeue_next().await? else {
            self.set_running(RunningStatus::Idle);
            return Ok(None);
        };

        let transfer_control = TransferControl::new();
        control.active = Some(ActiveJob {
            id: job.id,
            control: transfer_control.clone(),
            pending: None,
        });
        self.set_running(RunningStatus::Processing);

        Ok(Some((job, transfer_control)))
    }

    async fn drive(self, first: TransferJob, control: TransferControl) {
        let mut next = Some((first, control));

        while let Some((job, control)) = next.take() {
            let id = job.id;
            let finalize = self.run_job(job, control).await;

            if let Err(e) = self.finalize_with_retry(id, &finalize).await {
                tracing::error!(
                    "Could not finalize transfer job {} after {} attempts, holding the queue: {}",
                    id,
                    FINALIZE_ATTEMPTS,
                    e
                );
                recorder::record_finalize_failure();
                self.hold_pending(id, finalize).await;
                break;
            }

            next = match self.claim_next(Some(id)).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!("Failed to claim next transfer job: {}", e);
                    None
                }
            };
            self.refresh_queue_depth().await;
        }
    }

    async fn run_job(&self, job: TransferJob, control: TransferControl) -> Finalize {
        tracing::info!(
            "Processing {} job {}: {} -> {} (resume from {:?})",
            job.kind,
            job.id,
            job.source_path,
            job.target_path,
            job.checkpoint()
        );
        let timer = JobTimer::start(job.kind);

        let (sink, mut rx) = ProgressSink::channel();
        let request = ExecutionRequest::for_job(&job, control);
        let executor = self.executor.clone();
        let handle = tokio::spawn(async move { executor.execute(request, sink).await });

        let mut file_errors = false;
        while let Some(event) = rx.recv().await {
            file_errors |= !self.record_progress(job.id, event).await;
        }

        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(ExecutorError::failed(format!("executor task aborted: {e}"))),
        };

        match outcome {
            Ok(()) => {
                let status = if file_errors {
                    ErrorStatus::Warning
                } else {
                    ErrorStatus::Ok
                };
                timer.complete(status);
                Finalize::Complete(status)
            }
            Err(ExecutorError::Cancelled) => {
                // Normally already CANCELLED via set_transfer_as_cancelled.
                tracing::info!("Transfer job {} stopped after cancellation", job.id);
                timer.cancel();
                Finalize::Cancel
            }
            Err(e) => {
                let message = match &e {
                    ExecutorError::Failed { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::error!("Transfer job {} failed: {}", job.id, message);
                self.escalate_error(ErrorStatus::Error).await;
                timer.fail();
                Finalize::Fail {
                    message,
                    trace: e.trace(),
                }
            }
        }
    }

    async fn apply_finalize(&self, id: JobId, finalize: &Finalize) -> StoreResult<TransferJob> {
        let done = match finalize {
            Finalize::Complete(status) => self.store.mark_complete(id, *status).await?,
            Finalize::Cancel => self.store.cancel(id).await?,
            Finalize::Fail { message, trace } => {
                self.store.mark_error_and_terminate(id, message, trace).await?
            }
        };
        tracing::info!(
            "Transfer job {} finished: {} / {}",
            done.id,
            done.state,
            done.error_status
        );
        Ok(done)
    }

    async fn finalize_with_retry(&self, id: JobId, finalize: &Finalize) -> StoreResult<()> {
        let mut backoff = FINALIZE_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.apply_finalize(id, finalize).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(
                        "Finalizing transfer job {} failed (attempt {}): {}",
                        id,
                        attempt,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Keep the slot claimed so nothing else is dequeued while the store
    /// still shows this job PROCESSING.
    async fn hold_pending(&self, id: JobId, finalize: Finalize) {
        let mut control = self.control.lock().await;
        if let Some(active) = control.active.as_mut().filter(|a| a.id == id) {
            active.pending = Some(finalize);
        }
    }

    /// Persist one file event. Returns false when the item is a failure or
    /// could not be written, either of which leaves the job in WARNING.
    async fn record_progress(&self, job_id: JobId, event: FileProgressEvent) -> bool {
        let item = event.to_item();
        let mut clean = !item.is_error;
        if let Err(e) = self.store.append_item(job_id, &item).await {
            tracing::error!(
                "Failed to record item {} for transfer job {}: {}",
                item.source_path,
                job_id,
                e
            );
            recorder::record_item_write_failure();
            clean = false;
        }
        recorder::record_item(item.is_error);
        if !clean {
            self.escalate_error(ErrorStatus::Warning).await;
        }
        self.listeners.file_progress(&event);
        clean
    }

    // ============== Internals ==============

    async fn ensure_not_active(&self, id: JobId) -> CoordinatorResult<()> {
        if self.active_job_id().await == Some(id) {
            return Err(CoordinatorError::TransferActive(id));
        }
        Ok(())
    }

    async fn after_requeue(&self) {
        if let Err(e) = self.refresh_error_status().await {
            tracing::warn!("Could not recompute queue error status: {}", e);
        }
        if let Err(e) = self.process_next_if_idle().await {
            tracing::warn!("Could not start queue after requeue: {}", e);
        }
        self.refresh_queue_depth().await;
    }

    /// Recompute the aggregate error status from the persisted jobs.
    /// Runs under the control lock, like `escalate_error`.
    async fn refresh_error_status(&self) -> CoordinatorResult<()> {
        let _control = self.control.lock().await;
        let status = if !self.store.error_queue().await?.is_empty() {
            ErrorStatus::Error
        } else if !self.store.warning_queue().await?.is_empty() {
            ErrorStatus::Warning
        } else {
            ErrorStatus::Ok
        };
        self.set_error(status);
        Ok(())
    }

    async fn refresh_queue_depth(&self) {
        match self.store.count_in_state(JobState::Enqueued).await {
            Ok(depth) => recorder::set_queue_depth(depth),
            Err(e) => tracing::debug!("Could not read queue depth: {}", e),
        }
    }

    fn set_running(&self, running: RunningStatus) {
        let changed = {
            let mut status = self.status.write();
            let changed = status.running != running;
            status.running = running;
            changed
        };
        if changed {
            self.listeners.running_status(running);
        }
    }

    async fn escalate_error(&self, error: ErrorStatus) {
        let _control = self.control.lock().await;
        let current = self.status.read().error;
        self.set_error(current.escalate(error));
    }

    fn set_error(&self, error: ErrorStatus) {
        let changed = {
            let mut status = self.status.write();
            let changed = status.error != error;
            status.error = error;
            changed
        };
        if changed {
            self.listeners.error_status(error);
        }
    }
}

impl Clone for TransferCoordinator {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
            listeners: self.listeners.clone(),
            control: self.control.clone(),
            status: self.status.clone(),
        }
    }
}

fn require(field: &str, value: &str) -> CoordinatorResult<()> {
    if value.trim().is_empty() {
        return Err(CoordinatorError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
