//! Metrics recorder for transfer queue operations

use crate::job::{ErrorStatus, TransferKind};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "transfer_queue_jobs_enqueued_total",
        "Total number of transfer jobs accepted into the queue"
    );
    describe_counter!(
        "transfer_queue_jobs_started_total",
        "Total number of transfer jobs handed to the executor"
    );
    describe_counter!(
        "transfer_queue_jobs_completed_total",
        "Total number of transfer jobs that ran to completion"
    );
    describe_counter!(
        "transfer_queue_jobs_failed_total",
        "Total number of transfer jobs terminated by a fatal error"
    );
    describe_counter!(
        "transfer_queue_jobs_cancelled_total",
        "Total number of transfer jobs cancelled while running"
    );
    describe_counter!(
        "transfer_queue_items_total",
        "Total number of per-file results recorded"
    );
    describe_counter!(
        "transfer_queue_item_write_failures_total",
        "Total number of per-file results that could not be persisted"
    );
    describe_counter!(
        "transfer_queue_finalize_failures_total",
        "Total number of terminal job writes that failed and were held for retry"
    );
    describe_counter!(
        "transfer_queue_jobs_purged_total",
        "Total number of finished jobs removed by purge"
    );

    describe_gauge!(
        "transfer_queue_depth",
        "Number of jobs waiting in the ENQUEUED state"
    );
    describe_gauge!(
        "transfer_queue_active_jobs",
        "Number of jobs currently being executed"
    );

    describe_histogram!(
        "transfer_queue_job_duration_seconds",
        "Wall-clock duration of one job execution"
    );
}

pub fn record_job_enqueued(kind: TransferKind) {
    counter!("transfer_queue_jobs_enqueued_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_job_started(kind: TransferKind) {
    counter!("transfer_queue_jobs_started_total", "kind" => kind.as_str()).increment(1);
    gauge!("transfer_queue_active_jobs").increment(1.0);
}

pub fn record_job_completed(kind: TransferKind, status: ErrorStatus, duration: Duration) {
    counter!(
        "transfer_queue_jobs_completed_total",
        "kind" => kind.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
    gauge!("transfer_queue_active_jobs").decrement(1.0);
    histogram!("transfer_queue_job_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_job_failed(kind: TransferKind, duration: Duration) {
    counter!("transfer_queue_jobs_failed_total", "kind" => kind.as_str()).increment(1);
    gauge!("transfer_queue_active_jobs").decrement(1.0);
    histogram!("transfer_queue_job_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_job_cancelled(kind: TransferKind) {
    counter!("transfer_queue_jobs_cancelled_total", "kind" => kind.as_str()).increment(1);
    gauge!("transfer_queue_active_jobs").decrement(1.0);
}

/// Record one per-file outcome
pub fn record_item(is_error: bool) {
    let outcome = if is_error { "error" } else { "ok" };
    counter!("transfer_queue_items_total", "outcome" => outcome).increment(1);
}

pub fn record_item_write_failure() {
    counter!("transfer_queue_item_write_failures_total").increment(1);
}

pub fn record_finalize_failure() {
    counter!("transfer_queue_finalize_failures_total").increment(1);
}

pub fn record_purged(count: u64) {
    counter!("transfer_queue_jobs_purged_total").increment(count);
}

pub fn set_queue_depth(depth: i64) {
    gauge!("transfer_queue_depth").set(depth as f64);
}

/// Times one job execution from hand-off to outcome.
pub struct JobTimer {
    kind: TransferKind,
    start_time: Instant,
}

impl JobTimer {
    pub fn start(kind: TransferKind) -> Self {
        record_job_started(kind);
        Self {
            kind,
            start_time: Instant::now(),
        }
    }

    pub fn complete(self, status: ErrorStatus) {
        record_job_completed(self.kind, status, self.start_time.elapsed());
    }

    pub fn fail(self) {
        record_job_failed(self.kind, self.start_time.elapsed());
    }

    pub fn cancel(self) {
        record_job_cancelled(self.kind);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
