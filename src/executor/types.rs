use crate::job::{GridAccount, JobId, NewTransferItem, TransferJob, TransferKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One file (or directory) finished, successfully or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileProgressEvent {
    pub source_path: String,
    pub target_path: String,
    pub is_directory: bool,
    pub succeeded: bool,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

impl FileProgressEvent {
    pub fn success(
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        is_directory: bool,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            is_directory,
            succeeded: true,
            error_message: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            is_directory: false,
            succeeded: false,
            error_message: error_message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_item(&self) -> NewTransferItem {
        NewTransferItem {
            source_path: self.source_path.clone(),
            target_path: self.target_path.clone(),
            is_directory: self.is_directory,
            is_error: !self.succeeded,
            error_message: self.error_message.clone(),
            transferred_at: self.timestamp,
        }
    }
}

/// Shared cancel flag between the coordinator and a running execution.
#[derive(Debug, Clone, Default)]
pub struct TransferControl {
    cancel_requested: Arc<AtomicBool>,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}

/// Everything an executor needs to run one job.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub job_id: JobId,
    pub kind: TransferKind,
    pub source_path: String,
    pub target_path: String,
    pub resource: String,
    pub account: GridAccount,
    /// Entries lexically at or before this path were already transferred.
    pub resume_from: Option<String>,
    pub control: TransferControl,
}

impl ExecutionRequest {
    pub fn for_job(job: &TransferJob, control: TransferControl) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            source_path: job.source_path.clone(),
            target_path: job.target_path.clone(),
            resource: job.resource.clone(),
            account: job.account.clone(),
            resume_from: job.checkpoint().map(str::to_string),
            control,
        }
    }

    pub fn is_already_transferred(&self, source_entry: &str) -> bool {
        covered_by_checkpoint(source_entry, self.resume_from.as_deref())
    }
}

pub fn covered_by_checkpoint(source_entry: &str, resume_from: Option<&str>) -> bool {
    match resume_from {
        Some(checkpoint) if !checkpoint.is_empty() => source_entry <= checkpoint,
        _ => false,
    }
}

/// Write side of the per-job progress stream.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<FileProgressEvent>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FileProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the coordinator stopped listening.
    pub fn emit(&self, event: FileProgressEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
