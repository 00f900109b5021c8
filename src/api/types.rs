use crate::coordinator::{QueueStatus, RunningStatus};
use crate::executor::FileProgressEvent;
use crate::job::{
    ErrorStatus, GridAccount, JobId, JobState, TransferItem, TransferJob, TransferKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    1247
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRequest {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user_name: String,
    pub zone: String,
    #[serde(default)]
    pub obfuscated_password: String,
}

impl From<AccountRequest> for GridAccount {
    fn from(req: AccountRequest) -> Self {
        GridAccount::new(
            req.host,
            req.port,
            req.user_name,
            req.zone,
            req.obfuscated_password,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueTransferRequest {
    pub kind: TransferKind,
    pub source_path: String,
    /// Ignored for REPLICATE
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub resource: String,
    pub account: AccountRequest,
}

/// Account as shown to clients; the password never leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSummary {
    pub host: String,
    pub port: u16,
    pub user_name: String,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferJobResponse {
    pub id: JobId,
    pub kind: TransferKind,
    pub source_path: String,
    pub target_path: String,
    pub resource: String,
    pub account: AccountSummary,
    pub state: JobState,
    pub error_status: ErrorStatus,
    pub last_successful_path: String,
    pub global_error: String,
    pub global_error_trace: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<TransferJob> for TransferJobResponse {
    fn from(job: TransferJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            source_path: job.source_path,
            target_path: job.target_path,
            resource: job.resource,
            account: AccountSummary {
                host: job.account.host,
                port: job.account.port,
                user_name: job.account.user_name,
                zone: job.account.zone,
            },
            state: job.state,
            error_status: job.error_status,
            last_successful_path: job.last_successful_path,
            global_error: job.global_error,
            global_error_trace: job.global_error_trace,
            created_at: job.created_at,
            started_at: job.started_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueView {
    #[default]
    Current,
    Recent,
    Errors,
    Warnings,
    Last,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTransfersQuery {
    #[serde(default)]
    pub view: QueueView,
    /// Only used by the `last` view
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTransfersResponse {
    pub view: QueueView,
    pub transfers: Vec<TransferJobResponse>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub errors_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItemsResponse {
    pub job_id: JobId,
    pub items: Vec<TransferItem>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub running: RunningStatus,
    pub error: ErrorStatus,
    pub paused: bool,
    pub active_job: Option<JobId>,
    pub enqueued: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Pushed to every WebSocket client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum StatusEvent {
    Snapshot(QueueStatus),
    RunningStatusChanged { status: RunningStatus },
    ErrorStatusChanged { status: ErrorStatus },
    FileProgress(FileProgressEvent),
}
