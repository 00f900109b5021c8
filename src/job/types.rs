use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type JobId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
    Put,
    Get,
    Replicate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Enqueued,
    Processing,
    Complete,
    Cancelled,
}

impl JobState {
    /// Still owed work: waiting in line or held by the worker.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Enqueued | JobState::Processing)
    }
}

/// Error axis of a job, ordered so that `max` is the escalation rule.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

impl ErrorStatus {
    /// Combine two statuses without ever downgrading.
    pub fn escalate(self, other: ErrorStatus) -> ErrorStatus {
        self.max(other)
    }
}

/// Parse failure for the persisted enum columns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! column_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

column_enum!(TransferKind, "transfer kind", {
    Put => "PUT",
    Get => "GET",
    Replicate => "REPLICATE",
});

column_enum!(JobState, "job state", {
    Enqueued => "ENQUEUED",
    Processing => "PROCESSING",
    Complete => "COMPLETE",
    Cancelled => "CANCELLED",
});

column_enum!(ErrorStatus, "error status", {
    Ok => "OK",
    Warning => "WARNING",
    Error => "ERROR",
});

/// Account a job runs under. Captured at enqueue time and carried with the job.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridAccount {
    pub host: String,
    pub port: u16,
    pub user_name: String,
    pub zone: String,
    /// Already obfuscated by the caller; never logged.
    pub obfuscated_password: String,
}

impl fmt::Debug for GridAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridAccount")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user_name", &self.user_name)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl GridAccount {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user_name: impl Into<String>,
        zone: impl Into<String>,
        obfuscated_password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user_name: user_name.into(),
            zone: zone.into(),
            obfuscated_password: obfuscated_password.into(),
        }
    }
}

/// A job as submitted, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferJob {
    pub kind: TransferKind,
    pub source_path: String,
    pub target_path: String,
    /// Empty means the default resource.
    pub resource: String,
    pub account: GridAccount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferJob {
    pub id: JobId,
    pub kind: TransferKind,
    pub source_path: String,
    pub target_path: String,
    pub resource: String,
    pub account: GridAccount,
    pub state: JobState,
    pub error_status: ErrorStatus,
    /// Checkpoint; empty until the first file succeeds.
    pub last_successful_path: String,
    pub global_error: String,
    pub global_error_trace: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    /// Materialize a freshly enqueued job.
    pub fn enqueued(id: JobId, new: NewTransferJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: new.kind,
            source_path: new.source_path,
            target_path: new.target_path,
            resource: new.resource,
            account: new.account,
            state: JobState::Enqueued,
            error_status: ErrorStatus::Ok,
            last_successful_path: String::new(),
            global_error: String::new(),
            global_error_trace: String::new(),
            created_at,
            started_at: None,
        }
    }

    pub fn checkpoint(&self) -> Option<&str> {
        if self.last_successful_path.is_empty() {
            None
        } else {
            Some(&self.last_successful_path)
        }
    }
}

/// A file result as reported by the executor, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferItem {
    pub source_path: String,
    pub target_path: String,
    pub is_directory: bool,
    pub is_error: bool,
    pub error_message: String,
    pub transferred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferItem {
    pub id: i64,
    pub job_id: JobId,
    pub source_path: String,
    pub target_path: String,
    pub is_directory: bool,
    pub is_error: bool,
    pub error_message: String,
    pub transferred_at: DateTime<Utc>,
}
