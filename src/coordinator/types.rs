use crate::job::ErrorStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunningStatus {
    #[default]
    Idle,
    Processing,
    Paused,
}

/// Aggregate queue status as last published to listeners.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub running: RunningStatus,
    pub error: ErrorStatus,
    pub paused: bool,
}
