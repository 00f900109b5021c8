use crate::coordinator::types::RunningStatus;
use crate::executor::FileProgressEvent;
use crate::job::ErrorStatus;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Observer of queue status. Called on the worker's task, so implementations
/// must return quickly or hand the event off.
pub trait StatusListener: Send + Sync {
    fn on_running_status(&self, status: RunningStatus);
    fn on_error_status(&self, status: ErrorStatus);
    fn on_file_progress(&self, event: &FileProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Arc<dyn StatusListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.insert(id, listener);
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn running_status(&self, status: RunningStatus) {
        for listener in self.snapshot() {
            listener.on_running_status(status);
        }
    }

    pub fn error_status(&self, status: ErrorStatus) {
        for listener in self.snapshot() {
            listener.on_error_status(status);
        }
    }

    pub fn file_progress(&self, event: &FileProgressEvent) {
        for listener in self.snapshot() {
            listener.on_file_progress(event);
        }
    }

    // Called without holding shard locks so a listener may (un)register.
    fn snapshot(&self) -> Vec<Arc<dyn StatusListener>> {
        self.listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Mirrors status transitions into the log.
pub struct LoggingListener;

impl StatusListener for LoggingListener {
    fn on_running_status(&self, status: RunningStatus) {
        tracing::info!("Transfer queue is now {:?}", status);
    }

    fn on_error_status(&self, status: ErrorStatus) {
        match status {
            ErrorStatus::Ok => tracing::info!("Transfer queue error status cleared"),
            other => tracing::warn!("Transfer queue error status: {}", other),
        }
    }

    fn on_file_progress(&self, event: &FileProgressEvent) {
        if event.succeeded {
            tracing::debug!("Transferred {} -> {}", event.source_path, event.target_path);
        } else {
            tracing::warn!("Failed {}: {}", event.source_path, event.error_message);
        }
    }
}
