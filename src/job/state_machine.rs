use crate::job::types::{ErrorStatus, JobState, TransferJob};
use chrono::{DateTime, Utc};

/// Everything that can happen to a persisted job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent<'a> {
    Dequeued { at: DateTime<Utc> },
    Completed(ErrorStatus),
    Failed { message: &'a str, trace: &'a str },
    Cancelled,
    Restarted,
    Resubmitted,
    /// The process died while the job was PROCESSING.
    Interrupted,
    FileSucceeded { path: &'a str },
    FileFailed,
}

impl TransferJob {
    /// Apply an event in place. Returns false when the event is a no-op for
    /// the current state, in which case the job is left untouched.
    pub fn apply(&mut self, event: JobEvent<'_>) -> bool {
        match (self.state, event) {
            (JobState::Enqueued, JobEvent::Dequeued { at }) => {
                self.state = JobState::Processing;
                self.started_at = Some(at);
                true
            }

            (JobState::Processing, JobEvent::Completed(status)) => {
                self.state = JobState::Complete;
                self.error_status = self.error_status.escalate(status);
                true
            }

            // A cancel request raced the executor; keep CANCELLED.
            (JobState::Cancelled, JobEvent::Completed(status)) => {
                let escalated = self.error_status.escalate(status);
                let changed = escalated != self.error_status;
                self.error_status = escalated;
                changed
            }

            (state, JobEvent::Failed { message, trace }) if state.is_pending() => {
                self.state = JobState::Complete;
                self.record_failure(message, trace);
                true
            }

            (JobState::Cancelled, JobEvent::Failed { message, trace }) => {
                self.record_failure(message, trace);
                true
            }

            (state, JobEvent::Cancelled) if state.is_pending() => {
                self.state = JobState::Cancelled;
                true
            }

            // Same attempt continues: checkpoint, items and error status survive.
            (JobState::Processing, JobEvent::Interrupted) => {
                self.state = JobState::Enqueued;
                self.started_at = None;
                true
            }

            // The executor still owns a PROCESSING job's checkpoint.
            (JobState::Processing, JobEvent::Restarted | JobEvent::Resubmitted) => false,

            (_, JobEvent::Restarted) => {
                self.reset_attempt();
                true
            }

            (_, JobEvent::Resubmitted) => {
                self.reset_attempt();
                self.last_successful_path.clear();
                true
            }

            (_, JobEvent::FileSucceeded { path }) => self.advance_checkpoint(path),

            (_, JobEvent::FileFailed) => {
                let escalated = self.error_status.escalate(ErrorStatus::Warning);
                let changed = escalated != self.error_status;
                self.error_status = escalated;
                changed
            }

            _ => false,
        }
    }

    fn record_failure(&mut self, message: &str, trace: &str) {
        self.error_status = ErrorStatus::Error;
        self.global_error = message.to_string();
        self.global_error_trace = trace.to_string();
    }

    fn reset_attempt(&mut self) {
        self.state = JobState::Enqueued;
        self.error_status = ErrorStatus::Ok;
        self.global_error.clear();
        self.global_error_trace.clear();
        self.started_at = None;
    }

    /// The checkpoint only moves forward.
    fn advance_checkpoint(&mut self, path: &str) -> bool {
        if path.is_empty() || path <= self.last_successful_path.as_str() {
            return false;
        }
        self.last_successful_path = path.to_string();
        true
    }
}
