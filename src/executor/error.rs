use thiserror::Error;

/// Fatal outcome of one execution. Per-file problems are reported as failed
/// progress events instead.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Transfer failed: {message}")]
    Failed { message: String, trace: String },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutorError::Failed {
            message: message.into(),
            trace: String::new(),
        }
    }

    /// Diagnostic detail persisted as the job's error trace
    pub fn trace(&self) -> String {
        match self {
            ExecutorError::Failed { trace, .. } => trace.clone(),
            ExecutorError::Cancelled => String::new(),
            ExecutorError::Io(e) => format!("{e:?}"),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
