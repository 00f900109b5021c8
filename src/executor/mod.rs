//! The seam to whatever actually moves bytes to and from the grid.

mod error;
mod local;
mod types;

pub use error::{ExecutorError, ExecutorResult};
pub use local::LocalFsExecutor;
pub use types::{
    covered_by_checkpoint, ExecutionRequest, FileProgressEvent, ProgressSink, TransferControl,
};

use futures::future::BoxFuture;

/// Runs one put/get/replicate.
///
/// Implementations emit a [`FileProgressEvent`] per file as it finishes, skip
/// every source entry at or before `request.resume_from`, and poll
/// `request.control` between files. A fatal failure is the returned error,
/// never an event.
pub trait TransferExecutor: Send + Sync {
    fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'_, ExecutorResult<()>>;
}
