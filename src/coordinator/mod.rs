mod coordinator;
mod error;
mod listener;
mod types;

pub use coordinator::TransferCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use listener::{ListenerId, ListenerRegistry, LoggingListener, StatusListener};
pub use types::{QueueStatus, RunningStatus};
