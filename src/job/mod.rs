mod state_machine;
mod types;

pub use state_machine::JobEvent;
pub use types::{
    ErrorStatus, GridAccount, JobId, JobState, NewTransferItem, NewTransferJob, TransferItem,
    TransferJob, TransferKind, UnknownVariant,
};
