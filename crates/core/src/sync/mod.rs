//! Synchronization with the remote board server

mod coordinator;
mod diff;
mod dispatcher;
mod remote;
#[cfg(test)]
mod testing;

pub use coordinator::{plan_operations, SyncConfig, SyncCoordinator, SyncReport, SyncState};
pub use diff::{diff, index_by_id, Diff, SnapshotDiff};
pub use dispatcher::{Dispatcher, JobId, JobPoll};
pub use remote::{RemoteApi, RemoteOperation, RemoteOutput};
