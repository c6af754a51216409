//! Local board state
//!
//! This module provides the in-memory store that owns the current session's
//! cards, tasks and preferences, and the JSON snapshot file it is persisted to.

mod allocator;
mod local;
mod snapshot;

pub use local::LocalStore;
pub use snapshot::{Snapshot, SnapshotFile};
