//! Resource model
//!
//! The three record kinds shared by the local store, the snapshot file and
//! the remote API: cards, tasks and per-card preferences.

mod model;
mod preference;

pub use model::*;
pub use preference::*;
