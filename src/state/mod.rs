//! Account state
//!
//! This module provides:
//! - Account records and logs
//! - The in-memory account store and its snapshot form
//! - A mutex-guarded shared store with a process-wide persistent instance
//! - The checkpointed overlay execution runs against

pub mod account;
pub mod overlay;
pub mod shared;
pub mod snapshot;
pub mod store;

pub use account::{Account, AccountInfo, Log};
pub use overlay::{ChangeSet, Overlay, StateError};
pub use shared::SharedStore;
pub use snapshot::{Snapshot, SnapshotError};
pub use store::MemoryStore;
