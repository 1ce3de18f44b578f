//! Call dispatch
//!
//! This module provides:
//! - The executor that runs frames against a checkpointed overlay
//! - Store providers for the persistent and ephemeral lifetimes
//! - The dispatcher exposing deploy and call

pub mod dispatcher;
pub mod executor;
pub mod provider;

pub use dispatcher::{call_with_snapshot, CallRequest, DispatchError, Dispatcher, Receipt};
pub use executor::Executor;
pub use provider::{SnapshotProvider, StoreProvider};
