//! Command-line interface
//!
//! Handlers for the `tinyevm` binary. Each handler prints its result and
//! returns it so it can be exercised without a terminal.

pub mod commands;

pub use commands::*;
