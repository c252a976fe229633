//! Memory map synchronization
//!
//! Wires the query negotiator, the record stream, the marker reconciler and
//! the viewport fitter into one [`SyncController`].

pub mod controller;

pub use controller::{SyncController, SyncError, SyncStatus};
