//! Execution pipeline and snapshot history engine behind the `viddy` TUI.
//!
//! The engine periodically runs a user-supplied command, records every
//! execution as an immutable [`snapshot::Snapshot`], diffs each snapshot
//! against its predecessor, and keeps the whole history in an append-only
//! [`store::HistoryStore`]. The [`controller::Controller`] couples the
//! pieces together and exposes the selection model the UI renders from.
//!
//! Nothing in this crate touches the terminal; rendering produces an
//! ANSI-annotated byte stream into a caller-provided sink.

pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod runner;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use controller::Controller;
pub use controller::ControllerHandle;
pub use controller::EngineEvent;
pub use controller::Modes;
pub use error::Result;
pub use error::VidError;
pub use scheduler::IntervalMode;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotId;
