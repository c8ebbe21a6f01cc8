use std::io;

use thiserror::Error;

use crate::snapshot::SnapshotId;

pub type Result<T> = std::result::Result<T, VidError>;

/// Errors surfaced by the engine. The startup kinds (`NoCommand`,
/// `IntervalTooSmall`, `IntervalParse`, `ConfigRead`) are fatal before the
/// UI starts; everything else is recoverable and must not abort the event
/// loop.
#[derive(Debug, Error)]
pub enum VidError {
    #[error("command is required")]
    NoCommand,

    #[error("interval too small")]
    IntervalTooSmall,

    #[error("cannot parse {0:?} as interval")]
    IntervalParse(String),

    #[error("cannot read config file: {0}")]
    ConfigRead(#[source] toml::de::Error),

    #[error("cannot parse key: {0:?}")]
    KeyParse(String),

    #[error("cannot find the snapshot: {0}")]
    SnapshotMissing(SnapshotId),

    #[error("not completed yet")]
    NotCompletedYet,

    #[error("failed to start command: {0}")]
    CommandStartFailed(#[source] io::Error),

    #[error("failed to wait for command: {0}")]
    ChildWaitFailed(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}
