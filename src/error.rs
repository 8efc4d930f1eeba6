// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ids::SegmentId;

/// Error produced by the block/coding layer (cheap to construct, no I/O context).
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block is full")]
    BlockFull,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("varint truncated")]
    TruncatedVarint,

    #[error("corrupt block: {0}")]
    CorruptBlock(String),
}

/// Crate-wide error type.
///
/// Mirrors the taxonomy a caller needs to branch on (see `spec.md` §7):
/// only [`Error::Io`] and [`Error::Corrupt`] are fatal to an open `Index`;
/// everything else is scoped to the failing operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("block is full")]
    BlockFull,

    #[error("builder segment {0:?} is frozen")]
    Frozen(Option<SegmentId>),

    #[error("not in transaction")]
    NotInTransaction,

    #[error("already in transaction")]
    AlreadyInTransaction,

    #[error("search exceeded its deadline")]
    TimeoutExceeded,

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("replication slot already exists: {0}")]
    ReplicationSlotExists(String),

    #[error("replication slot does not exist: {0}")]
    ReplicationSlotMissing(String),

    #[error("op does not exist: {0}")]
    OpDoesNotExist(u64),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[cfg(feature = "sqlite")]
    #[error("oplog storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        match value {
            EncodeError::Io(e) => Error::Io(e),
            EncodeError::BlockFull => Error::BlockFull,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::Io(e) => Error::Io(e),
            DecodeError::TruncatedVarint => Error::Corrupt("truncated varint".into()),
            DecodeError::CorruptBlock(msg) => Error::Corrupt(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
