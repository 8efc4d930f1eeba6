// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component J — the directory facade.
//!
//! A thin abstraction over where segment/index/oplog bytes actually
//! live, so the storage core never talks to `std::fs` directly. Two
//! backends ship here: [`fs::FsDirectory`] (real files) and
//! [`ram::RamDirectory`] (in-memory, for tests and ephemeral indexes).
//! A directory can also be opened rooted inside another directory
//! (`open_directory`), giving [`crate::registry::MultiIndex`] one
//! sub-directory per named index without hard-coding a backend.

pub mod fs;
pub mod ram;

use crate::error::Result;
use std::io::Write;
use std::sync::Arc;

/// A plain sequential append/write stream over a not-yet-durable file.
/// `sync_all` is the fsync-equivalent durability point.
pub trait SequentialWriter: Write + Send {
    fn sync_all(&mut self) -> Result<()>;
}

/// Random access, read-only view of a file, used to pull one posting
/// block (or any other fixed `(offset, length)` slice) off disk without
/// re-reading the whole file.
pub trait RandomAccessReader: Send + Sync {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;
    fn len(&self) -> Result<u64>;
}

pub trait Directory: Send + Sync {
    /// Creates (or truncates) `name` for sequential writing.
    fn create_file(&self, name: &str) -> Result<Box<dyn SequentialWriter>>;

    /// Opens `name` for random-access reads.
    fn open_read(&self, name: &str) -> Result<Arc<dyn RandomAccessReader>>;

    fn delete_file(&self, name: &str) -> Result<()>;

    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;

    fn exists(&self, name: &str) -> Result<bool>;

    /// fsync-equivalent for a set of already-written files (and, where
    /// meaningful, the directory entry itself).
    fn sync(&self, names: &[String]) -> Result<()>;

    /// Opens (creating if requested) a directory nested inside this one,
    /// used by the multi-index registry to give each named index its own
    /// subtree of the same backend.
    fn open_directory(&self, name: &str, create: bool) -> Result<Arc<dyn Directory>>;

    /// Opens the embedded relational store backing the oplog (see
    /// `spec.md` §6, `control.db`). Only meaningful with the `sqlite`
    /// feature; returns a connection scoped to `name` within this
    /// directory.
    #[cfg(feature = "sqlite")]
    fn open_database(&self, name: &str) -> Result<rusqlite::Connection>;
}
