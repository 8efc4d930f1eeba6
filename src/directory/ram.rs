// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Directory, RandomAccessReader, SequentialWriter};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    files: HashMap<String, Vec<u8>>,
    dirs: HashMap<String, Arc<RamDirectory>>,
}

/// Fully in-memory [`Directory`], for tests and scratch indexes. No
/// operation ever touches a real filesystem.
#[derive(Default)]
pub struct RamDirectory {
    inner: Arc<Mutex<Inner>>,
}

impl RamDirectory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct RamSequentialWriter {
    inner: Arc<Mutex<Inner>>,
    name: String,
    buf: Vec<u8>,
}

impl Write for RamSequentialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SequentialWriter for RamSequentialWriter {
    fn sync_all(&mut self) -> Result<()> {
        self.inner.lock().files.insert(self.name.clone(), self.buf.clone());
        Ok(())
    }
}

impl Drop for RamSequentialWriter {
    fn drop(&mut self) {
        // Best-effort: make the bytes visible even if the caller forgot
        // to call `sync_all` (mirrors a real filesystem's page cache
        // holding unflushed writes visible to same-process readers).
        if !self.buf.is_empty() {
            let mut inner = self.inner.lock();
            if !inner.files.contains_key(&self.name) {
                inner.files.insert(self.name.clone(), self.buf.clone());
            }
        }
    }
}

pub struct RamRandomAccessReader {
    data: Vec<u8>,
}

impl RandomAccessReader for RamRandomAccessReader {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let offset = offset as usize;
        if offset + len > self.data.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of in-memory file",
            )));
        }
        Ok(self.data[offset..offset + len].to_vec())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

impl Directory for RamDirectory {
    fn create_file(&self, name: &str) -> Result<Box<dyn SequentialWriter>> {
        Ok(Box::new(RamSequentialWriter {
            inner: self.inner.clone(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn open_read(&self, name: &str) -> Result<Arc<dyn RandomAccessReader>> {
        let inner = self.inner.lock();
        let data = inner
            .files
            .get(name)
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such in-memory file: {name}"),
                ))
            })?
            .clone();
        Ok(Arc::new(RamRandomAccessReader { data }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.lock().files.remove(name);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let data = inner.files.remove(from).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such in-memory file: {from}"),
            ))
        })?;
        inner.files.insert(to.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().files.keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.lock().files.contains_key(name))
    }

    fn sync(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    fn open_directory(&self, name: &str, create: bool) -> Result<Arc<dyn Directory>> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.dirs.get(name) {
            return Ok(existing.clone());
        }
        if !create {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory {name} does not exist"),
            )));
        }
        let sub = Arc::new(RamDirectory::default());
        inner.dirs.insert(name.to_string(), sub.clone());
        Ok(sub)
    }

    #[cfg(feature = "sqlite")]
    fn open_database(&self, _name: &str) -> Result<rusqlite::Connection> {
        Ok(rusqlite::Connection::open_in_memory()?)
    }
}
