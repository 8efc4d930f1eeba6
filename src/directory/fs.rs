// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Directory, RandomAccessReader, SequentialWriter};
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

pub struct FsSequentialWriter {
    inner: std::io::BufWriter<File>,
}

impl Write for FsSequentialWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl SequentialWriter for FsSequentialWriter {
    fn sync_all(&mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;
        Ok(())
    }
}

pub struct FsRandomAccessReader {
    file: std::sync::Mutex<File>,
}

impl RandomAccessReader for FsRandomAccessReader {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.lock().expect("fs file lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn len(&self) -> Result<u64> {
        let file = self.file.lock().expect("fs file lock poisoned");
        Ok(file.metadata()?.len())
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, name: &str) -> Result<Box<dyn SequentialWriter>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path(name))?;
        Ok(Box::new(FsSequentialWriter {
            inner: std::io::BufWriter::new(file),
        }))
    }

    fn open_read(&self, name: &str) -> Result<Arc<dyn RandomAccessReader>> {
        let file = File::open(self.path(name))?;
        Ok(Arc::new(FsRandomAccessReader {
            file: std::sync::Mutex::new(file),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name))?;
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.path(from), self.path(to))?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name).exists())
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        for name in names {
            File::open(self.path(name))?.sync_all()?;
        }
        crate::file::fsync_directory(&self.root)?;
        Ok(())
    }

    fn open_directory(&self, name: &str, create: bool) -> Result<Arc<dyn Directory>> {
        let path = self.path(name);
        if create {
            fs::create_dir_all(&path)?;
        } else if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory {name} does not exist"),
            )));
        }
        Ok(Arc::new(FsDirectory::open(path)?))
    }

    #[cfg(feature = "sqlite")]
    fn open_database(&self, name: &str) -> Result<rusqlite::Connection> {
        Ok(rusqlite::Connection::open(self.path(name))?)
    }
}
