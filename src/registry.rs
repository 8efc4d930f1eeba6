// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component I — the multi-index registry.
//!
//! One `Directory` hosts many named indexes, each in its own
//! sub-directory opened via [`crate::directory::Directory::open_directory`].
//! `MultiIndex` only tracks which indexes are currently open; it does
//! not hold any index-wide lock beyond its own bookkeeping mutex, so
//! two callers never race to `create` or `delete` the same name, but
//! searches and updates against an already-open `Index` proceed without
//! going through this registry at all.

use crate::config::IndexConfig;
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::index::Index;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Inner {
    indexes: BTreeMap<String, Arc<Index>>,
}

/// Opens and tracks every named index living under one root directory.
pub struct MultiIndex {
    root: Arc<dyn Directory>,
    config: IndexConfig,
    inner: Mutex<Inner>,
}

impl MultiIndex {
    #[must_use]
    pub fn new(root: Arc<dyn Directory>, config: IndexConfig) -> Self {
        Self {
            root,
            config,
            inner: Mutex::new(Inner {
                indexes: BTreeMap::new(),
            }),
        }
    }

    /// True if `name` is either already open or has a sub-directory on
    /// disk (i.e. was created in a previous session).
    pub fn exists(&self, name: &str) -> Result<bool> {
        if self.inner.lock().indexes.contains_key(name) {
            return Ok(true);
        }
        self.root.exists(name)
    }

    /// Returns the already-open index named `name`, opening it from disk
    /// (or, with `create: true`, creating it) if it isn't open yet.
    /// Fails with [`Error::IndexNotFound`] if `name` doesn't exist and
    /// `create` is `false` (spec.md §4.I `get(name, create=false)`).
    pub fn get(&self, name: &str, create: bool) -> Result<Arc<Index>> {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.indexes.get(name) {
            return Ok(index.clone());
        }
        let found = self.root.exists(name)?;
        if !found && !create {
            return Err(Error::IndexNotFound(name.to_string()));
        }
        let dir = self.root.open_directory(name, create)?;
        let index = Arc::new(Index::open(dir, self.config)?);
        inner.indexes.insert(name.to_string(), index.clone());
        Ok(index)
    }

    /// Creates a brand-new index named `name`. Fails with
    /// [`Error::BadRequest`] if one already exists.
    pub fn create(&self, name: &str) -> Result<Arc<Index>> {
        let mut inner = self.inner.lock();
        if inner.indexes.contains_key(name) || self.root.exists(name)? {
            return Err(Error::BadRequest(format!("index {name} already exists")));
        }
        let dir = self.root.open_directory(name, true)?;
        let index = Arc::new(Index::open(dir, self.config)?);
        inner.indexes.insert(name.to_string(), index.clone());
        Ok(index)
    }

    /// Drops `name` from the open set and deletes every file under its
    /// sub-directory. The caller must ensure no other thread still
    /// holds the `Arc<Index>` it got from [`Self::get`]; dropping the
    /// last reference closes the index's background writer thread.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.indexes.remove(name);
        let dir = self.root.open_directory(name, false)?;
        for file in dir.list_files()? {
            dir.delete_file(&file)?;
        }
        Ok(())
    }

    /// Names of every index currently open in this registry. Does not
    /// discover on-disk indexes that have never been [`Self::get`] or
    /// [`Self::create`]d this session.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.inner.lock().indexes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use crate::ids::{DocId, Hash};
    use crate::op::Op;
    use test_log::test;

    #[test]
    fn create_then_get_reuses_open_handle() {
        let registry = MultiIndex::new(RamDirectory::new(), IndexConfig::default());
        let index = registry.create("songs").unwrap();
        index
            .update(
                vec![Op::InsertOrUpdate {
                    doc_id: DocId(1),
                    hashes: vec![Hash(1)],
                }],
                0,
            )
            .unwrap();

        let same = registry.get("songs", false).unwrap();
        let hits = same
            .search(&[Hash(1)], &crate::config::SessionOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn create_twice_errors() {
        let registry = MultiIndex::new(RamDirectory::new(), IndexConfig::default());
        registry.create("songs").unwrap();
        assert!(matches!(registry.create("songs"), Err(Error::BadRequest(_))));
    }

    #[test]
    fn get_missing_errors() {
        let registry = MultiIndex::new(RamDirectory::new(), IndexConfig::default());
        assert!(matches!(registry.get("missing", false), Err(Error::IndexNotFound(_))));
    }

    #[test]
    fn get_with_create_lazily_creates() {
        let registry = MultiIndex::new(RamDirectory::new(), IndexConfig::default());
        assert!(!registry.exists("songs").unwrap());
        registry.get("songs", true).unwrap();
        assert!(registry.exists("songs").unwrap());
    }

    #[test]
    fn delete_removes_from_list() {
        let registry = MultiIndex::new(RamDirectory::new(), IndexConfig::default());
        registry.create("songs").unwrap();
        assert_eq!(registry.list(), vec!["songs".to_string()]);
        registry.delete("songs").unwrap();
        assert!(registry.list().is_empty());
    }
}
