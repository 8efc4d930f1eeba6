// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component C — the mutable in-memory builder segment.
//!
//! Exactly one builder segment is active per index at a time (spec.md
//! §5): new updates land here until it crosses `max_stage_size`, at
//! which point it is frozen (sealed against further writes, but still
//! searchable) and a fresh builder takes over while the frozen one is
//! serialized to disk as a sealed [`crate::segment::Segment`] in the
//! background.
//!
//! A document's full hash set is replaced atomically on every
//! `put` (spec.md §3 "update replaces prior terms"): the old postings
//! for that doc are evicted from the in-memory map before the new ones
//! go in, so a doc updated twice before this builder ever seals never
//! leaves stale postings behind for a query to match against.

use crate::error::{Error, Result};
use crate::ids::{DocId, Hash, OpId, SegmentId};
use crate::segment::doc_table::{DocEntry, DocTable};
use crate::segment::writer::SegmentWriter;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

struct Inner {
    postings: BTreeMap<Hash, Vec<DocId>>,
    /// The hash set each live doc currently contributes to `postings`,
    /// so a later `put`/`delete` knows exactly what to evict.
    doc_hashes: FxHashMap<DocId, Vec<Hash>>,
    doc_table: DocTable,
    frozen: bool,
    /// Min/max `OpId` applied to this builder so far, handed to
    /// [`SegmentWriter::finish`] when this builder is sealed.
    op_id_range: Option<(OpId, OpId)>,
}

/// The one active, mutable segment an index accepts writes into.
pub struct BuilderSegment {
    id: SegmentId,
    inner: RwLock<Inner>,
}

impl BuilderSegment {
    #[must_use]
    pub fn new(id: SegmentId) -> Self {
        Self {
            id,
            inner: RwLock::new(Inner {
                postings: BTreeMap::new(),
                doc_hashes: FxHashMap::default(),
                doc_table: DocTable::new(),
                frozen: false,
                op_id_range: None,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }

    /// Idempotent: returns `true` only for the call that actually
    /// transitioned this segment to frozen.
    pub fn freeze(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.frozen {
            return false;
        }
        inner.frozen = true;
        true
    }

    /// Distinct `(hash, docId)` pairs currently held — the quantity
    /// `max_stage_size` bounds (spec.md §4.C, §9).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().postings.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn doc_count(&self) -> usize {
        self.inner.read().doc_table.len()
    }

    /// Min/max `OpId` applied to this builder so far. `None` if nothing
    /// has been written to it yet.
    #[must_use]
    pub fn op_id_range(&self) -> Option<(OpId, OpId)> {
        self.inner.read().op_id_range
    }

    fn track_version_locked(inner: &mut Inner, version: OpId) {
        inner.op_id_range = Some(match inner.op_id_range {
            None => (version, version),
            Some((min, max)) => (min.min(version), max.max(version)),
        });
    }

    fn evict_locked(inner: &mut Inner, doc_id: DocId) {
        if let Some(old_hashes) = inner.doc_hashes.remove(&doc_id) {
            for hash in old_hashes {
                if let Some(docs) = inner.postings.get_mut(&hash) {
                    docs.retain(|d| *d != doc_id);
                    if docs.is_empty() {
                        inner.postings.remove(&hash);
                    }
                }
            }
        }
    }

    /// Replaces `doc_id`'s full posting set with `hashes` at `version`.
    /// Fails with [`Error::Frozen`] once this segment has been sealed;
    /// the caller must fetch the index's current active builder and
    /// retry there.
    pub fn put(&self, doc_id: DocId, hashes: &[Hash], version: OpId) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(Error::Frozen(Some(self.id)));
        }

        Self::evict_locked(&mut inner, doc_id);

        let mut sorted: Vec<Hash> = hashes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for hash in &sorted {
            let docs = inner.postings.entry(*hash).or_default();
            if let Err(pos) = docs.binary_search(&doc_id) {
                docs.insert(pos, doc_id);
            }
        }
        inner.doc_hashes.insert(doc_id, sorted);
        inner.doc_table.set(doc_id, version, false);
        Self::track_version_locked(&mut inner, version);
        Ok(())
    }

    /// Records a delete (tombstone) for `doc_id` at `version`, evicting
    /// any of its postings this builder was still holding.
    pub fn delete(&self, doc_id: DocId, version: OpId) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(Error::Frozen(Some(self.id)));
        }
        Self::evict_locked(&mut inner, doc_id);
        inner.doc_table.set(doc_id, version, true);
        Self::track_version_locked(&mut inner, version);
        Ok(())
    }

    #[must_use]
    pub fn doc_table(&self) -> DocTable {
        self.inner.read().doc_table.clone()
    }

    /// Looks up one doc's version/tombstone without cloning the whole
    /// table — the hot path for search-time version masking.
    #[must_use]
    pub fn doc_entry(&self, doc_id: DocId) -> Option<DocEntry> {
        self.inner.read().doc_table.get(doc_id)
    }

    /// Per-segment search, mirroring [`crate::segment::Segment::search`]
    /// but over the unblocked in-memory posting map.
    #[must_use]
    pub fn search(&self, query: &[Hash]) -> FxHashMap<DocId, u32> {
        let inner = self.inner.read();
        let mut overlap = FxHashMap::default();
        for hash in query {
            if let Some(docs) = inner.postings.get(hash) {
                for doc in docs {
                    *overlap.entry(*doc).or_insert(0) += 1;
                }
            }
        }
        overlap
    }

    /// Sorted `(hash, docId)` postings, for the merger and for sealing
    /// this builder into an on-disk segment. Only meaningful once frozen.
    #[must_use]
    pub fn sorted_postings(&self) -> Vec<(Hash, DocId)> {
        let inner = self.inner.read();
        inner
            .postings
            .iter()
            .flat_map(|(hash, docs)| docs.iter().map(move |d| (*hash, *d)))
            .collect()
    }

    /// Seals this builder into a [`SegmentWriter`], ready to be written
    /// out by [`crate::segment::writer::SegmentWriter::finish`].
    ///
    /// # Errors
    /// Returns an error if this segment has not been frozen yet, or if
    /// block encoding fails.
    pub fn into_segment_writer(&self, block_size: u32) -> Result<SegmentWriter> {
        if !self.is_frozen() {
            return Err(Error::BadRequest(
                "cannot seal a builder segment that has not been frozen".into(),
            ));
        }
        let mut writer = SegmentWriter::new(block_size);
        for (hash, doc_id) in self.sorted_postings() {
            writer.add_posting(hash, doc_id)?;
        }
        for (doc_id, entry) in self.inner.read().doc_table.iter() {
            writer.set_doc_version(doc_id, entry.version, entry.tombstone);
        }
        Ok(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn put_and_search() {
        let seg = BuilderSegment::new(SegmentId(1));
        seg.put(DocId(10), &[Hash(1), Hash(2)], OpId(1)).unwrap();
        seg.put(DocId(11), &[Hash(1)], OpId(2)).unwrap();

        let hits = seg.search(&[Hash(1), Hash(2)]);
        assert_eq!(hits.get(&DocId(10)), Some(&2));
        assert_eq!(hits.get(&DocId(11)), Some(&1));
    }

    #[test]
    fn update_replaces_prior_terms_within_same_builder() {
        let seg = BuilderSegment::new(SegmentId(1));
        seg.put(DocId(10), &[Hash(1), Hash(2)], OpId(1)).unwrap();
        seg.put(DocId(10), &[Hash(3)], OpId(2)).unwrap();

        assert!(seg.search(&[Hash(1)]).is_empty());
        assert!(seg.search(&[Hash(2)]).is_empty());
        assert_eq!(seg.search(&[Hash(3)]).get(&DocId(10)), Some(&1));
        assert_eq!(seg.len(), 1);
    }

    #[test]
    fn delete_evicts_postings() {
        let seg = BuilderSegment::new(SegmentId(1));
        seg.put(DocId(10), &[Hash(1), Hash(2)], OpId(1)).unwrap();
        seg.delete(DocId(10), OpId(2)).unwrap();

        assert!(seg.is_empty());
        assert!(seg.doc_table().all_tombstoned());
    }

    #[test]
    fn frozen_rejects_writes() {
        let seg = BuilderSegment::new(SegmentId(1));
        assert!(seg.freeze());
        assert!(!seg.freeze(), "second freeze is a no-op");
        let err = seg.put(DocId(1), &[Hash(1)], OpId(1));
        assert!(matches!(err, Err(Error::Frozen(Some(SegmentId(1))))));
    }
}
