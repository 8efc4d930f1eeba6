// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component G — the N-way segment merger.
//!
//! Folds several segments' doc tables together (highest version per
//! `docId` wins), then walks all of their posting streams in lock-step,
//! keeping only the postings that belong to each doc's winning,
//! non-tombstoned version. The result feeds straight into a
//! [`SegmentWriter`] as one globally sorted posting stream.

use crate::error::Result;
use crate::ids::{DocId, Hash, OpId};
use crate::segment::doc_table::DocTable;
use crate::segment::writer::SegmentWriter;

/// One segment's worth of material going into a merge: its sorted
/// `(hash, docId)` postings, its doc table, and the oplog range it
/// covers.
pub struct MergeInput {
    pub postings: Vec<(Hash, DocId)>,
    pub doc_table: DocTable,
    pub op_id_range: (OpId, OpId),
}

/// Merges `inputs` into a single sorted posting stream plus a combined
/// doc table, writing the result into a fresh [`SegmentWriter`].
///
/// Returns the writer (not yet flushed to a directory) and the merged
/// segment's op id range (the union of all inputs').
pub fn merge(inputs: Vec<MergeInput>, block_size: u32) -> Result<(SegmentWriter, (OpId, OpId))> {
    let mut merged_doc_table = DocTable::new();
    for input in &inputs {
        for (doc_id, entry) in input.doc_table.iter() {
            merged_doc_table.set(doc_id, entry.version, entry.tombstone);
        }
    }

    let op_id_range = inputs.iter().fold(None, |acc: Option<(OpId, OpId)>, i| {
        Some(match acc {
            None => i.op_id_range,
            Some((lo, hi)) => (lo.min(i.op_id_range.0), hi.max(i.op_id_range.1)),
        })
    });
    let op_id_range = op_id_range.unwrap_or((OpId::ZERO, OpId::ZERO));

    let local_tables: Vec<&DocTable> = inputs.iter().map(|i| &i.doc_table).collect();
    let mut cursors: Vec<std::iter::Peekable<std::vec::IntoIter<(Hash, DocId)>>> = inputs
        .into_iter()
        .map(|i| i.postings.into_iter().peekable())
        .collect();

    let mut writer = SegmentWriter::new(block_size);

    loop {
        let mut best: Option<(usize, Hash, DocId)> = None;

        for (idx, cursor) in cursors.iter_mut().enumerate() {
            // Drop postings whose doc did not win this merge (a newer
            // version elsewhere, or it was deleted) before considering
            // this cursor's head for the overall minimum.
            loop {
                let Some((hash, doc_id)) = cursor.peek().copied() else {
                    break;
                };
                let local_version = local_tables[idx].get_version(doc_id);
                let alive = merged_doc_table
                    .get(doc_id)
                    .is_some_and(|winner| winner.version == local_version && !winner.tombstone);
                if alive {
                    break;
                }
                cursor.next();
            }

            if let Some((hash, doc_id)) = cursor.peek().copied() {
                let better = match best {
                    None => true,
                    Some((_, bh, bd)) => (hash, doc_id) < (bh, bd),
                };
                if better {
                    best = Some((idx, hash, doc_id));
                }
            }
        }

        let Some((idx, hash, doc_id)) = best else {
            break;
        };
        writer.add_posting(hash, doc_id)?;
        cursors[idx].next();
    }

    for (doc_id, entry) in merged_doc_table.iter() {
        writer.set_doc_version(doc_id, entry.version, entry.tombstone);
    }

    Ok((writer, op_id_range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use crate::ids::SegmentId;
    use crate::segment::Segment;
    use test_log::test;

    fn input(postings: &[(u32, u32)], versions: &[(u32, u64, bool)], lo: u64, hi: u64) -> MergeInput {
        let mut doc_table = DocTable::new();
        for (doc, version, tombstone) in versions {
            doc_table.set(DocId(*doc), OpId(*version), *tombstone);
        }
        MergeInput {
            postings: postings.iter().map(|(h, d)| (Hash(*h), DocId(*d))).collect(),
            doc_table,
            op_id_range: (OpId(lo), OpId(hi)),
        }
    }

    #[test]
    fn newer_version_wins_and_old_postings_drop() {
        // Segment 1: doc 1 at version 1, with postings for hash 10.
        let older = input(&[(10, 1)], &[(1, 1, false)], 1, 1);
        // Segment 2: doc 1 updated to version 2 with different postings.
        let newer = input(&[(20, 1)], &[(1, 2, false)], 2, 2);

        let (writer, range) = merge(vec![older, newer], crate::block::DEFAULT_BLOCK_SIZE as u32).unwrap();
        assert_eq!(range, (OpId(1), OpId(2)));

        let dir = RamDirectory::new();
        writer.finish(&*dir, SegmentId(1), range).unwrap();
        let seg = Segment::open(&*dir, SegmentId(1), range).unwrap();

        // Only the newer posting (hash 20) should survive.
        let hits = seg.search(&[Hash(10)]).unwrap();
        assert!(hits.is_empty());
        let hits = seg.search(&[Hash(20)]).unwrap();
        assert_eq!(hits.get(&DocId(1)), Some(&1));
    }

    #[test]
    fn tombstoned_doc_drops_entirely() {
        let alive = input(&[(10, 1)], &[(1, 1, false)], 1, 1);
        let deleted = input(&[], &[(1, 2, true)], 2, 2);

        let (writer, range) = merge(vec![alive, deleted], crate::block::DEFAULT_BLOCK_SIZE as u32).unwrap();
        let dir = RamDirectory::new();
        writer.finish(&*dir, SegmentId(1), range).unwrap();
        let seg = Segment::open(&*dir, SegmentId(1), range).unwrap();
        assert!(seg.doc_table().all_tombstoned());
    }
}
