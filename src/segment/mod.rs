// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Components B and D — the sealed, on-disk `Segment`: a block index
//! (§4.B) plus a doc table (§4.D) over immutable posting blocks.
//!
//! Only the block index and doc table are held in memory; block
//! payloads are pulled from the directory on demand (§4.B, §9).

pub mod block_index;
pub mod doc_table;
pub mod header;
pub mod writer;

use crate::block::decode_block;
use crate::coding::Decode;
use crate::directory::{Directory, RandomAccessReader};
use crate::error::{Error, Result};
use crate::file::{segment_data_file_name, segment_docs_file_name, segment_index_file_name};
use crate::ids::{DocId, Hash, OpId, SegmentId};
use block_index::BlockIndex;
use doc_table::DocTable;
use rustc_hash::FxHashMap;
use std::io::Cursor;
use std::sync::Arc;

/// Immutable, shared, on-disk segment. Cheap to clone (everything behind
/// an `Arc`); many readers may search the same `Segment` concurrently
/// while it is being superseded by a merge in the background.
#[derive(Clone)]
pub struct Segment {
    inner: Arc<Inner>,
}

struct Inner {
    id: SegmentId,
    header: header::Header,
    block_index: BlockIndex,
    doc_table: DocTable,
    op_id_range: (OpId, OpId),
    data: Arc<dyn RandomAccessReader>,
    data_header_len: u64,
}

impl Segment {
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.inner.id
    }

    #[must_use]
    pub fn op_id_range(&self) -> (OpId, OpId) {
        self.inner.op_id_range
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.inner.block_index.len()
    }

    #[must_use]
    pub fn doc_table(&self) -> &DocTable {
        &self.inner.doc_table
    }

    #[must_use]
    pub fn block_index(&self) -> &BlockIndex {
        &self.inner.block_index
    }

    #[must_use]
    pub fn header(&self) -> header::Header {
        self.inner.header
    }

    /// Opens a sealed segment from `dir`. Fails the whole open with
    /// [`Error::Corrupt`] if the header magic or stored structure is
    /// invalid (spec.md §4.H "Corrupt segment on open").
    pub fn open(dir: &dyn Directory, id: SegmentId, op_id_range: (OpId, OpId)) -> Result<Self> {
        let data = dir.open_read(&segment_data_file_name(id.0))?;
        let header_bytes = data.read_at(0, header_probe_len(&data)?)?;
        let mut cursor = Cursor::new(&header_bytes[..]);
        let header = header::Header::decode_from(&mut cursor)?;
        let data_header_len = cursor.position();

        let index_reader = dir.open_read(&segment_index_file_name(id.0))?;
        let index_bytes = index_reader.read_at(0, index_reader.len()? as usize)?;
        let block_index = BlockIndex::deserialize(&mut Cursor::new(&index_bytes[..]))?;

        let docs_reader = dir.open_read(&segment_docs_file_name(id.0))?;
        let docs_bytes = docs_reader.read_at(0, docs_reader.len()? as usize)?;
        let doc_table = DocTable::deserialize(&mut Cursor::new(&docs_bytes[..]))?;

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                header,
                block_index,
                doc_table,
                op_id_range,
                data,
                data_header_len,
            }),
        })
    }

    /// Decodes every block back into sorted `(hash, docId)` pairs, for
    /// feeding this segment into a merge.
    pub fn all_postings(&self) -> Result<Vec<(Hash, DocId)>> {
        let mut out = Vec::new();
        for k in 0..self.inner.block_index.len() {
            out.extend(self.read_block(k)?);
        }
        Ok(out)
    }

    fn read_block(&self, block: usize) -> Result<Vec<(Hash, DocId)>> {
        let entry = self
            .inner
            .block_index
            .get(block)
            .ok_or_else(|| Error::Corrupt(format!("block {block} out of range")))?;
        let buf = self
            .inner
            .data
            .read_at(self.inner.data_header_len + entry.offset, entry.length as usize)?;
        Ok(decode_block(&buf, entry.first_hash)?)
    }

    /// Per-segment search algorithm (spec.md §4.H): walks the sorted
    /// `query` against the block index, reading each matching block at
    /// most once, and returns `docId -> overlapCount`.
    pub fn search(&self, query: &[Hash]) -> Result<FxHashMap<DocId, u32>> {
        let mut overlap = FxHashMap::default();

        if query.is_empty() || self.inner.block_index.is_empty() || self.inner.doc_table.all_tombstoned() {
            return Ok(overlap);
        }

        let mut i = 0usize;
        let mut k = 0usize;
        let mut last_block: Option<usize> = None;

        while i < query.len() {
            if last_block.map_or(true, |lb| k > lb) {
                match self.inner.block_index.block_range(query[i]) {
                    None => {
                        i += 1;
                        continue;
                    }
                    Some((first, last)) => {
                        k = k.max(first);
                        last_block = Some(last);
                    }
                }
            }

            if k >= self.inner.block_index.len() {
                break;
            }

            let entry = *self.inner.block_index.get(k).expect("k in range");
            let block = self.read_block(k)?;

            for (h, d) in block {
                while i < query.len() && h.0 > query[i].0 {
                    i += 1;
                }
                if i >= query.len() {
                    return Ok(overlap);
                }
                if h == query[i] {
                    *overlap.entry(d).or_insert(0) += 1;
                }
                if entry.last_hash.0 < query[i].0 {
                    break;
                }
            }

            k += 1;
        }

        Ok(overlap)
    }
}

/// Reads just enough of the start of the file to decode the fixed-shape
/// header (magic + three varints, each at most 5 bytes for a `u32`).
fn header_probe_len(data: &Arc<dyn RandomAccessReader>) -> Result<usize> {
    let total = data.len()?;
    Ok(std::cmp::min(total, 4 + 5 * 3) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use test_log::test;

    fn build_segment(
        dir: &dyn Directory,
        id: u32,
        postings: Vec<(u32, u32, OpId, bool)>,
    ) -> Segment {
        let mut w = writer::SegmentWriter::new(crate::block::DEFAULT_BLOCK_SIZE as u32);
        for (h, d, version, tombstone) in &postings {
            if !tombstone {
                w.add_posting(Hash(*h), DocId(*d)).unwrap();
            }
            w.set_doc_version(DocId(*d), *version, *tombstone);
        }
        w.finish(dir, SegmentId(id), (OpId(0), OpId(100))).unwrap();
        Segment::open(dir, SegmentId(id), (OpId(0), OpId(100))).unwrap()
    }

    #[test]
    fn basic_search() {
        let dir = RamDirectory::new();
        let seg = build_segment(
            &*dir,
            1,
            vec![
                (100, 1, OpId(1), false),
                (200, 1, OpId(1), false),
                (300, 1, OpId(1), false),
            ],
        );
        let hits = seg.search(&[Hash(200), Hash(300), Hash(999)]).unwrap();
        assert_eq!(hits.get(&DocId(1)), Some(&2));
    }

    #[test]
    fn empty_query_is_empty() {
        let dir = RamDirectory::new();
        let seg = build_segment(&*dir, 1, vec![(1, 1, OpId(1), false)]);
        assert!(seg.search(&[]).unwrap().is_empty());
    }
}
