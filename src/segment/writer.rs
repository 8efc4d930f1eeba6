// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Serializes a frozen in-memory segment (builder segment or merge
//! output) into the three files a sealed segment is made of:
//! `.fid` (header + posting blocks), `.fii` (block index), `.fdx` (doc
//! table). Grounded on the block codec's own block-filling loop; this
//! is the only place that turns a stream of sorted postings into blocks.

use super::block_index::{BlockIndex, BlockIndexEntry};
use super::doc_table::DocTable;
use super::header;
use crate::block::BlockWriter;
use crate::coding::Encode;
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::file::{segment_data_file_name, segment_docs_file_name, segment_index_file_name};
use crate::ids::{DocId, Hash, OpId, SegmentId};
use std::io::Write;
use xxhash_rust::xxh3::xxh3_64;

/// Summary handed back after sealing a segment, exactly the fields an
/// `IndexInfo` segment descriptor needs (spec.md §6) without having to
/// reopen and re-scan the file that was just written.
#[derive(Copy, Clone, Debug)]
pub struct SegmentSummary {
    pub block_count: u32,
    pub last_key: Hash,
    /// xxh3-64 checksum of the full `.fid` contents (header + blocks).
    pub checksum: u64,
}

/// Builds one sealed segment's worth of blocks, block index and doc
/// table from a sorted stream of `(hash, docId)` postings plus the
/// doc-version/tombstone facts that go with them.
pub struct SegmentWriter {
    block_size: u32,
    current: Option<BlockWriter>,
    current_first_hash: Option<Hash>,
    current_last_hash: Option<Hash>,
    blocks: Vec<u8>,
    entries: Vec<BlockIndexEntry>,
    doc_table: DocTable,
}

impl SegmentWriter {
    #[must_use]
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            current: None,
            current_first_hash: None,
            current_last_hash: None,
            blocks: Vec::new(),
            entries: Vec::new(),
            doc_table: DocTable::new(),
        }
    }

    /// Appends one posting. Callers must supply postings in
    /// nondecreasing `(hash, docId)` order — the same invariant the
    /// block codec itself enforces (spec.md §4.A, §4.C).
    pub fn add_posting(&mut self, hash: Hash, doc_id: DocId) -> Result<()> {
        if self.current.is_none() {
            self.current = Some(BlockWriter::new(self.block_size as usize));
            self.current_first_hash = Some(hash);
        }

        let writer = self.current.as_mut().expect("just set above");
        match writer.try_push(hash, doc_id) {
            Ok(()) => {
                self.current_last_hash = Some(hash);
                Ok(())
            }
            Err(crate::error::EncodeError::BlockFull) => {
                self.seal_current()?;
                self.current = Some(BlockWriter::new(self.block_size as usize));
                self.current_first_hash = Some(hash);
                self.current
                    .as_mut()
                    .expect("just set above")
                    .try_push(hash, doc_id)?;
                self.current_last_hash = Some(hash);
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Records `docId`'s version/tombstone state for the `.fdx` table.
    pub fn set_doc_version(&mut self, doc_id: DocId, version: OpId, tombstone: bool) {
        self.doc_table.set(doc_id, version, tombstone);
    }

    fn seal_current(&mut self) -> Result<()> {
        let Some(writer) = self.current.take() else {
            return Ok(());
        };
        if writer.is_empty() {
            return Ok(());
        }
        let offset = self.blocks.len() as u64;
        let bytes = writer.finish()?;
        let length = bytes.len() as u32;
        self.entries.push(BlockIndexEntry {
            first_hash: self.current_first_hash.take().expect("block had entries"),
            last_hash: self.current_last_hash.take().expect("block had entries"),
            offset,
            length,
        });
        self.blocks.extend_from_slice(&bytes);
        Ok(())
    }

    /// Seals any open block and writes `segment_<id>.{fid,fii,fdx}` to
    /// `dir`.
    pub fn finish(
        mut self,
        dir: &dyn Directory,
        id: SegmentId,
        op_id_range: (OpId, OpId),
    ) -> Result<SegmentSummary> {
        self.seal_current()?;
        let _ = op_id_range;

        let mut data_buf = Vec::with_capacity(self.blocks.len() + 16);
        header::Header {
            format_version: header::FORMAT_VERSION,
            block_size: self.block_size,
            codec_id: header::CODEC_DELTA_VARINT,
        }
        .encode_into(&mut data_buf)?;
        data_buf.extend_from_slice(&self.blocks);

        let summary = SegmentSummary {
            block_count: self.entries.len() as u32,
            last_key: self.entries.last().map_or(Hash::default(), |e| e.last_hash),
            checksum: xxh3_64(&data_buf),
        };

        let mut index_buf = Vec::new();
        BlockIndex::new(self.entries).serialize(&mut index_buf)?;

        let mut docs_buf = Vec::new();
        self.doc_table.serialize(&mut docs_buf)?;

        write_file(dir, &segment_data_file_name(id.0), &data_buf)?;
        write_file(dir, &segment_index_file_name(id.0), &index_buf)?;
        write_file(dir, &segment_docs_file_name(id.0), &docs_buf)?;

        Ok(summary)
    }
}

fn write_file(dir: &dyn Directory, name: &str, bytes: &[u8]) -> Result<()> {
    let mut writer = dir.create_file(name)?;
    writer.write_all(bytes).map_err(Error::Io)?;
    writer.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use crate::segment::Segment;
    use test_log::test;

    #[test]
    fn writes_readable_segment() {
        let dir = RamDirectory::new();
        let mut w = SegmentWriter::new(crate::block::DEFAULT_BLOCK_SIZE as u32);
        w.add_posting(Hash(1), DocId(1)).unwrap();
        w.add_posting(Hash(1), DocId(2)).unwrap();
        w.add_posting(Hash(5), DocId(1)).unwrap();
        w.set_doc_version(DocId(1), OpId(10), false);
        w.set_doc_version(DocId(2), OpId(11), false);
        w.finish(&*dir, SegmentId(1), (OpId(10), OpId(11))).unwrap();

        let seg = Segment::open(&*dir, SegmentId(1), (OpId(10), OpId(11))).unwrap();
        assert_eq!(seg.block_count(), 1);
        let hits = seg.search(&[Hash(1)]).unwrap();
        assert_eq!(hits.get(&DocId(1)), Some(&1));
        assert_eq!(hits.get(&DocId(2)), Some(&1));
    }

    #[test]
    fn many_postings_span_multiple_blocks() {
        let dir = RamDirectory::new();
        let small_block = header::Header::default().block_size.min(64) as u32;
        let mut w = SegmentWriter::new(small_block.max(32));
        for h in 0..200u32 {
            w.add_posting(Hash(h), DocId(1)).unwrap();
            w.set_doc_version(DocId(1), OpId(1), false);
        }
        w.finish(&*dir, SegmentId(2), (OpId(1), OpId(1))).unwrap();

        let seg = Segment::open(&*dir, SegmentId(2), (OpId(1), OpId(1))).unwrap();
        assert!(seg.block_count() > 1);
        let hits = seg.search(&[Hash(0), Hash(199)]).unwrap();
        assert_eq!(hits.get(&DocId(1)), Some(&2));
    }
}
