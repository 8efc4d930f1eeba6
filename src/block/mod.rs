// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component A — the block codec.
//!
//! A block is a fixed-size (default 4 KiB) run of sorted `(hash, docId)`
//! postings, delta+varint encoded. This module only knows how to encode
//! one in-memory `Vec<(Hash, DocId)>` into exactly `block_size` bytes and
//! decode it back; it has no notion of files, segments or the block
//! index that locates a block (see [`crate::segment::block_index`]).

mod header;

pub use header::BLOCK_HEADER_LEN;

use crate::coding::{read_u32_varint, write_u32_varint};
use crate::error::{DecodeError, EncodeError};
use crate::ids::{DocId, Hash};
use std::io::{Cursor, Read, Write};

/// Default block size in bytes. `itemCount` is a `u16`, so a block may
/// never need to express more than 65535 entries; in practice the byte
/// budget runs out long before that for any reasonable block size.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Sentinel `(keyDelta, valueDelta) = (0, 0)` written after the last
/// entry (two zero varint bytes).
const SENTINEL_LEN: usize = 2;

/// Appends entries to an in-progress block until it is full.
///
/// `BlockWriter` does not own the output buffer across `finish()` calls;
/// callers create one per block, add entries, then call [`BlockWriter::finish`]
/// to obtain the final zero-padded `block_size`-byte buffer.
pub struct BlockWriter {
    block_size: usize,
    payload: Vec<u8>,
    item_count: u16,
    last_hash: Option<Hash>,
    last_doc: DocId,
}

impl BlockWriter {
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            payload: Vec::with_capacity(block_size),
            item_count: 0,
            last_hash: None,
            last_doc: DocId::NONE,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    #[must_use]
    pub fn item_count(&self) -> u16 {
        self.item_count
    }

    /// Tries to append one posting. Returns `Err(EncodeError::BlockFull)`
    /// without mutating state if the entry (plus the sentinel) would not
    /// fit; the caller then seals the block and starts a fresh one with
    /// this same entry.
    pub fn try_push(&mut self, hash: Hash, doc_id: DocId) -> Result<(), EncodeError> {
        if self.item_count == u16::MAX {
            return Err(EncodeError::BlockFull);
        }

        let mut entry_buf = Vec::with_capacity(10);
        match self.last_hash {
            None => {
                // i = 0: only the absolute docId is written; the hash
                // itself is never stored in the block (the block index
                // supplies `firstHash` for decoding).
                write_u32_varint(&mut entry_buf, doc_id.0)?;
            }
            Some(last_hash) => {
                let key_delta = hash
                    .0
                    .checked_sub(last_hash.0)
                    .expect("postings must be added in nondecreasing hash order");
                write_u32_varint(&mut entry_buf, key_delta)?;
                if key_delta == 0 {
                    let value_delta = doc_id
                        .0
                        .checked_sub(self.last_doc.0)
                        .expect("equal-hash postings must be added in increasing docId order");
                    write_u32_varint(&mut entry_buf, value_delta)?;
                } else {
                    write_u32_varint(&mut entry_buf, doc_id.0)?;
                }
            }
        }

        let used = BLOCK_HEADER_LEN + self.payload.len() + entry_buf.len() + SENTINEL_LEN;
        if used > self.block_size {
            return Err(EncodeError::BlockFull);
        }

        self.payload.extend_from_slice(&entry_buf);
        self.item_count += 1;
        self.last_hash = Some(hash);
        self.last_doc = doc_id;

        Ok(())
    }

    /// Serializes header + payload + sentinel + zero padding into exactly
    /// `block_size` bytes. An empty block is illegal (per spec.md §4.A).
    pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
        assert!(!self.is_empty(), "cannot serialize an empty block");

        let mut out = Vec::with_capacity(self.block_size);
        header::Header {
            item_count: self.item_count,
        }
        .encode_into(&mut out)?;
        out.extend_from_slice(&self.payload);
        // sentinel (0, 0)
        write_u32_varint(&mut out, 0)?;
        write_u32_varint(&mut out, 0)?;

        assert!(
            out.len() <= self.block_size,
            "block overflowed its fixed size"
        );
        out.resize(self.block_size, 0);

        Ok(out)
    }
}

/// Decodes a full `block_size`-byte buffer back into sorted `(hash, docId)`
/// pairs, given the block's `first_hash` as recorded by the block index.
///
/// Per spec.md §4.A this fails with `CorruptBlock` if a varint runs past
/// the block end, `item_count` claims more entries than fit, or the
/// first decoded hash does not match `first_hash`.
pub fn decode_block(buf: &[u8], first_hash: Hash) -> Result<Vec<(Hash, DocId)>, DecodeError> {
    let mut cursor = Cursor::new(buf);
    let header = header::Header::decode_from(&mut cursor)?;

    if header.item_count == 0 {
        return Err(DecodeError::CorruptBlock("empty block".into()));
    }

    let mut out = Vec::with_capacity(header.item_count as usize);

    // i = 0: a single varint, the absolute docId; hash is `first_hash`.
    let doc0 = read_varint_checked(&mut cursor, buf.len())?;
    out.push((first_hash, DocId(doc0)));

    let mut last_hash = first_hash.0;
    let mut last_doc = doc0;

    for _ in 1..header.item_count {
        let key_delta = read_varint_checked(&mut cursor, buf.len())?;
        let value_delta = read_varint_checked(&mut cursor, buf.len())?;

        let hash = last_hash
            .checked_add(key_delta)
            .ok_or_else(|| DecodeError::CorruptBlock("hash delta overflow".into()))?;
        let doc = if key_delta == 0 {
            last_doc
                .checked_add(value_delta)
                .ok_or_else(|| DecodeError::CorruptBlock("doc delta overflow".into()))?
        } else {
            value_delta
        };

        out.push((Hash(hash), DocId(doc)));
        last_hash = hash;
        last_doc = doc;
    }

    Ok(out)
}

/// Reads one varint, erroring rather than panicking if it runs past the
/// end of the block (a literal truncated-varint read inside `buf` could
/// otherwise silently read zero bytes past `buf.len()` since `Cursor`
/// over a slice just returns `UnexpectedEof`, which we re-map here to a
/// named corruption instead of a generic I/O error).
fn read_varint_checked(cursor: &mut Cursor<&[u8]>, _len: usize) -> Result<u32, DecodeError> {
    read_u32_varint(cursor).map_err(|e| match e {
        DecodeError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            DecodeError::CorruptBlock("varint ran past block end".into())
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn roundtrip(postings: &[(u32, u32)], block_size: usize) -> Vec<(u32, u32)> {
        let mut writer = BlockWriter::new(block_size);
        for &(h, d) in postings {
            writer.try_push(Hash(h), DocId(d)).unwrap();
        }
        let first_hash = Hash(postings[0].0);
        let buf = writer.finish().unwrap();
        assert_eq!(buf.len(), block_size);
        decode_block(&buf, first_hash)
            .unwrap()
            .into_iter()
            .map(|(h, d)| (h.0, d.0))
            .collect()
    }

    #[test]
    fn single_entry() {
        let got = roundtrip(&[(42, 7)], DEFAULT_BLOCK_SIZE);
        assert_eq!(got, vec![(42, 7)]);
    }

    #[test]
    fn increasing_hashes() {
        let input = vec![(1, 1), (5, 2), (5, 9), (100, 3)];
        let got = roundtrip(&input, DEFAULT_BLOCK_SIZE);
        assert_eq!(got, input);
    }

    #[test]
    fn block_full_rejects_overflow() {
        // Room for exactly one single-byte-varint entry plus the sentinel;
        // the second entry needs two more bytes than are left.
        let mut writer = BlockWriter::new(header::Header::encoded_len() + 3);
        writer.try_push(Hash(1), DocId(1)).unwrap();
        let err = writer.try_push(Hash(2), DocId(2));
        assert!(matches!(err, Err(EncodeError::BlockFull)));
    }

    #[test]
    fn truncated_block_is_corrupt() {
        let mut writer = BlockWriter::new(DEFAULT_BLOCK_SIZE);
        writer.try_push(Hash(5), DocId(1)).unwrap();
        writer.try_push(Hash(9), DocId(2)).unwrap();
        let mut buf = writer.finish().unwrap();
        // Corrupt the header to claim far more entries than were written,
        // forcing the decoder to run a varint read past the block end.
        buf[0] = 0xFF;
        buf[1] = 0xFF;
        let err = decode_block(&buf, Hash(5));
        assert!(matches!(err, Err(DecodeError::CorruptBlock(_))));
    }
}
