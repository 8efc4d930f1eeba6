// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The sparse block index materialized in memory for an open segment
//! (spec.md §4.B): a flat array of `(firstHash, lastHash, offset, length)`
//! per block, monotone on `firstHash`. Payload bytes stay on disk.

use crate::coding::{read_u32_varint, read_u64_varint, write_u32_varint, write_u64_varint, Decode, Encode};
use crate::error::{DecodeError, EncodeError};
use crate::ids::Hash;
use std::io::{Read, Write};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockIndexEntry {
    pub first_hash: Hash,
    pub last_hash: Hash,
    pub offset: u64,
    pub length: u32,
}

impl Encode for BlockIndexEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_u32_varint(writer, self.first_hash.0)?;
        write_u32_varint(writer, self.last_hash.0)?;
        write_u64_varint(writer, self.offset)?;
        write_u32_varint(writer, self.length)?;
        Ok(())
    }
}

impl Decode for BlockIndexEntry {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let first_hash = Hash(read_u32_varint(reader)?);
        let last_hash = Hash(read_u32_varint(reader)?);
        let offset = read_u64_varint(reader)?;
        let length = read_u32_varint(reader)?;
        Ok(Self {
            first_hash,
            last_hash,
            offset,
            length,
        })
    }
}

/// In-memory block index for one open segment.
#[derive(Clone, Debug, Default)]
pub struct BlockIndex {
    entries: Vec<BlockIndexEntry>,
}

impl BlockIndex {
    #[must_use]
    pub fn new(entries: Vec<BlockIndexEntry>) -> Self {
        debug_assert!(is_monotone(&entries), "block index must be monotone");
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, block: usize) -> Option<&BlockIndexEntry> {
        self.entries.get(block)
    }

    /// `blockRange(hash) -> [firstBlock, lastBlock]`: all blocks that
    /// could possibly contain `hash`, found by binary search on
    /// `lastHash_k` (spec.md §4.B), tie-broken to be inclusive of any
    /// block whose range touches `hash`.
    #[must_use]
    pub fn block_range(&self, hash: Hash) -> Option<(usize, usize)> {
        if self.entries.is_empty() {
            return None;
        }

        // First block whose lastHash >= hash.
        let first = self
            .entries
            .partition_point(|e| e.last_hash < hash);
        if first == self.entries.len() {
            return None;
        }

        // Last block whose firstHash <= hash.
        if self.entries[first].first_hash > hash {
            // No block's range actually covers `hash`.
            return None;
        }

        let mut last = first;
        while last + 1 < self.entries.len() && self.entries[last + 1].first_hash <= hash {
            last += 1;
        }

        Some((first, last))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockIndexEntry> {
        self.entries.iter()
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_u32_varint(writer, self.entries.len() as u32)?;
        for entry in &self.entries {
            entry.encode_into(writer)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let count = read_u32_varint(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(BlockIndexEntry::decode_from(reader)?);
        }
        if !is_monotone(&entries) {
            return Err(DecodeError::CorruptBlock(
                "block index is not monotone on firstHash".into(),
            ));
        }
        Ok(Self { entries })
    }
}

fn is_monotone(entries: &[BlockIndexEntry]) -> bool {
    entries.windows(2).all(|w| {
        w[0].first_hash <= w[0].last_hash
            && w[0].last_hash <= w[1].first_hash
            && w[1].first_hash <= w[1].last_hash
    }) && entries.last().map_or(true, |e| e.first_hash <= e.last_hash)
}
