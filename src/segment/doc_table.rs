// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component D — the per-segment doc table: `docId -> (version, tombstone)`.
//!
//! On disk (`.fdx`, spec.md §6) this is a sorted list of
//! `(docId: u32, version: u64, tombstone: u8)` terminated by `docId = 0`
//! (`DocId(0)` is reserved to mean "absent", so it can never be a real
//! entry and doubles as the end marker).

use crate::coding::{read_u32_varint, read_u64_varint, write_u32_varint, write_u64_varint};
use crate::error::{DecodeError, EncodeError};
use crate::ids::{DocId, OpId};
use byteorder::{ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::io::{Read, Write};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DocEntry {
    pub version: OpId,
    pub tombstone: bool,
}

/// Per-segment `docId -> (version, tombstone)` registry.
#[derive(Clone, Debug, Default)]
pub struct DocTable {
    entries: FxHashMap<DocId, DocEntry>,
}

impl DocTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an `InsertOrUpdate`/`Delete` for `doc_id` at `version`. If
    /// the doc id was already present in this segment with a higher
    /// version, the higher version wins (spec.md §4.D).
    pub fn set(&mut self, doc_id: DocId, version: OpId, tombstone: bool) {
        match self.entries.get_mut(&doc_id) {
            Some(existing) if existing.version >= version => {}
            _ => {
                self.entries.insert(doc_id, DocEntry { version, tombstone });
            }
        }
    }

    #[must_use]
    pub fn get(&self, doc_id: DocId) -> Option<DocEntry> {
        self.entries.get(&doc_id).copied()
    }

    #[must_use]
    pub fn get_version(&self, doc_id: DocId) -> OpId {
        self.entries.get(&doc_id).map_or(OpId::ZERO, |e| e.version)
    }

    #[must_use]
    pub fn contains(&self, doc_id: DocId) -> bool {
        self.entries
            .get(&doc_id)
            .map_or(false, |e| !e.tombstone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry in the table is a tombstone: the segment's
    /// postings are all dead weight and a search need not touch them
    /// (spec.md §8 "Boundary behaviors").
    #[must_use]
    pub fn all_tombstoned(&self) -> bool {
        !self.entries.is_empty() && self.entries.values().all(|e| e.tombstone)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, DocEntry)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, *e))
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        for doc_id in ids {
            let entry = self.entries[&doc_id];
            write_u32_varint(writer, doc_id.0)?;
            write_u64_varint(writer, entry.version.0)?;
            writer
                .write_u8(u8::from(entry.tombstone))
                .map_err(EncodeError::Io)?;
        }
        // terminator: docId = 0
        write_u32_varint(writer, 0)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut entries = FxHashMap::default();
        loop {
            let doc_id = read_u32_varint(reader)?;
            if doc_id == 0 {
                break;
            }
            let version = OpId(read_u64_varint(reader)?);
            let tombstone = reader.read_u8().map_err(DecodeError::Io)? != 0;
            entries.insert(DocId(doc_id), DocEntry { version, tombstone });
        }
        Ok(Self { entries })
    }
}
