// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The logical operations an index accepts, and the oplog entry wrapper
//! that gives each one a durable, monotonically increasing [`OpId`].
//!
//! Stored as `serde_json`, the same way the teacher crate keeps its
//! journal entries human-inspectable rather than bit-packed (§6). The
//! field/variant renames below make the wire shape match spec.md §6's
//! logical forms exactly: `{"upsert": {"id": .., "terms": [..]}}`,
//! `{"delete": {"id": ..}}`, `{"set": {"name": .., "value": ..}}`.

use crate::ids::{DocId, Hash, OpId};
use serde::{Deserialize, Serialize};

/// One logical update submitted by a caller. A single `update()` call
/// may batch many of these together (spec.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Replaces `doc_id`'s entire posting set with `hashes` (an insert
    /// if the doc id is new, a full replace if it already existed).
    #[serde(rename = "upsert")]
    InsertOrUpdate {
        #[serde(rename = "id")]
        doc_id: DocId,
        #[serde(rename = "terms")]
        hashes: Vec<Hash>,
    },
    /// Tombstones `doc_id`: its postings become unsearchable everywhere
    /// they exist, across every segment.
    #[serde(rename = "delete")]
    Delete {
        #[serde(rename = "id")]
        doc_id: DocId,
    },
    /// Sets an `IndexInfo`-level attribute (arbitrary string key/value
    /// metadata, not tied to any document).
    #[serde(rename = "set")]
    SetAttribute { name: String, value: String },
}

/// One durable oplog record: an [`Op`] plus the id it was assigned when
/// written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpLogEntry {
    pub op_id: OpId,
    pub op: Op,
}

impl OpLogEntry {
    #[must_use]
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
