// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Small newtypes so hashes, doc ids, segment ids and op ids can't be
//! mixed up at a call site even though they're all unsigned integers on
//! the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit fingerprint term.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub u32);

/// Document identifier. `0` is reserved to mean "absent".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub const NONE: DocId = DocId(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Segment identifier, unique within one index.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u32);

/// Monotonically increasing identifier of an oplog entry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub u64);

impl OpId {
    pub const ZERO: OpId = OpId(0);
}

macro_rules! display_as_inner {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

display_as_inner!(Hash);
display_as_inner!(DocId);
display_as_inner!(SegmentId);
display_as_inner!(OpId);
