// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `IndexInfo` (spec.md §6): the length-prefixed, checksummed manifest
//! written to `info_N` on every committed snapshot. `N` (the revision)
//! lives in the file name, not the content; on open, the highest `N`
//! whose crc32 verifies wins and any corrupt/partial tail is ignored.

use crate::coding::{read_string, read_u32_varint, read_u64_varint, write_string, write_u32_varint, write_u64_varint};
use crate::error::{DecodeError, EncodeError};
use crate::ids::{Hash, OpId, SegmentId};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::Cursor;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SegmentDescriptor {
    pub id: SegmentId,
    pub block_count: u32,
    pub last_key: Hash,
    /// xxh3-64 checksum of the segment's `.fid` contents.
    pub checksum: u64,
    pub op_id_range: (OpId, OpId),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexInfo {
    /// Highest segment id ever allocated by this index; the next fresh
    /// segment (builder seal or merge output) takes `last_segment_id + 1`.
    pub last_segment_id: SegmentId,
    pub segments: Vec<SegmentDescriptor>,
    pub attributes: BTreeMap<String, String>,
}

impl IndexInfo {
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        write_u32_varint(&mut buf, self.last_segment_id.0)?;
        write_u32_varint(&mut buf, self.segments.len() as u32)?;
        for seg in &self.segments {
            write_u32_varint(&mut buf, seg.id.0)?;
            write_u32_varint(&mut buf, seg.block_count)?;
            write_u32_varint(&mut buf, seg.last_key.0)?;
            write_u64_varint(&mut buf, seg.checksum)?;
            write_u64_varint(&mut buf, seg.op_id_range.0 .0)?;
            write_u64_varint(&mut buf, seg.op_id_range.1 .0)?;
        }
        write_u32_varint(&mut buf, self.attributes.len() as u32)?;
        for (name, value) in &self.attributes {
            write_string(&mut buf, name)?;
            write_string(&mut buf, value)?;
        }
        let crc = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(crc).map_err(EncodeError::Io)?;
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::CorruptBlock("info file too short".into()));
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().expect("checked length above"));
        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(DecodeError::CorruptBlock("IndexInfo checksum mismatch".into()));
        }

        let mut cursor = Cursor::new(body);
        let last_segment_id = SegmentId(read_u32_varint(&mut cursor)?);
        let segment_count = read_u32_varint(&mut cursor)?;
        let mut segments = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            let id = SegmentId(read_u32_varint(&mut cursor)?);
            let block_count = read_u32_varint(&mut cursor)?;
            let last_key = Hash(read_u32_varint(&mut cursor)?);
            let checksum = read_u64_varint(&mut cursor)?;
            let min_op_id = OpId(read_u64_varint(&mut cursor)?);
            let max_op_id = OpId(read_u64_varint(&mut cursor)?);
            segments.push(SegmentDescriptor {
                id,
                block_count,
                last_key,
                checksum,
                op_id_range: (min_op_id, max_op_id),
            });
        }

        let attr_count = read_u32_varint(&mut cursor)?;
        let mut attributes = BTreeMap::new();
        for _ in 0..attr_count {
            let name = read_string(&mut cursor)?;
            let value = read_string(&mut cursor)?;
            attributes.insert(name, value);
        }

        Ok(Self {
            last_segment_id,
            segments,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn roundtrips() {
        let mut info = IndexInfo {
            last_segment_id: SegmentId(3),
            segments: vec![SegmentDescriptor {
                id: SegmentId(1),
                block_count: 4,
                last_key: Hash(999),
                checksum: 0xdead_beef,
                op_id_range: (OpId(1), OpId(10)),
            }],
            attributes: BTreeMap::new(),
        };
        info.attributes.insert("foo".into(), "bar".into());

        let bytes = info.serialize().unwrap();
        let back = IndexInfo::deserialize(&bytes).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let info = IndexInfo::default();
        let mut bytes = info.serialize().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            IndexInfo::deserialize(&bytes),
            Err(DecodeError::CorruptBlock(_))
        ));
    }
}
