// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment file header (spec.md §6): the first bytes of a `.fid` file.

use crate::coding::{read_u32_varint, write_u32_varint, Decode, Encode};
use crate::error::{DecodeError, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic marking a valid segment data file. Must match exactly on read.
pub const MAGIC: u32 = 0x22DE_521C;

/// Only one on-disk format exists today; kept as a field (rather than a
/// hard-coded constant) so a future format can be introduced without
/// breaking the header shape.
pub const FORMAT_VERSION: u32 = 1;

/// Delta + varint posting codec (the only one this crate implements).
pub const CODEC_DELTA_VARINT: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub format_version: u32,
    pub block_size: u32,
    pub codec_id: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            block_size: crate::block::DEFAULT_BLOCK_SIZE as u32,
            codec_id: CODEC_DELTA_VARINT,
        }
    }
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer
            .write_u32::<BigEndian>(MAGIC)
            .map_err(EncodeError::Io)?;
        write_u32_varint(writer, self.format_version)?;
        write_u32_varint(writer, self.block_size)?;
        write_u32_varint(writer, self.codec_id)?;
        Ok(())
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let magic = reader.read_u32::<BigEndian>().map_err(DecodeError::Io)?;
        if magic != MAGIC {
            return Err(DecodeError::CorruptBlock(format!(
                "bad segment magic: expected {MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        let format_version = read_u32_varint(reader)?;
        let block_size = read_u32_varint(reader)?;
        let codec_id = read_u32_varint(reader)?;
        Ok(Self {
            format_version,
            block_size,
            codec_id,
        })
    }
}
