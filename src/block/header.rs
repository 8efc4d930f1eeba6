// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, Encode};
use crate::error::{DecodeError, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// `itemCount` is capped at `u16`, so a block may hold at most 65535
/// postings (spec.md §4.A).
pub const BLOCK_HEADER_LEN: usize = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub item_count: u16,
}

impl Header {
    #[must_use]
    pub fn encoded_len() -> usize {
        BLOCK_HEADER_LEN
    }
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer
            .write_u16::<LittleEndian>(self.item_count)
            .map_err(EncodeError::Io)
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let item_count = reader
            .read_u16::<LittleEndian>()
            .map_err(DecodeError::Io)?;
        Ok(Self { item_count })
    }
}
