// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared (de)serialization traits, mirroring the teacher crate's own
//! `coding` module: small, infallible-looking trait objects over
//! `Read`/`Write`, varint-encoded where the wire format calls for it.

use crate::error::{DecodeError, EncodeError};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

pub trait Encode {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;
}

pub trait Decode: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}

/// Reads a `u32` unsigned varint (7-bit groups, MSB continuation),
/// mapping `varint-rs`'s I/O error into our `DecodeError`.
pub fn read_u32_varint<R: Read>(reader: &mut R) -> Result<u32, DecodeError> {
    reader.read_u32_varint().map_err(DecodeError::Io)
}

pub fn write_u32_varint<W: Write>(writer: &mut W, value: u32) -> Result<(), EncodeError> {
    writer.write_u32_varint(value).map_err(EncodeError::Io)
}

pub fn read_u64_varint<R: Read>(reader: &mut R) -> Result<u64, DecodeError> {
    reader.read_u64_varint().map_err(DecodeError::Io)
}

pub fn write_u64_varint<W: Write>(writer: &mut W, value: u64) -> Result<(), EncodeError> {
    writer.write_u64_varint(value).map_err(EncodeError::Io)
}

/// Writes a length-prefixed UTF-8 string (varint length + bytes), the
/// form used for attribute names/values in the `IndexInfo` file (§6).
pub fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), EncodeError> {
    write_u32_varint(writer, value.len() as u32)?;
    writer.write_all(value.as_bytes()).map_err(EncodeError::Io)
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<String, DecodeError> {
    let len = read_u32_varint(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(DecodeError::Io)?;
    String::from_utf8(buf).map_err(|_| DecodeError::CorruptBlock("invalid utf8 string".into()))
}
