// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-index directory layout (spec.md §6) and small filesystem helpers,
//! grounded on the teacher crate's own `file.rs`.

use std::fs::File;
use std::path::Path;

/// `info_N` — the `N`th `IndexInfo` revision.
#[must_use]
pub fn info_file_name(revision: u64) -> String {
    format!("info_{revision}")
}

/// `segment_<id>.fii` — sparse block index.
#[must_use]
pub fn segment_index_file_name(id: u32) -> String {
    format!("segment_{id}.fii")
}

/// `segment_<id>.fid` — block data.
#[must_use]
pub fn segment_data_file_name(id: u32) -> String {
    format!("segment_{id}.fid")
}

/// `segment_<id>.fdx` — doc table.
#[must_use]
pub fn segment_docs_file_name(id: u32) -> String {
    format!("segment_{id}.fdx")
}

pub const CONTROL_DB_FILE: &str = "control.db";

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let file = File::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory<P: AsRef<Path>>(_path: P) -> std::io::Result<()> {
    Ok(())
}
