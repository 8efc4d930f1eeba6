// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tunables for an [`crate::index::Index`] and for an individual search
//! call, split the way the teacher crate separates its on-disk
//! configuration from its per-read `ReadOptions`.

use crate::merge_policy::MergePolicy;

/// Index-wide configuration, fixed at `open`/`create` time.
#[derive(Copy, Clone, Debug)]
pub struct IndexConfig {
    /// Posting count at which the active builder segment is frozen and
    /// handed off to be sealed to disk in the background.
    pub max_stage_size: usize,
    /// Byte size of one posting block (`.fid` file).
    pub block_size: u32,
    pub merge_policy: MergePolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_stage_size: 1_000_000,
            block_size: crate::block::DEFAULT_BLOCK_SIZE as u32,
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Per-search tunables, supplied fresh on every query.
#[derive(Copy, Clone, Debug)]
pub struct SessionOptions {
    pub max_results: usize,
    pub timeout_ms: u64,
    /// Only results whose score is within this percentage of the top
    /// result's score are returned (0..=100). `100` disables the cutoff.
    pub top_score_percent: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            timeout_ms: 10_000,
            top_score_percent: 100,
        }
    }
}
