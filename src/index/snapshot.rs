// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The immutable `(info, segments, builder)` triple (spec.md §3, §9)
//! readers pin for the duration of one search. Replaced wholesale and
//! atomically on every commit; old snapshots are simply dropped once
//! their last reader releases the `Arc`.

use super::info::IndexInfo;
use crate::builder::BuilderSegment;
use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::ids::{DocId, Hash, SegmentId};
use crate::segment::Segment;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

pub struct Snapshot {
    pub info: IndexInfo,
    pub segments: FxHashMap<SegmentId, Segment>,
    /// The write stage: the active (unfrozen) builder plus any frozen
    /// builders still awaiting background serialization to disk. All of
    /// them are searchable; only the active one accepts writes.
    pub stage: Vec<Arc<BuilderSegment>>,
}

/// One scored hit, ready for the final sort/cutoff in spec.md §4.H step 6.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: u32,
}

impl Snapshot {
    /// Runs the full per-snapshot search algorithm (spec.md §4.H, steps
    /// 2-6): aggregate hits from every segment plus the builder, keep
    /// each docId's hit from its highest-versioned, non-tombstoned
    /// source, then sort/cut.
    pub fn search(&self, query: &[Hash], opts: &SessionOptions) -> Result<Vec<SearchHit>> {
        let mut sorted_query: Vec<Hash> = query.to_vec();
        sorted_query.sort_unstable();
        sorted_query.dedup();

        let deadline = Instant::now() + std::time::Duration::from_millis(opts.timeout_ms);
        let mut global: FxHashMap<DocId, (u32, crate::ids::OpId)> = FxHashMap::default();

        for builder in &self.stage {
            self.check_deadline(deadline)?;
            for (doc_id, overlap) in builder.search(&sorted_query) {
                if let Some(entry) = builder.doc_entry(doc_id) {
                    upsert_winner(&mut global, doc_id, overlap, entry.version);
                }
            }
        }

        for segment in self.segments.values() {
            self.check_deadline(deadline)?;
            for (doc_id, overlap) in segment.search(&sorted_query)? {
                if let Some(entry) = segment.doc_table().get(doc_id) {
                    upsert_winner(&mut global, doc_id, overlap, entry.version);
                }
            }
        }

        let mut hits: Vec<SearchHit> = global
            .into_iter()
            .filter(|(doc_id, (_, version))| {
                let (true_version, tombstoned) = self.true_version(*doc_id);
                !tombstoned && true_version == *version
            })
            .map(|(doc_id, (score, _))| SearchHit { doc_id, score })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));

        if let Some(top) = hits.first().map(|h| h.score) {
            if opts.top_score_percent < 100 {
                let cutoff = (f64::from(top) * f64::from(opts.top_score_percent) / 100.0).ceil() as u32;
                hits.retain(|h| h.score >= cutoff);
            }
        }

        hits.truncate(opts.max_results);
        Ok(hits)
    }

    fn check_deadline(&self, deadline: Instant) -> Result<()> {
        if Instant::now() > deadline {
            return Err(Error::TimeoutExceeded);
        }
        Ok(())
    }

    /// The true winning `(version, tombstone)` for `doc_id` across every
    /// segment plus the builder, regardless of whether that source
    /// produced a hit for the current query (spec.md §4.H step 5).
    fn true_version(&self, doc_id: DocId) -> (crate::ids::OpId, bool) {
        let mut best_version = crate::ids::OpId::ZERO;
        let mut best_tombstone = false;

        for builder in &self.stage {
            if let Some(entry) = builder.doc_entry(doc_id) {
                if entry.version >= best_version {
                    best_version = entry.version;
                    best_tombstone = entry.tombstone;
                }
            }
        }
        for segment in self.segments.values() {
            if let Some(entry) = segment.doc_table().get(doc_id) {
                if entry.version >= best_version {
                    best_version = entry.version;
                    best_tombstone = entry.tombstone;
                }
            }
        }
        (best_version, best_tombstone)
    }
}

fn upsert_winner(
    global: &mut FxHashMap<DocId, (u32, crate::ids::OpId)>,
    doc_id: DocId,
    score: u32,
    version: crate::ids::OpId,
) {
    match global.get(&doc_id) {
        Some((_, existing_version)) if *existing_version >= version => {}
        _ => {
            global.insert(doc_id, (score, version));
        }
    }
}
