// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component H — the index manager.
//!
//! `Index` owns one `Mutex<MutableState>` that every write serializes
//! through (spec.md §5 `Index.mutex`) and one `RwLock<Arc<Snapshot>>`
//! that every search reads through lock-free, cloning the `Arc` and
//! letting the old snapshot drop once the last reader is done with it.
//! A background thread drains a queue of frozen builders, sealing each
//! to disk and then checking the merge policy, so `update` never blocks
//! on disk I/O beyond the oplog append that makes it durable.

use super::info::{IndexInfo, SegmentDescriptor};
use super::snapshot::{SearchHit, Snapshot};
use crate::builder::BuilderSegment;
use crate::config::{IndexConfig, SessionOptions};
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::file::{
    info_file_name, segment_data_file_name, segment_docs_file_name, segment_index_file_name,
};
use crate::ids::{Hash, OpId, SegmentId};
use crate::merge_policy::SegmentMeta;
use crate::merger::{self, MergeInput};
use crate::op::Op;
use crate::oplog::OpLog;
use crate::segment::Segment;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;

struct MutableState {
    revision: u64,
    info: IndexInfo,
    segments: FxHashMap<SegmentId, Segment>,
    /// Builders already frozen and handed to the writer thread, kept
    /// here (and in every snapshot) so they stay searchable until their
    /// seal completes.
    pending: Vec<Arc<BuilderSegment>>,
    active: Arc<BuilderSegment>,
}

struct Shared {
    dir: Arc<dyn Directory>,
    config: IndexConfig,
    oplog: Arc<OpLog>,
    state: Mutex<MutableState>,
    snapshot: RwLock<Arc<Snapshot>>,
}

/// One open, segmented inverted index.
pub struct Index {
    shared: Arc<Shared>,
    seal_tx: Option<Sender<Arc<BuilderSegment>>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl Index {
    /// Opens `dir` as an index, replaying any oplog entries not yet
    /// covered by a sealed segment, and starts the background writer
    /// thread (spec.md §4.H "open").
    pub fn open(dir: Arc<dyn Directory>, config: IndexConfig) -> Result<Self> {
        let (mut info, revision) = load_latest_info(&*dir)?;

        let mut segments = FxHashMap::default();
        for desc in &info.segments {
            segments.insert(desc.id, Segment::open(&*dir, desc.id, desc.op_id_range)?);
        }

        let oplog = Arc::new(OpLog::open(&*dir)?);
        let last_persisted = info
            .segments
            .iter()
            .map(|s| s.op_id_range.1)
            .max()
            .unwrap_or(OpId::ZERO);

        info.last_segment_id = SegmentId(info.last_segment_id.0 + 1);
        let active = Arc::new(BuilderSegment::new(info.last_segment_id));

        let replay = oplog.read(last_persisted, usize::MAX)?;
        if !replay.is_empty() {
            log::info!(
                "replaying {} oplog entries since last persisted op {last_persisted}",
                replay.len()
            );
        }
        for entry in replay {
            apply_op(&active, &mut info, entry.op_id, &entry.op)?;
        }

        let initial_snapshot = Arc::new(Snapshot {
            info: info.clone(),
            segments: segments.clone(),
            stage: vec![active.clone()],
        });

        let shared = Arc::new(Shared {
            dir,
            config,
            oplog,
            state: Mutex::new(MutableState {
                revision,
                info,
                segments,
                pending: Vec::new(),
                active,
            }),
            snapshot: RwLock::new(initial_snapshot),
        });

        let (seal_tx, seal_rx) = crossbeam_channel::unbounded::<Arc<BuilderSegment>>();
        let writer_shared = shared.clone();
        let writer_handle = std::thread::Builder::new()
            .name("fpindex-writer".into())
            .spawn(move || {
                for builder in seal_rx {
                    if let Err(err) = seal_and_maybe_merge(&writer_shared, builder) {
                        log::error!("background seal failed: {err}");
                    }
                }
            })
            .map_err(Error::Io)?;

        Ok(Self {
            shared,
            seal_tx: Some(seal_tx),
            writer_handle: Some(writer_handle),
        })
    }

    /// Applies `ops` as one batch: durably appended to the oplog first,
    /// then folded into the active builder (spec.md §4.H "update").
    /// Returns the `OpId` assigned to the last op in the batch.
    pub fn update(&self, ops: Vec<Op>, op_time: i64) -> Result<OpId> {
        if ops.is_empty() {
            return self.shared.oplog.get_last_op_id();
        }

        let mut state = self.shared.state.lock();

        // Seal a builder that's already over budget before this batch
        // lands, so every accepted op goes into a builder that is
        // guaranteed under `max_stage_size` at the start of its life
        // (spec.md §4.H "update" steps 2-3).
        if state.active.len() >= self.shared.config.max_stage_size {
            let sealed = rotate_active_locked(&mut state);
            let _ = self.seal_tx.as_ref().expect("open() always sets it").send(sealed);
        }

        let last_id = self.shared.oplog.write(&ops, op_time)?;
        let first_id = OpId(last_id.0 - (ops.len() as u64 - 1));

        let mut touched_attributes = false;
        for (i, op) in ops.iter().enumerate() {
            let op_id = OpId(first_id.0 + i as u64);
            if matches!(op, Op::SetAttribute { .. }) {
                touched_attributes = true;
            }
            apply_op(&state.active, &mut state.info, op_id, op)?;
        }

        if touched_attributes {
            persist_info_locked(&self.shared.dir, &mut state)?;
        }

        publish_locked(&self.shared, &state);
        Ok(last_id)
    }

    /// Runs one search against the currently published snapshot
    /// (spec.md §4.H "search"): lock-free besides the `Arc` clone.
    pub fn search(&self, query: &[Hash], opts: &SessionOptions) -> Result<Vec<SearchHit>> {
        let snapshot = self.shared.snapshot.read().clone();
        snapshot.search(query, opts)
    }

    /// Forces the active builder to seal now, regardless of
    /// `max_stage_size`, and waits for that seal (and any merge it
    /// triggers) to complete before returning.
    pub fn flush(&self) -> Result<()> {
        let sealed = {
            let mut state = self.shared.state.lock();
            if state.active.is_empty() {
                None
            } else {
                let sealed = rotate_active_locked(&mut state);
                publish_locked(&self.shared, &state);
                Some(sealed)
            }
        };

        if let Some(sealed) = sealed {
            seal_and_maybe_merge(&self.shared, sealed)?;
        }
        Ok(())
    }

    /// Number of sealed, on-disk segments in the current snapshot
    /// (excludes the in-memory write stage).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.shared.snapshot.read().segments.len()
    }

    /// Current value of an `IndexInfo`-level attribute, if set.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.shared.snapshot.read().info.attributes.get(name).cloned()
    }

    /// Sets an `IndexInfo`-level attribute through the normal update
    /// path, so it is itself durable and crash-recoverable.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) -> Result<OpId> {
        self.update(
            vec![Op::SetAttribute {
                name: name.into(),
                value: value.into(),
            }],
            0,
        )
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        // Dropping the sender closes the channel; the writer thread's
        // `for builder in seal_rx` loop then exits on its own.
        self.seal_tx.take();
        if let Some(handle) = self.writer_handle.take() {
            let _ = handle.join();
        }
    }
}

fn apply_op(active: &BuilderSegment, info: &mut IndexInfo, op_id: OpId, op: &Op) -> Result<()> {
    match op {
        Op::InsertOrUpdate { doc_id, hashes } => active.put(*doc_id, hashes, op_id),
        Op::Delete { doc_id } => active.delete(*doc_id, op_id),
        Op::SetAttribute { name, value } => {
            info.attributes.insert(name.clone(), value.clone());
            Ok(())
        }
    }
}

/// Freezes the current active builder, pushes it onto `pending`, and
/// installs a fresh one under a newly allocated segment id. Returns the
/// now-frozen builder, already reflected in `pending`.
fn rotate_active_locked(state: &mut MutableState) -> Arc<BuilderSegment> {
    state.info.last_segment_id = SegmentId(state.info.last_segment_id.0 + 1);
    let next_active = Arc::new(BuilderSegment::new(state.info.last_segment_id));
    let sealed = std::mem::replace(&mut state.active, next_active);
    sealed.freeze();
    state.pending.push(sealed.clone());
    sealed
}

fn publish_locked(shared: &Arc<Shared>, state: &MutableState) {
    let mut stage = state.pending.clone();
    stage.push(state.active.clone());
    let snapshot = Arc::new(Snapshot {
        info: state.info.clone(),
        segments: state.segments.clone(),
        stage,
    });
    *shared.snapshot.write() = snapshot;
}

/// Writes a fresh `info_N` manifest and best-effort deletes older
/// revisions (spec.md §6: the filename carries the revision, not the
/// content, so only the newest one matters once it's synced).
fn persist_info_locked(dir: &Arc<dyn Directory>, state: &mut MutableState) -> Result<()> {
    let next_revision = state.revision + 1;
    let bytes = state.info.serialize()?;
    let name = info_file_name(next_revision);

    let mut writer = dir.create_file(&name)?;
    writer.write_all(&bytes).map_err(Error::Io)?;
    writer.sync_all()?;
    state.revision = next_revision;

    if let Ok(files) = dir.list_files() {
        for file in files {
            if file.starts_with("info_") && file != name {
                let _ = dir.delete_file(&file);
            }
        }
    }
    Ok(())
}

fn load_latest_info(dir: &dyn Directory) -> Result<(IndexInfo, u64)> {
    let mut revisions: Vec<u64> = dir
        .list_files()?
        .into_iter()
        .filter_map(|name| name.strip_prefix("info_").and_then(|n| n.parse::<u64>().ok()))
        .collect();
    revisions.sort_unstable_by(|a, b| b.cmp(a));

    for revision in revisions {
        let name = info_file_name(revision);
        let reader = dir.open_read(&name)?;
        let bytes = reader.read_at(0, reader.len()? as usize)?;
        match IndexInfo::deserialize(&bytes) {
            Ok(info) => return Ok((info, revision)),
            Err(err) => log::warn!("discarding corrupt manifest {name}: {err}"),
        }
    }
    Ok((IndexInfo::default(), 0))
}

/// Runs on the background writer thread (or synchronously from
/// [`Index::flush`]): seals one frozen builder to disk, then checks the
/// merge policy and runs merges until the index is back within budget
/// (spec.md §4.F, §4.H "background").
fn seal_and_maybe_merge(shared: &Arc<Shared>, builder: Arc<BuilderSegment>) -> Result<()> {
    builder.freeze();
    let Some(op_id_range) = builder.op_id_range() else {
        // Nothing was ever written to this builder: drop it silently.
        let mut state = shared.state.lock();
        state.pending.retain(|b| !Arc::ptr_eq(b, &builder));
        publish_locked(shared, &state);
        return Ok(());
    };

    let id = builder.id();
    let writer = builder.into_segment_writer(shared.config.block_size)?;
    let summary = writer.finish(&*shared.dir, id, op_id_range)?;
    let segment = Segment::open(&*shared.dir, id, op_id_range)?;

    {
        let mut state = shared.state.lock();
        state.pending.retain(|b| !Arc::ptr_eq(b, &builder));
        state.segments.insert(id, segment);
        state.info.segments.push(SegmentDescriptor {
            id,
            block_count: summary.block_count,
            last_key: summary.last_key,
            checksum: summary.checksum,
            op_id_range,
        });
        persist_info_locked(&shared.dir, &mut state)?;

        let last_persisted = state
            .info
            .segments
            .iter()
            .map(|s| s.op_id_range.1)
            .max()
            .unwrap_or(OpId::ZERO);
        shared.oplog.truncate(last_persisted)?;
        publish_locked(shared, &state);
    }

    maybe_merge(shared)
}

fn maybe_merge(shared: &Arc<Shared>) -> Result<()> {
    loop {
        let merge_ids = {
            let state = shared.state.lock();
            let metas: Vec<SegmentMeta> = state
                .info
                .segments
                .iter()
                .map(|s| SegmentMeta {
                    id: s.id,
                    size: u64::from(s.block_count),
                })
                .collect();
            shared.config.merge_policy.find_merge(&metas)
        };
        let Some(merge_ids) = merge_ids else {
            return Ok(());
        };
        run_merge(shared, &merge_ids)?;
    }
}

fn run_merge(shared: &Arc<Shared>, ids: &[SegmentId]) -> Result<()> {
    let segments: Vec<Segment> = {
        let state = shared.state.lock();
        ids.iter()
            .map(|id| {
                state
                    .segments
                    .get(id)
                    .cloned()
                    .expect("merge candidate must still be registered")
            })
            .collect()
    };

    let inputs = segments
        .iter()
        .map(|seg| {
            Ok(MergeInput {
                postings: seg.all_postings()?,
                doc_table: seg.doc_table().clone(),
                op_id_range: seg.op_id_range(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let new_id = {
        let mut state = shared.state.lock();
        state.info.last_segment_id = SegmentId(state.info.last_segment_id.0 + 1);
        state.info.last_segment_id
    };

    let (writer, op_id_range) = merger::merge(inputs, shared.config.block_size)?;
    let summary = writer.finish(&*shared.dir, new_id, op_id_range)?;
    let merged_segment = Segment::open(&*shared.dir, new_id, op_id_range)?;

    {
        let mut state = shared.state.lock();
        for id in ids {
            state.segments.remove(id);
            state.info.segments.retain(|s| s.id != *id);
        }
        state.segments.insert(new_id, merged_segment);
        state.info.segments.push(SegmentDescriptor {
            id: new_id,
            block_count: summary.block_count,
            last_key: summary.last_key,
            checksum: summary.checksum,
            op_id_range,
        });
        persist_info_locked(&shared.dir, &mut state)?;
        publish_locked(shared, &state);
    }

    for id in ids {
        let _ = shared.dir.delete_file(&segment_data_file_name(id.0));
        let _ = shared.dir.delete_file(&segment_index_file_name(id.0));
        let _ = shared.dir.delete_file(&segment_docs_file_name(id.0));
    }
    log::debug!("merged {} segments into segment {new_id}", ids.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use crate::ids::DocId;
    use test_log::test;

    fn open(config: IndexConfig) -> Index {
        Index::open(RamDirectory::new(), config).unwrap()
    }

    #[test]
    fn insert_then_search() {
        let index = open(IndexConfig::default());
        index
            .update(
                vec![Op::InsertOrUpdate {
                    doc_id: DocId(1),
                    hashes: vec![Hash(10), Hash(20)],
                }],
                0,
            )
            .unwrap();

        let hits = index.search(&[Hash(10), Hash(20)], &SessionOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, DocId(1));
        assert_eq!(hits[0].score, 2);
    }

    #[test]
    fn update_replaces_prior_terms_across_search() {
        let index = open(IndexConfig::default());
        index
            .update(
                vec![Op::InsertOrUpdate {
                    doc_id: DocId(1),
                    hashes: vec![Hash(1)],
                }],
                0,
            )
            .unwrap();
        index
            .update(
                vec![Op::InsertOrUpdate {
                    doc_id: DocId(1),
                    hashes: vec![Hash(2)],
                }],
                0,
            )
            .unwrap();

        assert!(index.search(&[Hash(1)], &SessionOptions::default()).unwrap().is_empty());
        assert_eq!(
            index.search(&[Hash(2)], &SessionOptions::default()).unwrap()[0].doc_id,
            DocId(1)
        );
    }

    #[test]
    fn delete_masks_doc_after_flush_to_disk() {
        let mut config = IndexConfig::default();
        config.max_stage_size = 1;
        let index = open(config);

        index
            .update(
                vec![Op::InsertOrUpdate {
                    doc_id: DocId(1),
                    hashes: vec![Hash(1)],
                }],
                0,
            )
            .unwrap();
        index.flush().unwrap();

        index.update(vec![Op::Delete { doc_id: DocId(1) }], 0).unwrap();

        assert!(index.search(&[Hash(1)], &SessionOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn attribute_round_trips_through_flush() {
        let index = open(IndexConfig::default());
        index.set_attribute("foo", "bar").unwrap();
        assert_eq!(index.get_attribute("foo"), Some("bar".to_string()));
    }

    #[test]
    fn attribute_survives_close_and_reopen() {
        let dir = RamDirectory::new();
        {
            let index = Index::open(dir.clone(), IndexConfig::default()).unwrap();
            index.set_attribute("foo", "bar").unwrap();
        }
        let reopened = Index::open(dir, IndexConfig::default()).unwrap();
        assert_eq!(reopened.get_attribute("foo"), Some("bar".to_string()));
    }

    #[test]
    fn crash_recovery_replays_unsealed_ops() {
        let dir = RamDirectory::new();
        {
            let index = Index::open(dir.clone(), IndexConfig::default()).unwrap();
            index
                .update(
                    vec![Op::InsertOrUpdate {
                        doc_id: DocId(1),
                        hashes: vec![Hash(1), Hash(2)],
                    }],
                    0,
                )
                .unwrap();
            // Dropped here without an explicit flush: the active builder
            // is never sealed to disk, only durable in the oplog.
        }

        let reopened = Index::open(dir, IndexConfig::default()).unwrap();
        let hits = reopened
            .search(&[Hash(1), Hash(2)], &SessionOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, DocId(1));
    }

    #[test]
    fn merge_runs_when_segment_count_exceeds_budget() {
        let mut config = IndexConfig::default();
        config.max_stage_size = 1;
        config.merge_policy = crate::merge_policy::MergePolicy {
            max_merge_at_once: 2,
            max_segments_per_tier: 1,
        };
        let index = open(config);

        for doc in 1..=4u32 {
            index
                .update(
                    vec![Op::InsertOrUpdate {
                        doc_id: DocId(doc),
                        hashes: vec![Hash(doc)],
                    }],
                    0,
                )
                .unwrap();
            index.flush().unwrap();
        }

        let snapshot = index.shared.snapshot.read().clone();
        assert!(
            snapshot.segments.len() < 4,
            "expected a merge to have reduced the segment count, got {}",
            snapshot.segments.len()
        );
    }
}
