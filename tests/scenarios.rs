// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end scenarios S1-S6 from spec.md §8, exercised against both
//! an in-memory directory and, for the crash-recovery case, a real
//! filesystem directory reopened from scratch.

use fpindex::merge_policy::MergePolicy;
use fpindex::{DocId, Hash, Index, IndexConfig, Op, SearchHit, SessionOptions};
use std::sync::Arc;
use test_log::test;

fn hits(index: &Index, query: &[u32]) -> Vec<(u32, u32)> {
    let query: Vec<Hash> = query.iter().copied().map(Hash).collect();
    index
        .search(&query, &SessionOptions::default())
        .unwrap()
        .into_iter()
        .map(|SearchHit { doc_id, score }| (doc_id.0, score))
        .collect()
}

fn insert(index: &Index, doc: u32, hashes: &[u32]) {
    index
        .update(
            vec![Op::InsertOrUpdate {
                doc_id: DocId(doc),
                hashes: hashes.iter().copied().map(Hash).collect(),
            }],
            0,
        )
        .unwrap();
}

fn delete(index: &Index, doc: u32) {
    index
        .update(vec![Op::Delete { doc_id: DocId(doc) }], 0)
        .unwrap();
}

#[test]
fn s1_basic_insert_search() {
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), IndexConfig::default()).unwrap();
    insert(&index, 1, &[100, 200, 300]);
    assert_eq!(hits(&index, &[200, 300, 999]), vec![(1, 2)]);
}

#[test]
fn s2_update_replaces_prior_terms() {
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), IndexConfig::default()).unwrap();
    insert(&index, 1, &[100, 200, 300]);
    insert(&index, 1, &[400, 500, 600]);
    assert_eq!(hits(&index, &[100, 500, 999]), vec![(1, 1)]);
}

#[test]
fn s3_delete_masks_across_segments() {
    let mut config = IndexConfig::default();
    config.max_stage_size = 3;
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), config).unwrap();

    insert(&index, 1, &[10, 20, 30]);
    index.flush().unwrap();
    delete(&index, 1);

    assert_eq!(hits(&index, &[10, 20, 30]), Vec::<(u32, u32)>::new());
}

#[test]
fn s4_merge_correctness() {
    let mut config = IndexConfig::default();
    config.max_stage_size = 1;
    config.merge_policy = MergePolicy {
        max_merge_at_once: 2,
        max_segments_per_tier: 2,
    };
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), config).unwrap();

    for doc in 1..=4u32 {
        insert(&index, doc, &[7, 9, 12]);
        index.flush().unwrap();
        assert_eq!(
            hits(&index, &[7, 9, 12]),
            (1..=doc).map(|d| (d, 3)).collect::<Vec<_>>(),
            "hits must be correct after every commit, ties broken by docId"
        );
    }

    let allowed = fpindex::merge_policy::allowed_segment_count(1, 4, 2, 2);
    let segment_count = index.segment_count();
    assert!(
        segment_count <= allowed,
        "segment count {segment_count} exceeds allowedSegmentCount {allowed}"
    );
}

#[test]
fn s5_recovery_replays_unflushed_ops() {
    let tmp = tempfile::tempdir().unwrap();
    let dir_path = tmp.path().to_path_buf();

    {
        let dir: Arc<dyn fpindex::Directory> =
            Arc::new(fpindex::directory::fs::FsDirectory::open(&dir_path).unwrap());
        let index = Index::open(dir, IndexConfig::default()).unwrap();
        insert(&index, 1, &[100, 200, 300]);
        // Dropped here with no `flush()` — simulates a crash before the
        // background writer ever seals the active builder.
    }

    let dir: Arc<dyn fpindex::Directory> =
        Arc::new(fpindex::directory::fs::FsDirectory::open(&dir_path).unwrap());
    let index = Index::open(dir, IndexConfig::default()).unwrap();
    assert_eq!(hits(&index, &[100, 200, 300]), vec![(1, 3)]);

    insert(&index, 1, &[400, 500, 600]);
    assert_eq!(hits(&index, &[400, 500, 600]), vec![(1, 3)]);
}

#[test]
fn s6_attribute_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let dir_path = tmp.path().to_path_buf();

    {
        let dir: Arc<dyn fpindex::Directory> =
            Arc::new(fpindex::directory::fs::FsDirectory::open(&dir_path).unwrap());
        let index = Index::open(dir, IndexConfig::default()).unwrap();
        index.set_attribute("foo", "bar").unwrap();
    }

    let dir: Arc<dyn fpindex::Directory> =
        Arc::new(fpindex::directory::fs::FsDirectory::open(&dir_path).unwrap());
    let index = Index::open(dir, IndexConfig::default()).unwrap();
    assert_eq!(index.get_attribute("foo"), Some("bar".to_string()));
}

#[test]
fn boundary_empty_query_returns_empty() {
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), IndexConfig::default()).unwrap();
    insert(&index, 1, &[1, 2, 3]);
    assert_eq!(hits(&index, &[]), Vec::<(u32, u32)>::new());
}

#[test]
fn boundary_query_with_unseen_hashes_only_is_empty() {
    let index = Index::open(fpindex::directory::ram::RamDirectory::new(), IndexConfig::default()).unwrap();
    insert(&index, 1, &[1, 2, 3]);
    assert_eq!(hits(&index, &[404, 405]), Vec::<(u32, u32)>::new());
}
