// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component F — the tiered merge policy (Lucene `TieredMergePolicy`-style).
//!
//! Segments are sorted by size descending. `allowedSegmentCount` is found
//! by walking virtual tiers starting at the smallest segment's size and
//! growing geometrically by `max_merge_at_once`, each tier contributing
//! `max_segments_per_tier` slots, until a tier's size covers the whole
//! index. If the segment count is within that budget, nothing merges.
//! Otherwise every contiguous run of exactly `max_merge_at_once` segments
//! (in size-sorted order) is scored, and the lowest-scoring run is
//! returned, ties going to the first run encountered.

use crate::ids::SegmentId;

#[derive(Copy, Clone, Debug)]
pub struct SegmentMeta {
    pub id: SegmentId,
    /// Posting count, used as the size unit for tiering.
    pub size: u64,
}

#[derive(Copy, Clone, Debug)]
pub struct MergePolicy {
    pub max_merge_at_once: usize,
    pub max_segments_per_tier: usize,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            max_merge_at_once: 4,
            max_segments_per_tier: 3,
        }
    }
}

/// Number of segments the index is allowed to hold before a merge is
/// triggered, given the smallest segment's size and the total size.
#[must_use]
pub fn allowed_segment_count(
    min_size: u64,
    total_size: u64,
    max_merge_at_once: usize,
    max_segments_per_tier: usize,
) -> usize {
    let mut allowed = 0usize;
    let mut level_size = min_size.max(1);
    loop {
        allowed += max_segments_per_tier;
        if level_size >= total_size {
            break;
        }
        level_size = level_size.saturating_mul(max_merge_at_once as u64);
    }
    allowed
}

/// `(size of smallest in the candidate) / (total size) * (total size)^0.05`.
/// Lower is better.
#[must_use]
pub fn candidate_score(window: &[SegmentMeta]) -> f64 {
    let total: u64 = window.iter().map(|s| s.size).sum();
    let smallest = window.iter().map(|s| s.size).min().unwrap_or(0);
    if total == 0 {
        return 0.0;
    }
    (smallest as f64 / total as f64) * (total as f64).powf(0.05)
}

impl MergePolicy {
    /// Picks the next merge to run, or `None` if `segments` is already
    /// within budget.
    #[must_use]
    pub fn find_merge(&self, segments: &[SegmentMeta]) -> Option<Vec<SegmentId>> {
        if self.max_merge_at_once < 2 || segments.len() < self.max_merge_at_once {
            return None;
        }

        let mut sorted = segments.to_vec();
        sorted.sort_by(|a, b| b.size.cmp(&a.size));

        let total: u64 = sorted.iter().map(|s| s.size).sum();
        let min_size = sorted.last().map_or(1, |s| s.size);
        let allowed = allowed_segment_count(
            min_size,
            total,
            self.max_merge_at_once,
            self.max_segments_per_tier,
        );
        if sorted.len() <= allowed {
            return None;
        }

        let mut best: Option<(f64, usize)> = None;
        for start in 0..=(sorted.len() - self.max_merge_at_once) {
            let window = &sorted[start..start + self.max_merge_at_once];
            let score = candidate_score(window);
            let better = match best {
                None => true,
                Some((best_score, _)) => score < best_score,
            };
            if better {
                best = Some((score, start));
            }
        }

        best.map(|(_, start)| {
            sorted[start..start + self.max_merge_at_once]
                .iter()
                .map(|s| s.id)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn meta(id: u32, size: u64) -> SegmentMeta {
        SegmentMeta {
            id: SegmentId(id),
            size,
        }
    }

    #[test]
    fn allowed_count_grows_geometrically() {
        assert_eq!(allowed_segment_count(5, 20, 2, 1), 3);
        assert_eq!(allowed_segment_count(5, 15, 2, 1), 3);
    }

    #[test]
    fn candidate_score_matches_formula() {
        let window = vec![meta(1, 5), meta(2, 5)];
        let score = candidate_score(&window);
        assert!((score - 0.5 * 10f64.powf(0.05)).abs() < 1e-9);
    }

    #[test]
    fn under_budget_does_not_merge() {
        let policy = MergePolicy::default();
        let segments = vec![meta(1, 10), meta(2, 20)];
        assert!(policy.find_merge(&segments).is_none());
    }

    #[test]
    fn over_budget_triggers_merge_and_ties_go_to_first_window() {
        let policy = MergePolicy {
            max_merge_at_once: 2,
            max_segments_per_tier: 1,
        };
        // 4 equal-size segments: allowed_segment_count(5, 20, 2, 1) == 3,
        // so 4 segments is over budget and a merge must be chosen.
        let segments = vec![meta(1, 5), meta(2, 5), meta(3, 5), meta(4, 5)];
        let merge = policy.find_merge(&segments).unwrap();
        assert_eq!(merge, vec![SegmentId(1), SegmentId(2)]);
    }
}
