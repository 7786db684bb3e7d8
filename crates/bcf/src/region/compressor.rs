//! Greedy box carving over same-descriptor cell sets.
//!
//! For each descriptor the compressor repeatedly takes the smallest remaining
//! cell as a seed, grows a box from it under each of the six axis orders, keeps
//! the largest candidate and removes its cells. Growth along an axis only
//! advances while the entire new face is present, so every emitted box is
//! fully covered by real cells and boxes of one descriptor never overlap.
//!
//! The result is deterministic: seeds follow `(x, y, z)` order and ties
//! between candidates go to the earlier axis order, independent of how the
//! cells were batched or whether rayon was used.

use rayon::prelude::*;

use crate::model::{BoundingBox, LocalPos, Region};
use crate::partition::CellGroup;
use crate::region::cell_set::{CellSet, MembershipSet, RemovalStrategy};

/// Axis growth orders in evaluation order: XYZ, XZY, YXZ, YZX, ZXY, ZYX.
pub const AXIS_ORDERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Default remaining-cell count above which candidates are grown in parallel.
pub const DEFAULT_PARALLEL_CANDIDATE_THRESHOLD: usize = 5_000;

/// Default set size above which a rebuild is filtered in parallel.
pub const DEFAULT_PARALLEL_REMOVAL_THRESHOLD: usize = 50_000;

/// Default partition cell count above which descriptors run in parallel.
pub const DEFAULT_PARALLEL_DESCRIPTOR_THRESHOLD: usize = 20_000;

/// Default largest bounding volume handled with a dense bitmask.
pub const DEFAULT_DENSE_VOLUME_LIMIT: u64 = 1 << 22;

/// Tuning knobs for [`RegionCompressor`]. None of them affect the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressorConfig {
    /// Grow the six candidates concurrently when more cells than this remain.
    pub parallel_candidate_threshold: usize,
    /// Filter rebuilds on the rayon pool when the set is larger than this.
    pub parallel_removal_threshold: usize,
    /// Compress descriptors concurrently when a partition holds more cells
    /// than this.
    pub parallel_descriptor_threshold: usize,
    /// Largest bounding volume for which a dense membership set is used.
    pub dense_volume_limit: u64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            parallel_candidate_threshold: DEFAULT_PARALLEL_CANDIDATE_THRESHOLD,
            parallel_removal_threshold: DEFAULT_PARALLEL_REMOVAL_THRESHOLD,
            parallel_descriptor_threshold: DEFAULT_PARALLEL_DESCRIPTOR_THRESHOLD,
            dense_volume_limit: DEFAULT_DENSE_VOLUME_LIMIT,
        }
    }
}

impl CompressorConfig {
    /// Sets the parallel candidate threshold.
    pub fn with_parallel_candidate_threshold(mut self, threshold: usize) -> Self {
        self.parallel_candidate_threshold = threshold;
        self
    }

    /// Sets the parallel removal threshold.
    pub fn with_parallel_removal_threshold(mut self, threshold: usize) -> Self {
        self.parallel_removal_threshold = threshold;
        self
    }

    /// Sets the parallel descriptor threshold.
    pub fn with_parallel_descriptor_threshold(mut self, threshold: usize) -> Self {
        self.parallel_descriptor_threshold = threshold;
        self
    }

    /// Sets the dense volume limit. Zero forces hash sets.
    pub fn with_dense_volume_limit(mut self, limit: u64) -> Self {
        self.dense_volume_limit = limit;
        self
    }
}

/// Converts cell groups into non-overlapping box regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionCompressor {
    config: CompressorConfig,
}

impl RegionCompressor {
    /// Creates a compressor.
    pub fn new(config: CompressorConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Compresses one partition's groups.
    ///
    /// Groups are expected to carry distinct descriptor ids (see
    /// [`crate::partition::merge_groups`]). Regions are returned grouped by
    /// input group order, each group's regions in seed order.
    pub fn compress(&self, groups: &[CellGroup]) -> Vec<Region> {
        let total: usize = groups.iter().map(CellGroup::len).sum();
        if groups.len() > 1 && total > self.config.parallel_descriptor_threshold {
            groups
                .par_iter()
                .map(|group| self.compress_group(group))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        } else {
            groups
                .iter()
                .flat_map(|group| self.compress_group(group))
                .collect()
        }
    }

    /// Compresses a single group into regions of its descriptor.
    pub fn compress_group(&self, group: &CellGroup) -> Vec<Region> {
        let mut seeds = group.cells.clone();
        seeds.sort_unstable();
        seeds.dedup();

        let mut set = MembershipSet::build(&seeds, self.config.dense_volume_limit);
        let mut regions = Vec::new();
        let mut cursor = 0;

        while !set.is_empty() {
            while cursor < seeds.len() && !set.contains(seeds[cursor]) {
                cursor += 1;
            }
            let Some(&seed) = seeds.get(cursor) else {
                break;
            };

            let best = self.best_candidate(&set, seed);
            let strategy = RemovalStrategy::choose(
                best.volume(),
                set.len(),
                self.config.parallel_removal_threshold,
            );
            set.remove_box(&best, strategy);
            regions.push(Region::new(group.descriptor_id, best));
        }

        regions
    }

    fn best_candidate<S: CellSet>(&self, set: &S, seed: LocalPos) -> BoundingBox {
        let candidates: Vec<BoundingBox> = if set.len() > self.config.parallel_candidate_threshold {
            AXIS_ORDERS
                .par_iter()
                .map(|order| grow(set, seed, order))
                .collect()
        } else {
            AXIS_ORDERS.iter().map(|order| grow(set, seed, order)).collect()
        };
        pick_largest(&candidates).unwrap_or_else(|| BoundingBox::unit(seed))
    }
}

/// First candidate with strictly the largest volume.
fn pick_largest(candidates: &[BoundingBox]) -> Option<BoundingBox> {
    let mut best: Option<BoundingBox> = None;
    for candidate in candidates {
        match best {
            Some(b) if candidate.volume() <= b.volume() => {}
            _ => best = Some(*candidate),
        }
    }
    best
}

/// Grows a box from `seed`, one axis at a time in `order`.
pub fn grow<S: CellSet + ?Sized>(set: &S, seed: LocalPos, order: &[usize; 3]) -> BoundingBox {
    let lo = seed.to_array();
    let mut hi = lo;
    for &axis in order {
        while let Some(next) = hi[axis].checked_add(1) {
            if !face_is_full(set, lo, hi, axis, next) {
                break;
            }
            hi[axis] = next;
        }
    }
    BoundingBox::new(LocalPos::from_array(lo), LocalPos::from_array(hi))
}

/// Checks the slab at `axis == at` spanning the current box on the other axes.
fn face_is_full<S: CellSet + ?Sized>(
    set: &S,
    lo: [i16; 3],
    hi: [i16; 3],
    axis: usize,
    at: i16,
) -> bool {
    let (a, b) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let mut p = [0i16; 3];
    p[axis] = at;
    for u in lo[a]..=hi[a] {
        p[a] = u;
        for v in lo[b]..=hi[b] {
            p[b] = v;
            if !set.contains(LocalPos::from_array(p)) {
                return false;
            }
        }
    }
    true
}
