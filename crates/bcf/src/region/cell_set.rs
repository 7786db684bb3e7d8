//! Membership sets used while carving regions.
//!
//! Two representations share the [`CellSet`] interface:
//!
//! - [`HashCellSet`]: packed 48-bit keys in a hash set, for sparse or widely
//!   spread cells.
//! - [`DenseCellSet`]: one bit per cell of the group's bounding box, for
//!   compact, well-filled groups.
//!
//! [`MembershipSet::build`] picks between them from the group's extent.

use std::collections::HashSet;

use bitvec::prelude::*;
use rayon::prelude::*;

use crate::model::{BoundingBox, LocalPos};

/// Dense sets are only used when at least one cell in this many bounding-box
/// slots is occupied.
pub const DENSE_MAX_SPARSITY: u64 = 32;

/// How a carved box is removed from a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    /// Erase the box's cells one by one.
    EraseEach,
    /// Filter the whole set, keeping cells outside the box.
    Rebuild,
    /// Like [`RemovalStrategy::Rebuild`] but filtered on the rayon pool.
    ParallelRebuild,
}

impl RemovalStrategy {
    /// Picks a strategy for removing `volume` cells out of `remaining`.
    ///
    /// Rebuilding pays off once the box holds more than half the set.
    pub fn choose(volume: u64, remaining: usize, parallel_threshold: usize) -> Self {
        if volume.saturating_mul(2) <= remaining as u64 {
            Self::EraseEach
        } else if remaining > parallel_threshold {
            Self::ParallelRebuild
        } else {
            Self::Rebuild
        }
    }
}

/// A mutable set of local cell positions.
pub trait CellSet: Sync {
    /// Returns true if `pos` is present.
    fn contains(&self, pos: LocalPos) -> bool;

    /// Number of cells present.
    fn len(&self) -> usize;

    /// Returns true if no cells remain.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every cell inside `bounds`.
    fn remove_box(&mut self, bounds: &BoundingBox, strategy: RemovalStrategy);
}

#[inline]
fn pack(pos: LocalPos) -> u64 {
    (u64::from(pos.x as u16) << 32) | (u64::from(pos.y as u16) << 16) | u64::from(pos.z as u16)
}

#[inline]
fn unpack(key: u64) -> LocalPos {
    LocalPos::new((key >> 32) as u16 as i16, (key >> 16) as u16 as i16, key as u16 as i16)
}

/// Hash set of packed coordinates.
#[derive(Debug, Clone, Default)]
pub struct HashCellSet {
    keys: HashSet<u64>,
}

impl HashCellSet {
    /// Builds a set from cells; duplicates coalesce.
    pub fn from_cells(cells: &[LocalPos]) -> Self {
        let mut keys = HashSet::with_capacity(cells.len());
        keys.extend(cells.iter().copied().map(pack));
        Self { keys }
    }
}

impl CellSet for HashCellSet {
    #[inline]
    fn contains(&self, pos: LocalPos) -> bool {
        self.keys.contains(&pack(pos))
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn remove_box(&mut self, bounds: &BoundingBox, strategy: RemovalStrategy) {
        match strategy {
            RemovalStrategy::EraseEach => {
                for pos in bounds.cells() {
                    self.keys.remove(&pack(pos));
                }
            }
            RemovalStrategy::Rebuild => {
                self.keys.retain(|&key| !bounds.contains(unpack(key)));
            }
            RemovalStrategy::ParallelRebuild => {
                self.keys = self
                    .keys
                    .par_iter()
                    .copied()
                    .filter(|&key| !bounds.contains(unpack(key)))
                    .collect();
            }
        }
    }
}

/// Bitmask over a fixed bounding box.
#[derive(Debug, Clone)]
pub struct DenseCellSet {
    bounds: BoundingBox,
    dims: [usize; 3],
    bits: BitVec,
    count: usize,
}

impl DenseCellSet {
    /// Builds a set over `bounds`; every cell must lie inside it.
    pub fn from_cells(cells: &[LocalPos], bounds: BoundingBox) -> Self {
        let [dx, dy, dz] = bounds.extent();
        let dims = [dx as usize, dy as usize, dz as usize];
        let mut set = Self {
            bounds,
            dims,
            bits: bitvec![0; dims[0] * dims[1] * dims[2]],
            count: 0,
        };
        for &pos in cells {
            let idx = set.index(pos);
            if !set.bits[idx] {
                set.bits.set(idx, true);
                set.count += 1;
            }
        }
        set
    }

    #[inline]
    fn index(&self, pos: LocalPos) -> usize {
        // Offsets can span the full i16 range.
        let offset = |v: i16, min: i16| (i32::from(v) - i32::from(min)) as usize;
        let x = offset(pos.x, self.bounds.min.x);
        let y = offset(pos.y, self.bounds.min.y);
        let z = offset(pos.z, self.bounds.min.z);
        (x * self.dims[1] + y) * self.dims[2] + z
    }
}

impl CellSet for DenseCellSet {
    #[inline]
    fn contains(&self, pos: LocalPos) -> bool {
        self.bounds.contains(pos) && self.bits[self.index(pos)]
    }

    fn len(&self) -> usize {
        self.count
    }

    // Z runs are contiguous, so every strategy reduces to clearing rows.
    fn remove_box(&mut self, bounds: &BoundingBox, _strategy: RemovalStrategy) {
        let min = bounds.min;
        let max = bounds.max;
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                let start = self.index(LocalPos::new(x, y, min.z));
                let end = self.index(LocalPos::new(x, y, max.z)) + 1;
                let row = &mut self.bits[start..end];
                self.count -= row.count_ones();
                row.fill(false);
            }
        }
    }
}

/// Either membership representation, chosen per cell group.
#[derive(Debug, Clone)]
pub enum MembershipSet {
    /// Sparse representation.
    Hash(HashCellSet),
    /// Dense representation.
    Dense(DenseCellSet),
}

impl MembershipSet {
    /// Builds the cheaper representation for `cells`.
    ///
    /// A dense bitmask is used when the bounding volume is at most
    /// `dense_volume_limit` and no sparser than [`DENSE_MAX_SPARSITY`].
    pub fn build(cells: &[LocalPos], dense_volume_limit: u64) -> Self {
        match bounding_box(cells) {
            Some(bounds) => {
                let volume = bounds.volume();
                if volume <= dense_volume_limit
                    && volume <= (cells.len() as u64).saturating_mul(DENSE_MAX_SPARSITY)
                {
                    Self::Dense(DenseCellSet::from_cells(cells, bounds))
                } else {
                    Self::Hash(HashCellSet::from_cells(cells))
                }
            }
            None => Self::Hash(HashCellSet::default()),
        }
    }
}

impl CellSet for MembershipSet {
    #[inline]
    fn contains(&self, pos: LocalPos) -> bool {
        match self {
            Self::Hash(set) => set.contains(pos),
            Self::Dense(set) => set.contains(pos),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Hash(set) => set.len(),
            Self::Dense(set) => set.len(),
        }
    }

    fn remove_box(&mut self, bounds: &BoundingBox, strategy: RemovalStrategy) {
        match self {
            Self::Hash(set) => set.remove_box(bounds, strategy),
            Self::Dense(set) => set.remove_box(bounds, strategy),
        }
    }
}

/// Smallest box enclosing every cell, or `None` for no cells.
pub fn bounding_box(cells: &[LocalPos]) -> Option<BoundingBox> {
    let first = *cells.first()?;
    let (mut lo, mut hi) = (first.to_array(), first.to_array());
    for pos in &cells[1..] {
        let p = pos.to_array();
        for axis in 0..3 {
            lo[axis] = lo[axis].min(p[axis]);
            hi[axis] = hi[axis].max(p[axis]);
        }
    }
    Some(BoundingBox::new(LocalPos::from_array(lo), LocalPos::from_array(hi)))
}
