//! World-anchored spatial partitioning.
//!
//! The XZ plane is tiled into square columns of `side` cells spanning the full
//! world height. Column `(gx, gz)` gets the index
//! `(gz + GRID_BIAS) * GRID_STRIDE + (gx + GRID_BIAS)`, so the index depends
//! only on position, never on insertion order.
//!
//! ```text
//!   grid_x = floor(x / side)        local_x = x mod side
//!   grid_z = floor(z / side)        local_z = z mod side
//!                                   local_y = y - min_y
//!   origin = (grid_x * side, min_y, grid_z * side)
//! ```

pub mod group;

pub use group::{add_cell_to_group, merge_groups, CellGroup};

use crate::error::{BcfError, Result};
use crate::model::{LocalPos, Origin};

/// Offset added to grid coordinates before flattening.
pub const GRID_BIAS: i32 = 227;

/// Number of grid columns per grid row.
pub const GRID_STRIDE: i32 = 454;

/// Default partition side length in cells.
pub const DEFAULT_PARTITION_SIDE: u8 = 144;

/// Default world floor.
pub const DEFAULT_MIN_Y: i32 = -56;

/// Default world height in cells.
pub const DEFAULT_WORLD_HEIGHT: u16 = 376;

/// Flat partition index.
pub type PartitionIndex = u64;

/// Where a world cell lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLocation {
    /// Partition holding the cell.
    pub partition: PartitionIndex,
    /// Cell position relative to the partition origin.
    pub local: LocalPos,
}

/// Maps world coordinates onto the fixed partition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionGrid {
    side: i32,
    min_y: i32,
}

impl Default for PartitionGrid {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_SIDE, DEFAULT_MIN_Y)
    }
}

impl PartitionGrid {
    /// Creates a grid with the given column side and world floor.
    ///
    /// A side of zero is treated as one.
    pub fn new(side: u8, min_y: i32) -> Self {
        Self {
            side: i32::from(side.max(1)),
            min_y,
        }
    }

    /// Column side length in cells.
    pub fn side(&self) -> u8 {
        self.side as u8
    }

    /// World floor.
    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    /// Returns the partition index for world `(x, z)`.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CoordinateOutOfRange`] if the grid column lies
    /// outside `[-GRID_BIAS, GRID_STRIDE - GRID_BIAS)` on either axis.
    pub fn partition_of(&self, x: i32, z: i32) -> Result<PartitionIndex> {
        let gx = x.div_euclid(self.side);
        let gz = z.div_euclid(self.side);
        let out_of_range = || BcfError::CoordinateOutOfRange {
            x,
            y: self.min_y,
            z,
        };
        let bx = gx.checked_add(GRID_BIAS).ok_or_else(out_of_range)?;
        let bz = gz.checked_add(GRID_BIAS).ok_or_else(out_of_range)?;
        if !(0..GRID_STRIDE).contains(&bx) || !(0..GRID_STRIDE).contains(&bz) {
            return Err(out_of_range());
        }
        Ok(bz as u64 * GRID_STRIDE as u64 + bx as u64)
    }

    /// Locates a world cell: partition index plus local coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CoordinateOutOfRange`] if the column is off-grid,
    /// the partition origin does not fit the 16-bit record field, or the
    /// local height does not fit 16 bits.
    pub fn locate(&self, x: i32, y: i32, z: i32) -> Result<CellLocation> {
        let out_of_range = || BcfError::CoordinateOutOfRange { x, y, z };
        let partition = self.partition_of(x, z).map_err(|_| out_of_range())?;
        self.origin_of(partition).map_err(|_| out_of_range())?;
        let local_y = i64::from(y) - i64::from(self.min_y);
        let local_y = i16::try_from(local_y).map_err(|_| out_of_range())?;
        Ok(CellLocation {
            partition,
            local: LocalPos::new(
                x.rem_euclid(self.side) as i16,
                local_y,
                z.rem_euclid(self.side) as i16,
            ),
        })
    }

    /// World-space origin of a partition.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CoordinateOutOfRange`] if the index is past the
    /// grid or the origin does not fit the 16-bit record field.
    pub fn origin_of(&self, partition: PartitionIndex) -> Result<Origin> {
        let stride = GRID_STRIDE as u64;
        if partition >= stride * stride {
            return Err(BcfError::CoordinateOutOfRange {
                x: i32::MAX,
                y: self.min_y,
                z: i32::MAX,
            });
        }
        let gx = (partition % stride) as i32 - GRID_BIAS;
        let gz = (partition / stride) as i32 - GRID_BIAS;
        let (wx, wz) = (gx * self.side, gz * self.side);
        let fit = |v: i32| {
            i16::try_from(v).map_err(|_| BcfError::CoordinateOutOfRange {
                x: wx,
                y: self.min_y,
                z: wz,
            })
        };
        Ok(Origin::new(fit(wx)?, fit(self.min_y)?, fit(wz)?))
    }
}
