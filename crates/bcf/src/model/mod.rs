//! Core data model for BCF containers.
//!
//! Cells are stored against interned *descriptors* (type name plus ordered
//! state pairs plus an optional opaque payload). Within a partition they are
//! addressed by [`LocalPos`] and packed into inclusive [`BoundingBox`]
//! regions.

pub mod aux;
pub mod dictionary;
pub mod palette;

pub use aux::{AuxBlob, AuxCodec, RawAuxCodec};
pub use dictionary::{Dictionaries, DictionaryId, NameDictionary};
pub use palette::{Descriptor, Palette};

/// Identifier of an interned type name (16-bit id space).
pub type TypeId = u16;

/// Identifier of an interned state name (8-bit id space).
pub type StateNameId = u8;

/// Identifier of an interned state value (8-bit id space).
pub type StateValueId = u8;

/// Identifier of an interned descriptor, sequential from zero.
pub type DescriptorId = u32;

/// Coordinate of a cell relative to its partition origin.
///
/// Ordering is lexicographic over `(x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LocalPos {
    /// Local X.
    pub x: i16,
    /// Local Y.
    pub y: i16,
    /// Local Z.
    pub z: i16,
}

impl LocalPos {
    /// Creates a new local position.
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinates as an `[x, y, z]` array.
    #[inline]
    pub const fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    /// Builds a position from an `[x, y, z]` array.
    #[inline]
    pub const fn from_array(a: [i16; 3]) -> Self {
        Self {
            x: a[0],
            y: a[1],
            z: a[2],
        }
    }
}

/// World-space origin of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin {
    /// World X of local x = 0.
    pub x: i16,
    /// World Y of local y = 0.
    pub y: i16,
    /// World Z of local z = 0.
    pub z: i16,
}

impl Origin {
    /// Creates a new origin.
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Translates a local position into world space.
    #[inline]
    pub fn to_world(self, pos: LocalPos) -> (i32, i32, i32) {
        (
            i32::from(self.x) + i32::from(pos.x),
            i32::from(self.y) + i32::from(pos.y),
            i32::from(self.z) + i32::from(pos.z),
        )
    }
}

/// Inclusive axis-aligned box in partition-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    /// Minimum corner (inclusive).
    pub min: LocalPos,
    /// Maximum corner (inclusive).
    pub max: LocalPos,
}

impl BoundingBox {
    /// Creates a box from two inclusive corners.
    pub const fn new(min: LocalPos, max: LocalPos) -> Self {
        Self { min, max }
    }

    /// Creates a box holding a single cell.
    pub const fn unit(pos: LocalPos) -> Self {
        Self { min: pos, max: pos }
    }

    /// Extent along each axis (always >= 1 for a well-formed box).
    pub fn extent(&self) -> [u64; 3] {
        let lo = self.min.to_array();
        let hi = self.max.to_array();
        let mut out = [0u64; 3];
        for axis in 0..3 {
            out[axis] = (i64::from(hi[axis]) - i64::from(lo[axis]) + 1).max(0) as u64;
        }
        out
    }

    /// Number of cells covered by the box.
    pub fn volume(&self) -> u64 {
        let [dx, dy, dz] = self.extent();
        dx * dy * dz
    }

    /// Returns true if `pos` lies inside the box.
    #[inline]
    pub fn contains(&self, pos: LocalPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Returns true if the two boxes share at least one cell.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Iterates every cell of the box in `(x, y, z)` lexicographic order.
    pub fn cells(&self) -> impl Iterator<Item = LocalPos> + '_ {
        let (min, max) = (self.min, self.max);
        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y).flat_map(move |y| (min.z..=max.z).map(move |z| LocalPos::new(x, y, z)))
        })
    }
}

/// A box of cells that all share one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Descriptor shared by every cell of the region.
    pub descriptor_id: DescriptorId,
    /// Covered cells.
    pub bounds: BoundingBox,
}

impl Region {
    /// Creates a new region.
    pub const fn new(descriptor_id: DescriptorId, bounds: BoundingBox) -> Self {
        Self {
            descriptor_id,
            bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_volume_and_contains() {
        let b = BoundingBox::new(LocalPos::new(0, 0, 0), LocalPos::new(9, 9, 9));
        assert_eq!(b.volume(), 1000);
        assert!(b.contains(LocalPos::new(5, 0, 9)));
        assert!(!b.contains(LocalPos::new(10, 0, 0)));
        assert_eq!(b.cells().count(), 1000);
    }

    #[test]
    fn test_box_intersects() {
        let a = BoundingBox::new(LocalPos::new(0, 0, 0), LocalPos::new(2, 2, 2));
        let b = BoundingBox::new(LocalPos::new(2, 2, 2), LocalPos::new(4, 4, 4));
        let c = BoundingBox::new(LocalPos::new(3, 0, 0), LocalPos::new(4, 1, 1));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_origin_to_world() {
        let origin = Origin::new(-144, -56, 288);
        assert_eq!(origin.to_world(LocalPos::new(1, 60, 143)), (-143, 4, 431));
    }

    #[test]
    fn test_local_pos_ordering() {
        let mut cells = vec![
            LocalPos::new(1, 0, 0),
            LocalPos::new(0, 1, 0),
            LocalPos::new(0, 0, 1),
        ];
        cells.sort();
        assert_eq!(cells[0], LocalPos::new(0, 0, 1));
        assert_eq!(cells[2], LocalPos::new(1, 0, 0));
    }
}
