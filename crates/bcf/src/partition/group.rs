//! Per-partition accumulation of cells by descriptor.

use crate::model::{DescriptorId, LocalPos};

/// Cells of one partition that share a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellGroup {
    /// Descriptor shared by every cell.
    pub descriptor_id: DescriptorId,
    /// Local coordinates, in insertion order. May contain duplicates.
    pub cells: Vec<LocalPos>,
}

impl CellGroup {
    /// Creates an empty group.
    pub fn new(descriptor_id: DescriptorId) -> Self {
        Self {
            descriptor_id,
            cells: Vec::new(),
        }
    }

    /// Number of buffered cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the group holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Appends `pos` to the group for `descriptor_id`, creating it if absent.
///
/// Linear scan: a partition rarely holds more than a few dozen descriptors.
pub fn add_cell_to_group(groups: &mut Vec<CellGroup>, descriptor_id: DescriptorId, pos: LocalPos) {
    match groups.iter_mut().find(|g| g.descriptor_id == descriptor_id) {
        Some(group) => group.cells.push(pos),
        None => groups.push(CellGroup {
            descriptor_id,
            cells: vec![pos],
        }),
    }
}

/// Concatenates groups with equal descriptor ids.
///
/// The result is sorted by descriptor id; cell order within a group follows
/// input order.
pub fn merge_groups<I>(groups: I) -> Vec<CellGroup>
where
    I: IntoIterator<Item = CellGroup>,
{
    let mut merged: Vec<CellGroup> = Vec::new();
    for group in groups {
        match merged
            .iter_mut()
            .find(|g| g.descriptor_id == group.descriptor_id)
        {
            Some(existing) => existing.cells.extend(group.cells),
            None => merged.push(group),
        }
    }
    merged.sort_by_key(|g| g.descriptor_id);
    merged
}
