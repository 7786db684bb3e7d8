//! Descriptor interning.

use std::collections::HashMap;

use crate::error::{BcfError, Result};
use crate::model::{AuxBlob, DescriptorId, StateNameId, StateValueId, TypeId};

/// A palette entry: type plus ordered state pairs plus optional payload.
///
/// Equality and hashing are structural over all three fields, so state order
/// matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// Interned type name.
    pub type_id: TypeId,
    /// Ordered `(state name, state value)` pairs.
    pub states: Vec<(StateNameId, StateValueId)>,
    /// Opaque payload, if any.
    pub aux: Option<AuxBlob>,
}

impl Descriptor {
    /// Creates a descriptor.
    pub fn new(
        type_id: TypeId,
        states: Vec<(StateNameId, StateValueId)>,
        aux: Option<AuxBlob>,
    ) -> Self {
        Self {
            type_id,
            states,
            aux,
        }
    }
}

/// Interning table for descriptors, ids sequential from zero.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    ids: HashMap<Descriptor, DescriptorId>,
    entries: Vec<Descriptor>,
}

impl Palette {
    /// Creates an empty palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `descriptor`, allocating one on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] if the 32-bit id space is
    /// exhausted.
    pub fn intern(&mut self, descriptor: Descriptor) -> Result<DescriptorId> {
        if let Some(&id) = self.ids.get(&descriptor) {
            return Ok(id);
        }
        let id = DescriptorId::try_from(self.entries.len()).map_err(|_| {
            BcfError::CapacityExceeded {
                table: "descriptor",
                limit: DescriptorId::MAX as usize,
            }
        })?;
        self.ids.insert(descriptor.clone(), id);
        self.entries.push(descriptor);
        Ok(id)
    }

    /// Returns the descriptor for `id`.
    pub fn get(&self, id: DescriptorId) -> Option<&Descriptor> {
        self.entries.get(id as usize)
    }

    /// Number of interned descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the palette is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = (DescriptorId, &Descriptor)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| (i as DescriptorId, d))
    }
}
