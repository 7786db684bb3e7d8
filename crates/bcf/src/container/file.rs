//! BCF container file format.
//!
//! Every structure here is encoded little-endian with fixed-width fields and
//! offers a `write_to` / `read_from` pair.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (67 bytes)                                           │
//! │  - Magic: "BCF" (3 bytes)                                    │
//! │  - Version: u8 = 4                                           │
//! │  - Width, Length, Height: u16 each (advisory)                │
//! │  - Base partition size: u8                                   │
//! │  - Partition count: u64                                      │
//! │  - Offsets: index, descriptors, types, state names,          │
//! │    state values, reserved aux section (u64 each)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Partition records (repeated)                                │
//! │  - Record size u64, origin 3×i16, region count u32           │
//! │  - Regions: descriptor id u32 + box 6×i16                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Index table: count u64 + offsets u64                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Descriptor table: count u32 + entries                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Type / state-name / state-value dictionaries                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Older layouts still readable: version 2 records carry only the origin Y
//! and have no state-value dictionary, version 3 adds both, version 4 adds
//! per-descriptor aux payloads.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::{BcfError, Result};
use crate::model::{
    AuxBlob, BoundingBox, Descriptor, DescriptorId, DictionaryId, LocalPos, Origin, Region,
};

/// Magic bytes at the start of every container: "BCF".
pub const BCF_MAGIC: [u8; 3] = *b"BCF";

/// Version written by this crate.
pub const BCF_VERSION: u8 = 4;

/// Oldest version the streaming reader accepts.
pub const MIN_STREAMING_VERSION: u8 = 2;

/// First version with a 3-axis origin and a state-value dictionary.
pub const VERSION_FULL_ORIGIN: u8 = 3;

/// First version with inline aux payloads in the descriptor table.
pub const VERSION_AUX: u8 = 4;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 67;

/// Encoded size of one region entry.
pub const REGION_ENTRY_SIZE: u64 = 4 + 6 * 2;

/// Longest name a dictionary can store.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_i16<R: Read>(reader: &mut R) -> Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_local<W: Write>(writer: &mut W, pos: LocalPos) -> Result<()> {
    writer.write_all(&pos.x.to_le_bytes())?;
    writer.write_all(&pos.y.to_le_bytes())?;
    writer.write_all(&pos.z.to_le_bytes())?;
    Ok(())
}

fn read_local<R: Read>(reader: &mut R) -> Result<LocalPos> {
    Ok(LocalPos::new(
        read_i16(reader)?,
        read_i16(reader)?,
        read_i16(reader)?,
    ))
}

/// Writes a u16-length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns [`BcfError::NameTooLong`] if `name` exceeds 65535 bytes.
pub fn write_name<W: Write>(writer: &mut W, name: &str) -> Result<()> {
    let len = u16::try_from(name.len()).map_err(|_| BcfError::NameTooLong { len: name.len() })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(name.as_bytes())?;
    Ok(())
}

/// Reads a u16-length-prefixed UTF-8 string.
pub fn read_name<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u16(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| BcfError::Corrupted(format!("Invalid UTF-8 in dictionary name: {}", e)))
}

/// Container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Format version.
    pub version: u8,
    /// Advisory X extent of the stored partitions, in cells.
    pub width: u16,
    /// Advisory Z extent of the stored partitions, in cells.
    pub length: u16,
    /// World height in cells.
    pub height: u16,
    /// Partition side length.
    pub base_size: u8,
    /// Number of partition records.
    pub partition_count: u64,
    /// Offset of the index table.
    pub index_offset: u64,
    /// Offset of the descriptor table.
    pub descriptor_offset: u64,
    /// Offset of the type dictionary.
    pub type_dict_offset: u64,
    /// Offset of the state-name dictionary.
    pub state_name_dict_offset: u64,
    /// Offset of the state-value dictionary (0 before version 3).
    pub state_value_dict_offset: u64,
    /// Reserved auxiliary section offset; always 0.
    pub aux_offset: u64,
}

impl Default for ContainerHeader {
    fn default() -> Self {
        Self {
            version: BCF_VERSION,
            width: 0,
            length: 0,
            height: 0,
            base_size: 0,
            partition_count: 0,
            index_offset: 0,
            descriptor_offset: 0,
            type_dict_offset: 0,
            state_name_dict_offset: 0,
            state_value_dict_offset: 0,
            aux_offset: 0,
        }
    }
}

impl ContainerHeader {
    /// Writes the header using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&BCF_MAGIC)?;
        writer.write_all(&[self.version])?;
        writer.write_all(&self.width.to_le_bytes())?;
        writer.write_all(&self.length.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        writer.write_all(&[self.base_size])?;
        writer.write_all(&self.partition_count.to_le_bytes())?;
        writer.write_all(&self.index_offset.to_le_bytes())?;
        writer.write_all(&self.descriptor_offset.to_le_bytes())?;
        writer.write_all(&self.type_dict_offset.to_le_bytes())?;
        writer.write_all(&self.state_name_dict_offset.to_le_bytes())?;
        writer.write_all(&self.state_value_dict_offset.to_le_bytes())?;
        writer.write_all(&self.aux_offset.to_le_bytes())?;
        Ok(())
    }

    /// Reads a header using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns `BcfError::InvalidMagic` if the magic bytes don't match.
    /// Returns `BcfError::UnsupportedVersion` for versions newer than
    /// [`BCF_VERSION`] and `BcfError::StreamingUnsupported` for versions
    /// older than [`MIN_STREAMING_VERSION`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if magic != BCF_MAGIC {
            return Err(BcfError::InvalidMagic(magic));
        }

        let version = read_u8(reader)?;
        if version > BCF_VERSION {
            return Err(BcfError::UnsupportedVersion(version));
        }
        if version < MIN_STREAMING_VERSION {
            return Err(BcfError::StreamingUnsupported(version));
        }

        Ok(Self {
            version,
            width: read_u16(reader)?,
            length: read_u16(reader)?,
            height: read_u16(reader)?,
            base_size: read_u8(reader)?,
            partition_count: read_u64(reader)?,
            index_offset: read_u64(reader)?,
            descriptor_offset: read_u64(reader)?,
            type_dict_offset: read_u64(reader)?,
            state_name_dict_offset: read_u64(reader)?,
            state_value_dict_offset: read_u64(reader)?,
            aux_offset: read_u64(reader)?,
        })
    }
}

/// One partition's regions plus its world origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionRecord {
    /// World origin of local (0, 0, 0).
    pub origin: Origin,
    /// Regions in stored order.
    pub regions: Vec<Region>,
}

impl PartitionRecord {
    /// Encoded size of a record with `region_count` regions, size field
    /// included.
    pub fn encoded_size(version: u8, region_count: usize) -> u64 {
        let origin = if version >= VERSION_FULL_ORIGIN { 6 } else { 2 };
        8 + origin + 4 + region_count as u64 * REGION_ENTRY_SIZE
    }

    /// Writes the record in the current layout and returns its size.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::Corrupted`] if there are more than `u32::MAX`
    /// regions, or an I/O error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let count = u32::try_from(self.regions.len())
            .map_err(|_| BcfError::Corrupted("Too many regions in partition".to_string()))?;
        let size = Self::encoded_size(BCF_VERSION, self.regions.len());
        writer.write_all(&size.to_le_bytes())?;
        writer.write_all(&self.origin.x.to_le_bytes())?;
        writer.write_all(&self.origin.y.to_le_bytes())?;
        writer.write_all(&self.origin.z.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;
        for region in &self.regions {
            writer.write_all(&region.descriptor_id.to_le_bytes())?;
            write_local(writer, region.bounds.min)?;
            write_local(writer, region.bounds.max)?;
        }
        Ok(size)
    }

    /// Reads the record header: size and origin.
    ///
    /// Version 2 records carry only the origin Y; X and Z read as zero.
    pub fn read_head<R: Read>(reader: &mut R, version: u8) -> Result<(u64, Origin)> {
        let size = read_u64(reader)?;
        let origin = if version >= VERSION_FULL_ORIGIN {
            Origin::new(read_i16(reader)?, read_i16(reader)?, read_i16(reader)?)
        } else {
            Origin::new(0, read_i16(reader)?, 0)
        };
        Ok((size, origin))
    }

    /// Reads a full record.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::Corrupted`] if the stored size disagrees with the
    /// region count or a box has its corners swapped.
    pub fn read_from<R: Read>(reader: &mut R, version: u8) -> Result<Self> {
        let (size, origin) = Self::read_head(reader, version)?;
        let count = read_u32(reader)? as usize;
        let expected = Self::encoded_size(version, count);
        if size != expected {
            return Err(BcfError::Corrupted(format!(
                "Partition record size {} does not match {} regions ({} bytes)",
                size, count, expected
            )));
        }
        let mut regions = Vec::with_capacity(count);
        for _ in 0..count {
            let descriptor_id = read_u32(reader)?;
            let min = read_local(reader)?;
            let max = read_local(reader)?;
            if min.x > max.x || min.y > max.y || min.z > max.z {
                return Err(BcfError::Corrupted(format!(
                    "Inverted region box {:?}..{:?}",
                    min, max
                )));
            }
            regions.push(Region::new(descriptor_id, BoundingBox::new(min, max)));
        }
        Ok(Self { origin, regions })
    }
}

/// Offsets of every partition record, in write order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexTable {
    /// Record offsets.
    pub offsets: Vec<u64>,
}

impl IndexTable {
    /// Writes the table.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&(self.offsets.len() as u64).to_le_bytes())?;
        for offset in &self.offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        Ok(())
    }

    /// Reads the table.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_u64(reader)?;
        let mut offsets = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            offsets.push(read_u64(reader)?);
        }
        Ok(Self { offsets })
    }
}

/// Every interned descriptor, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorTable {
    /// `(id, descriptor)` pairs in stored order.
    pub entries: Vec<(DescriptorId, Descriptor)>,
}

impl DescriptorTable {
    /// Writes the table in the current layout.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        Self::write_entries(
            writer,
            self.entries.len(),
            self.entries.iter().map(|(id, d)| (*id, d)),
        )
    }

    /// Writes `count` entries from an iterator, e.g. straight from a palette.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::Corrupted`] if a descriptor has more than
    /// `u16::MAX` states or a payload larger than `u32::MAX` bytes.
    pub fn write_entries<'a, W, I>(writer: &mut W, count: usize, entries: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = (DescriptorId, &'a Descriptor)>,
    {
        let count = u32::try_from(count)
            .map_err(|_| BcfError::Corrupted("Too many descriptors".to_string()))?;
        writer.write_all(&count.to_le_bytes())?;
        for (id, descriptor) in entries {
            let pairs = u16::try_from(descriptor.states.len()).map_err(|_| {
                BcfError::Corrupted(format!("Descriptor {} has too many states", id))
            })?;
            writer.write_all(&id.to_le_bytes())?;
            writer.write_all(&descriptor.type_id.to_le_bytes())?;
            writer.write_all(&pairs.to_le_bytes())?;
            for &(name, value) in &descriptor.states {
                writer.write_all(&[name, value])?;
            }
            let aux = descriptor.aux.as_ref().map(AuxBlob::as_bytes).unwrap_or_default();
            let len = u32::try_from(aux.len()).map_err(|_| {
                BcfError::Corrupted(format!("Descriptor {} payload too large", id))
            })?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(aux)?;
        }
        Ok(())
    }

    /// Reads the table; payloads are only present from version 4.
    pub fn read_from<R: Read>(reader: &mut R, version: u8) -> Result<Self> {
        let count = read_u32(reader)?;
        let mut entries = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            let id = read_u32(reader)?;
            let type_id = read_u16(reader)?;
            let pairs = read_u16(reader)?;
            let mut states = Vec::with_capacity(pairs as usize);
            for _ in 0..pairs {
                states.push((read_u8(reader)?, read_u8(reader)?));
            }
            let aux = if version >= VERSION_AUX {
                let len = read_u32(reader)? as usize;
                let mut bytes = vec![0u8; len];
                reader.read_exact(&mut bytes)?;
                AuxBlob::new(bytes)
            } else {
                None
            };
            entries.push((id, Descriptor::new(type_id, states, aux)));
        }
        Ok(Self { entries })
    }
}

/// A stored dictionary: explicit ids mapped to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable<I: DictionaryId> {
    names: BTreeMap<I, String>,
}

impl<I: DictionaryId> Default for NameTable<I> {
    fn default() -> Self {
        Self {
            names: BTreeMap::new(),
        }
    }
}

impl<I: DictionaryId> NameTable<I> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, id: I, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    /// Looks up a name.
    pub fn get(&self, id: I) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Writes the table.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        Self::write_entries(
            writer,
            self.names.len(),
            self.names.iter().map(|(id, name)| (*id, name.as_str())),
        )
    }

    /// Writes `count` entries from an iterator, e.g. straight from a
    /// [`crate::model::NameDictionary`].
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::NameTooLong`] if any name exceeds 65535 bytes.
    pub fn write_entries<'a, W, It>(writer: &mut W, count: usize, entries: It) -> Result<()>
    where
        W: Write,
        It: IntoIterator<Item = (I, &'a str)>,
    {
        let count = u32::try_from(count)
            .map_err(|_| BcfError::Corrupted("Too many dictionary entries".to_string()))?;
        writer.write_all(&count.to_le_bytes())?;
        for (id, name) in entries {
            let bytes = (id.index() as u32).to_le_bytes();
            writer.write_all(&bytes[..I::BYTES])?;
            write_name(writer, name)?;
        }
        Ok(())
    }

    /// Reads a table.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_u32(reader)?;
        let mut names = BTreeMap::new();
        for _ in 0..count {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes[..I::BYTES])?;
            let index = u32::from_le_bytes(bytes) as usize;
            names.insert(I::from_index(index), read_name(reader)?);
        }
        Ok(Self { names })
    }
}
