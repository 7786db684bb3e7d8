//! Streaming container reader.
//!
//! Opening a container eagerly loads the header, index table, descriptor
//! table and dictionaries. Partition records are decoded one at a time on
//! demand through a single cached file handle, so partition reads take
//! `&mut self`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container::file::{
    read_u32, ContainerHeader, DescriptorTable, IndexTable, NameTable, PartitionRecord,
    VERSION_AUX, VERSION_FULL_ORIGIN,
};
use crate::error::{BcfError, Result};
use crate::model::{
    AuxBlob, AuxCodec, Descriptor, DescriptorId, Origin, Region, StateNameId, StateValueId,
    TypeId,
};

/// Name returned for type ids missing from the type dictionary.
pub const UNKNOWN_TYPE_NAME: &str = "unknown";

/// A descriptor with every id replaced by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDescriptor<'a> {
    /// Type name.
    pub type_name: &'a str,
    /// Ordered `(state name, state value)` pairs.
    pub states: Vec<(&'a str, Cow<'a, str>)>,
    /// Opaque payload, if any.
    pub aux: Option<&'a AuxBlob>,
}

/// A single cell in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldCell {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
    /// Descriptor of the cell.
    pub descriptor_id: DescriptorId,
}

/// Totals gathered by [`StreamReader::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerStats {
    /// Partition records read.
    pub partitions: u64,
    /// Regions across all partitions.
    pub regions: u64,
    /// Cells covered by all regions.
    pub cells: u64,
}

/// Reads partitions of a BCF container lazily.
#[derive(Debug)]
pub struct StreamReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: ContainerHeader,
    index: IndexTable,
    descriptors: HashMap<DescriptorId, Descriptor>,
    types: NameTable<TypeId>,
    state_names: NameTable<StateNameId>,
    state_values: NameTable<StateValueId>,
}

impl StreamReader {
    /// Opens a container for streaming reads.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the container file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened
    /// - The magic bytes are invalid
    /// - The version is newer than supported or older than version 2
    /// - The index table disagrees with the header's partition count
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = ContainerHeader::read_from(&mut reader)?;

        reader.seek(SeekFrom::Start(header.index_offset))?;
        let index = IndexTable::read_from(&mut reader)?;
        if index.offsets.len() as u64 != header.partition_count {
            return Err(BcfError::Corrupted(format!(
                "Header lists {} partitions but index holds {}",
                header.partition_count,
                index.offsets.len()
            )));
        }

        reader.seek(SeekFrom::Start(header.descriptor_offset))?;
        let descriptors = DescriptorTable::read_from(&mut reader, header.version)?
            .entries
            .into_iter()
            .collect();

        reader.seek(SeekFrom::Start(header.type_dict_offset))?;
        let types = NameTable::read_from(&mut reader)?;

        reader.seek(SeekFrom::Start(header.state_name_dict_offset))?;
        let state_names = NameTable::read_from(&mut reader)?;

        let state_values = if header.version >= VERSION_FULL_ORIGIN {
            reader.seek(SeekFrom::Start(header.state_value_dict_offset))?;
            NameTable::read_from(&mut reader)?
        } else {
            NameTable::new()
        };

        debug!(
            "Opened BCF v{} container {} ({} partitions)",
            header.version,
            path.display(),
            header.partition_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            index,
            descriptors,
            types,
            state_names,
            state_values,
        })
    }

    /// Path of the open container.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The container header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Number of partition records.
    pub fn partition_count(&self) -> u64 {
        self.index.offsets.len() as u64
    }

    /// Number of descriptors in the descriptor table.
    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    fn seek_partition(&mut self, partition: u64) -> Result<()> {
        let offset = usize::try_from(partition)
            .ok()
            .and_then(|i| self.index.offsets.get(i).copied())
            .ok_or(BcfError::PartitionNotFound(partition))?;
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Decodes one partition record.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::PartitionNotFound`] if `partition` is not below
    /// [`StreamReader::partition_count`].
    pub fn partition(&mut self, partition: u64) -> Result<PartitionRecord> {
        self.seek_partition(partition)?;
        PartitionRecord::read_from(&mut self.reader, self.header.version)
    }

    /// Regions of one partition, in stored order.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::partition`].
    pub fn regions(&mut self, partition: u64) -> Result<Vec<Region>> {
        Ok(self.partition(partition)?.regions)
    }

    /// Origin of one partition, without decoding its regions.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::partition`].
    pub fn origin(&mut self, partition: u64) -> Result<Origin> {
        self.seek_partition(partition)?;
        let (_, origin) = PartitionRecord::read_head(&mut self.reader, self.header.version)?;
        Ok(origin)
    }

    /// Number of regions in one partition, without decoding them.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::partition`].
    pub fn region_count(&mut self, partition: u64) -> Result<u32> {
        self.seek_partition(partition)?;
        PartitionRecord::read_head(&mut self.reader, self.header.version)?;
        read_u32(&mut self.reader)
    }

    /// Expands one partition's regions into world-space cells.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::partition`].
    pub fn cells(&mut self, partition: u64) -> Result<Vec<WorldCell>> {
        let record = self.partition(partition)?;
        let total: u64 = record.regions.iter().map(|r| r.bounds.volume()).sum();
        let mut cells = Vec::with_capacity(total.min(1 << 24) as usize);
        for region in &record.regions {
            for pos in region.bounds.cells() {
                let (x, y, z) = record.origin.to_world(pos);
                cells.push(WorldCell {
                    x,
                    y,
                    z,
                    descriptor_id: region.descriptor_id,
                });
            }
        }
        Ok(cells)
    }

    /// Looks up a descriptor.
    pub fn descriptor(&self, id: DescriptorId) -> Option<&Descriptor> {
        self.descriptors.get(&id)
    }

    /// Iterates descriptors in id order.
    pub fn descriptors(&self) -> impl Iterator<Item = (DescriptorId, &Descriptor)> + '_ {
        let mut ids: Vec<_> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(move |id| self.descriptors.get(&id).map(|d| (id, d)))
    }

    /// Type name for `id`, or [`UNKNOWN_TYPE_NAME`].
    pub fn type_name(&self, id: TypeId) -> &str {
        self.types.get(id).unwrap_or(UNKNOWN_TYPE_NAME)
    }

    /// State name for `id`, or the empty string.
    pub fn state_name(&self, id: StateNameId) -> &str {
        self.state_names.get(id).unwrap_or("")
    }

    /// State value for `id`, or the empty string.
    ///
    /// Containers older than version 3 have no value dictionary; their
    /// value ids are rendered as decimal numbers.
    pub fn state_value(&self, id: StateValueId) -> Cow<'_, str> {
        if self.header.version < VERSION_FULL_ORIGIN {
            return Cow::Owned(id.to_string());
        }
        Cow::Borrowed(self.state_values.get(id).unwrap_or(""))
    }

    /// Resolves every id of a descriptor into names.
    pub fn resolve(&self, id: DescriptorId) -> Option<ResolvedDescriptor<'_>> {
        let descriptor = self.descriptors.get(&id)?;
        Some(ResolvedDescriptor {
            type_name: self.type_name(descriptor.type_id),
            states: descriptor
                .states
                .iter()
                .map(|&(name, value)| (self.state_name(name), self.state_value(value)))
                .collect(),
            aux: descriptor.aux.as_ref(),
        })
    }

    /// Decodes a descriptor's payload through `codec`.
    ///
    /// Returns `Ok(None)` if the descriptor is unknown or has no payload.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn decode_aux<C: AuxCodec>(&self, id: DescriptorId, codec: &C) -> Result<Option<C::Payload>> {
        match self.descriptors.get(&id).and_then(|d| d.aux.as_ref()) {
            Some(blob) => codec.decode(blob.as_bytes()).map(Some),
            None => Ok(None),
        }
    }

    /// Reads every partition and checks cross-references.
    ///
    /// Every region must reference a stored descriptor, every descriptor's
    /// ids must exist in their dictionaries, and every record size must
    /// match its region count.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::Corrupted`] describing the first violation.
    pub fn verify(&mut self) -> Result<ContainerStats> {
        for (id, descriptor) in &self.descriptors {
            if self.types.get(descriptor.type_id).is_none() {
                return Err(BcfError::Corrupted(format!(
                    "Descriptor {} references missing type {}",
                    id, descriptor.type_id
                )));
            }
            for &(name, value) in &descriptor.states {
                if self.state_names.get(name).is_none() {
                    return Err(BcfError::Corrupted(format!(
                        "Descriptor {} references missing state name {}",
                        id, name
                    )));
                }
                if self.header.version >= VERSION_FULL_ORIGIN && self.state_values.get(value).is_none() {
                    return Err(BcfError::Corrupted(format!(
                        "Descriptor {} references missing state value {}",
                        id, value
                    )));
                }
            }
            if self.header.version < VERSION_AUX && descriptor.aux.is_some() {
                return Err(BcfError::Corrupted(format!(
                    "Descriptor {} carries a payload in a v{} container",
                    id, self.header.version
                )));
            }
        }

        let mut stats = ContainerStats::default();
        for partition in 0..self.partition_count() {
            let record = self.partition(partition)?;
            for region in &record.regions {
                if !self.descriptors.contains_key(&region.descriptor_id) {
                    return Err(BcfError::Corrupted(format!(
                        "Partition {} references missing descriptor {}",
                        partition, region.descriptor_id
                    )));
                }
                stats.cells += region.bounds.volume();
            }
            stats.regions += record.regions.len() as u64;
            stats.partitions += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::file::{BCF_VERSION, HEADER_SIZE};
    use crate::model::{BoundingBox, LocalPos, RawAuxCodec};
    use std::io::Write;
    use tempfile::TempDir;

    /// Lays out a container by hand in the given version.
    fn write_container(
        path: &Path,
        version: u8,
        records: &[PartitionRecord],
        descriptors: &DescriptorTable,
    ) {
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for record in records {
            offsets.push((HEADER_SIZE + body.len()) as u64);
            record.write_to(&mut body).unwrap();
        }
        let mut header = ContainerHeader {
            version,
            base_size: 144,
            height: 376,
            partition_count: records.len() as u64,
            ..Default::default()
        };
        header.index_offset = (HEADER_SIZE + body.len()) as u64;
        IndexTable { offsets }.write_to(&mut body).unwrap();
        header.descriptor_offset = (HEADER_SIZE + body.len()) as u64;
        descriptors.write_to(&mut body).unwrap();
        header.type_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut types: NameTable<TypeId> = NameTable::new();
        types.insert(0, "stone");
        types.write_to(&mut body).unwrap();
        header.state_name_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut names: NameTable<StateNameId> = NameTable::new();
        names.insert(0, "facing");
        names.write_to(&mut body).unwrap();
        header.state_value_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut values: NameTable<StateValueId> = NameTable::new();
        values.insert(0, "north");
        values.write_to(&mut body).unwrap();

        let mut file = File::create(path).unwrap();
        header.write_to(&mut file).unwrap();
        file.write_all(&body).unwrap();
    }

    fn one_record() -> PartitionRecord {
        PartitionRecord {
            origin: Origin::new(144, -56, 0),
            regions: vec![Region::new(
                0,
                BoundingBox::new(LocalPos::new(0, 0, 0), LocalPos::new(1, 0, 1)),
            )],
        }
    }

    fn one_descriptor(aux: Option<AuxBlob>) -> DescriptorTable {
        DescriptorTable {
            entries: vec![(0, Descriptor::new(0, vec![(0, 0)], aux))],
        }
    }

    #[test]
    fn test_open_and_read_partition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        write_container(&path, BCF_VERSION, &[one_record()], &one_descriptor(None));

        let mut reader = StreamReader::open(&path).unwrap();
        assert_eq!(reader.partition_count(), 1);
        assert_eq!(reader.origin(0).unwrap(), Origin::new(144, -56, 0));
        assert_eq!(reader.region_count(0).unwrap(), 1);
        assert_eq!(reader.regions(0).unwrap(), one_record().regions);

        let mut cells = reader.cells(0).unwrap();
        cells.sort();
        assert_eq!(cells.len(), 4);
        assert_eq!(
            cells[0],
            WorldCell {
                x: 144,
                y: -56,
                z: 0,
                descriptor_id: 0
            }
        );

        let resolved = reader.resolve(0).unwrap();
        assert_eq!(resolved.type_name, "stone");
        assert_eq!(resolved.states, vec![("facing", Cow::Borrowed("north"))]);
        assert!(resolved.aux.is_none());

        let stats = reader.verify().unwrap();
        assert_eq!(stats.cells, 4);
    }

    #[test]
    fn test_partition_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        write_container(&path, BCF_VERSION, &[one_record()], &one_descriptor(None));
        let mut reader = StreamReader::open(&path).unwrap();
        assert!(matches!(reader.regions(1), Err(BcfError::PartitionNotFound(1))));
        assert!(matches!(reader.origin(u64::MAX), Err(BcfError::PartitionNotFound(_))));
    }

    #[test]
    fn test_unknown_ids_resolve_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        write_container(&path, BCF_VERSION, &[], &one_descriptor(None));
        let reader = StreamReader::open(&path).unwrap();
        assert_eq!(reader.type_name(42), UNKNOWN_TYPE_NAME);
        assert_eq!(reader.state_name(9), "");
        assert_eq!(reader.state_value(9), "");
        assert!(reader.resolve(5).is_none());
        assert!(reader.descriptor(5).is_none());
    }

    #[test]
    fn test_decode_aux() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        write_container(&path, BCF_VERSION, &[], &one_descriptor(AuxBlob::new(vec![1, 2])));
        let reader = StreamReader::open(&path).unwrap();
        assert_eq!(reader.decode_aux(0, &RawAuxCodec).unwrap(), Some(vec![1, 2]));
        assert_eq!(reader.decode_aux(1, &RawAuxCodec).unwrap(), None);
    }

    #[test]
    fn test_verify_catches_dangling_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        let mut record = one_record();
        record.regions[0].descriptor_id = 7;
        write_container(&path, BCF_VERSION, &[record], &one_descriptor(None));
        let mut reader = StreamReader::open(&path).unwrap();
        assert!(matches!(reader.verify(), Err(BcfError::Corrupted(_))));
    }

    #[test]
    fn test_index_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bcf");
        write_container(&path, BCF_VERSION, &[one_record()], &one_descriptor(None));
        // Bump partition_count in the header (offset 3 + 1 + 6 + 1 = 11).
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[11] = 2;
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(StreamReader::open(&path), Err(BcfError::Corrupted(_))));
    }

    #[test]
    fn test_version_one_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.bcf");
        write_container(&path, 1, &[], &one_descriptor(None));
        assert!(matches!(
            StreamReader::open(&path),
            Err(BcfError::StreamingUnsupported(1))
        ));
    }

    #[test]
    fn test_v2_values_render_as_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v2.bcf");

        // v2 records: size, originY, count, regions.
        let mut body = Vec::new();
        body.extend_from_slice(&PartitionRecord::encoded_size(2, 1).to_le_bytes());
        body.extend_from_slice(&(-56i16).to_le_bytes());
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        for v in [0i16, 0, 0, 0, 0, 0] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        let mut header = ContainerHeader {
            version: 2,
            partition_count: 1,
            ..Default::default()
        };
        header.index_offset = (HEADER_SIZE + body.len()) as u64;
        IndexTable {
            offsets: vec![HEADER_SIZE as u64],
        }
        .write_to(&mut body)
        .unwrap();
        header.descriptor_offset = (HEADER_SIZE + body.len()) as u64;
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&[0, 3]);
        header.type_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut types: NameTable<TypeId> = NameTable::new();
        types.insert(0, "lever");
        types.write_to(&mut body).unwrap();
        header.state_name_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut names: NameTable<StateNameId> = NameTable::new();
        names.insert(0, "powered");
        names.write_to(&mut body).unwrap();

        let mut file = File::create(&path).unwrap();
        header.write_to(&mut file).unwrap();
        file.write_all(&body).unwrap();
        drop(file);

        let mut reader = StreamReader::open(&path).unwrap();
        assert_eq!(reader.origin(0).unwrap(), Origin::new(0, -56, 0));
        let resolved = reader.resolve(0).unwrap();
        assert_eq!(resolved.type_name, "lever");
        assert_eq!(resolved.states.len(), 1);
        assert_eq!(resolved.states[0].0, "powered");
        assert_eq!(resolved.states[0].1, "3");
        assert_eq!(reader.verify().unwrap().cells, 1);
    }
}
