//! Rewrites an existing container through a fresh [`BoundedWriter`].
//!
//! Every region is expanded back into world-space cells, names and payloads
//! are resolved through the source dictionaries, and the cells are fed to a
//! new write session. The output is always a current-version container with
//! freshly carved regions, which tightens containers produced by older or
//! less thorough writers.

use std::path::Path;

use tracing::{debug, info};

use crate::container::file::VERSION_FULL_ORIGIN;
use crate::container::StreamReader;
use crate::error::{BcfError, Result};
use crate::writer::{BoundedWriter, ContainerSummary, WriterConfig};

/// Reads `input` and writes a recompacted copy to `output`.
///
/// # Arguments
///
/// * `input` - Existing container (version 3 or newer)
/// * `output` - Path of the container to produce; must differ from `input`
/// * `config` - Writer configuration for the new session
///
/// # Errors
///
/// Returns [`BcfError::ColumnOriginMissing`] for version 2 inputs, whose
/// records do not say which column they belong to. Otherwise returns an
/// error if the input cannot be read, a region references a descriptor
/// missing from the input, or writing the output fails.
pub fn recompact(input: &Path, output: &Path, config: WriterConfig) -> Result<ContainerSummary> {
    let mut reader = StreamReader::open(input)?;
    let version = reader.header().version;
    if version < VERSION_FULL_ORIGIN {
        return Err(BcfError::ColumnOriginMissing(version));
    }
    let mut writer = BoundedWriter::create(output, config)?;

    let partitions = reader.partition_count();
    let mut cells_in = 0u64;
    let mut regions_in = 0u64;

    for partition in 0..partitions {
        let record = reader.partition(partition)?;
        regions_in += record.regions.len() as u64;

        for region in &record.regions {
            let resolved = reader.resolve(region.descriptor_id).ok_or_else(|| {
                BcfError::Corrupted(format!(
                    "Partition {} references missing descriptor {}",
                    partition, region.descriptor_id
                ))
            })?;
            for pos in region.bounds.cells() {
                let (x, y, z) = record.origin.to_world(pos);
                writer.add_cell(
                    x,
                    y,
                    z,
                    resolved.type_name,
                    resolved.states.as_slice(),
                    resolved.aux.cloned(),
                )?;
                cells_in += 1;
            }
        }
        debug!("Recompacting: read partition {}/{}", partition + 1, partitions);
    }

    let summary = writer.finalize()?;
    info!(
        "Recompacted {} -> {}: {} regions -> {} regions ({} cells)",
        input.display(),
        output.display(),
        regions_in,
        summary.region_count,
        cells_in
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::file::{
        ContainerHeader, DescriptorTable, IndexTable, NameTable, PartitionRecord, HEADER_SIZE,
    };
    use crate::model::{BoundingBox, Descriptor, LocalPos, Origin, Region};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// A container storing a 4x1x1 bar as four unit regions.
    fn write_fragmented(path: &Path) {
        let mut body = Vec::new();
        let record = PartitionRecord {
            origin: Origin::new(0, -56, 0),
            regions: (0..4)
                .map(|x| Region::new(0, BoundingBox::unit(LocalPos::new(x, 60, 0))))
                .collect(),
        };
        record.write_to(&mut body).unwrap();

        let mut header = ContainerHeader {
            partition_count: 1,
            base_size: 144,
            height: 376,
            ..Default::default()
        };
        header.index_offset = (HEADER_SIZE + body.len()) as u64;
        IndexTable {
            offsets: vec![HEADER_SIZE as u64],
        }
        .write_to(&mut body)
        .unwrap();
        header.descriptor_offset = (HEADER_SIZE + body.len()) as u64;
        DescriptorTable {
            entries: vec![(0, Descriptor::new(0, vec![(0, 0)], None))],
        }
        .write_to(&mut body)
        .unwrap();
        header.type_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut types: NameTable<u16> = NameTable::new();
        types.insert(0, "stone");
        types.write_to(&mut body).unwrap();
        header.state_name_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut names: NameTable<u8> = NameTable::new();
        names.insert(0, "variant");
        names.write_to(&mut body).unwrap();
        header.state_value_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut values: NameTable<u8> = NameTable::new();
        values.insert(0, "smooth");
        values.write_to(&mut body).unwrap();

        let mut file = File::create(path).unwrap();
        header.write_to(&mut file).unwrap();
        file.write_all(&body).unwrap();
    }

    #[test]
    fn test_recompact_merges_fragmented_regions() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bcf");
        let output = dir.path().join("out.bcf");
        write_fragmented(&input);

        let config = WriterConfig::default().with_spill_root(dir.path());
        let summary = recompact(&input, &output, config).unwrap();
        assert_eq!(summary.region_count, 1);
        assert_eq!(summary.cells_added, 4);

        let mut reader = StreamReader::open(&output).unwrap();
        let regions = reader.regions(0).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds.volume(), 4);
        let resolved = reader.resolve(regions[0].descriptor_id).unwrap();
        assert_eq!(resolved.type_name, "stone");
        assert_eq!(resolved.states[0].0, "variant");
        assert_eq!(resolved.states[0].1, "smooth");

        let mut cells = reader.cells(0).unwrap();
        cells.sort();
        assert_eq!((cells[0].x, cells[0].y, cells[0].z), (0, 4, 0));
        assert_eq!(cells[3].x, 3);
    }

    /// A version 2 container with two partitions, one unit region each.
    fn write_v2_two_partitions(path: &Path) {
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for _ in 0..2 {
            offsets.push((HEADER_SIZE + body.len()) as u64);
            body.extend_from_slice(&PartitionRecord::encoded_size(2, 1).to_le_bytes());
            body.extend_from_slice(&(-56i16).to_le_bytes());
            body.extend_from_slice(&1u32.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
            for v in [0i16; 6] {
                body.extend_from_slice(&v.to_le_bytes());
            }
        }
        let mut header = ContainerHeader {
            version: 2,
            partition_count: 2,
            ..Default::default()
        };
        header.index_offset = (HEADER_SIZE + body.len()) as u64;
        IndexTable { offsets }.write_to(&mut body).unwrap();
        header.descriptor_offset = (HEADER_SIZE + body.len()) as u64;
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        header.type_dict_offset = (HEADER_SIZE + body.len()) as u64;
        let mut types: NameTable<u16> = NameTable::new();
        types.insert(0, "stone");
        types.write_to(&mut body).unwrap();
        header.state_name_dict_offset = (HEADER_SIZE + body.len()) as u64;
        NameTable::<u8>::new().write_to(&mut body).unwrap();

        let mut file = File::create(path).unwrap();
        header.write_to(&mut file).unwrap();
        file.write_all(&body).unwrap();
    }

    #[test]
    fn test_recompact_rejects_v2_without_column_origin() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("v2.bcf");
        let output = dir.path().join("out.bcf");
        write_v2_two_partitions(&input);

        // Both partitions read fine but share local (0, 0, 0).
        let mut reader = StreamReader::open(&input).unwrap();
        assert_eq!(reader.verify().unwrap().cells, 2);

        let result = recompact(
            &input,
            &output,
            WriterConfig::default().with_spill_root(dir.path()),
        );
        assert!(matches!(result, Err(BcfError::ColumnOriginMissing(2))));
        assert!(!output.exists());
    }

    #[test]
    fn test_recompact_missing_input() {
        let dir = TempDir::new().unwrap();
        let result = recompact(
            &dir.path().join("nope.bcf"),
            &dir.path().join("out.bcf"),
            WriterConfig::default().with_spill_root(dir.path()),
        );
        assert!(matches!(result, Err(BcfError::IoError(_))));
    }
}
