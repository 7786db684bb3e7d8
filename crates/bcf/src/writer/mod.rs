//! Memory-bounded container writer.
//!
//! [`BoundedWriter`] accepts cells one at a time, interns their descriptors
//! and buffers them per partition. Every `check_interval` cells it sums the
//! resident cell count and, once the sum reaches `max_resident_cells`, spills
//! the largest partitions to disk until the sum is back under the limit.
//!
//! [`BoundedWriter::finalize`] spills whatever is still resident, then
//! rebuilds each partition from its spill batches, compresses it into
//! regions and writes the container:
//!
//! 1. Header placeholder (67 bytes)
//! 2. Partition records, ascending partition index
//! 3. Index table
//! 4. Descriptor table
//! 5. Type, state-name and state-value dictionaries
//! 6. Header rewrite with final counts and offsets
//!
//! # Example
//!
//! ```rust,no_run
//! use bcf_store::{BoundedWriter, WriterConfig};
//!
//! let mut writer = BoundedWriter::create("world.bcf", WriterConfig::default())?;
//! writer.add_cell(0, 64, 0, "stone", &[] as &[(&str, &str)], None)?;
//! writer.add_cell(1, 64, 0, "oak_stairs", &[("facing", "north")], None)?;
//! let summary = writer.finalize()?;
//! println!("{} regions", summary.region_count);
//! # Ok::<(), bcf_store::BcfError>(())
//! ```

pub mod spill;

pub use spill::SpillStore;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::container::file::{
    ContainerHeader, DescriptorTable, IndexTable, NameTable, PartitionRecord, BCF_VERSION,
    HEADER_SIZE,
};
use crate::error::Result;
use crate::model::{AuxBlob, Descriptor, DescriptorId, Dictionaries, Palette};
use crate::partition::{
    add_cell_to_group, merge_groups, CellGroup, PartitionGrid, PartitionIndex,
    DEFAULT_MIN_Y, DEFAULT_PARTITION_SIDE, DEFAULT_WORLD_HEIGHT, GRID_STRIDE,
};
use crate::region::{CompressorConfig, RegionCompressor};

/// Default resident cell limit before spilling.
pub const DEFAULT_MAX_RESIDENT_CELLS: usize = 25_000;

/// Default number of `add_cell` calls between memory checks.
pub const DEFAULT_CHECK_INTERVAL: u32 = 200;

/// Configuration for [`BoundedWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory under which the private spill directory is created.
    ///
    /// Default: the OS temporary directory.
    pub spill_root: PathBuf,

    /// Resident cell count that triggers spilling.
    ///
    /// Spilling brings the resident count back to at most this value.
    /// Default: 25 000.
    pub max_resident_cells: usize,

    /// Number of `add_cell` calls between resident-count checks.
    ///
    /// Zero is treated as one. Default: 200.
    pub check_interval: u32,

    /// Partition side length in cells. Default: 144.
    pub partition_side: u8,

    /// World floor; local y is measured from here. Default: -56.
    pub min_y: i32,

    /// World height recorded in the header. Default: 376.
    pub world_height: u16,

    /// Region compressor tuning.
    pub compressor: CompressorConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            spill_root: std::env::temp_dir(),
            max_resident_cells: DEFAULT_MAX_RESIDENT_CELLS,
            check_interval: DEFAULT_CHECK_INTERVAL,
            partition_side: DEFAULT_PARTITION_SIDE,
            min_y: DEFAULT_MIN_Y,
            world_height: DEFAULT_WORLD_HEIGHT,
            compressor: CompressorConfig::default(),
        }
    }
}

impl WriterConfig {
    /// Sets the spill root directory.
    pub fn with_spill_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.spill_root = root.into();
        self
    }

    /// Sets the resident cell limit.
    pub fn with_max_resident_cells(mut self, limit: usize) -> Self {
        self.max_resident_cells = limit;
        self
    }

    /// Sets the check interval.
    pub fn with_check_interval(mut self, interval: u32) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the partition side length.
    pub fn with_partition_side(mut self, side: u8) -> Self {
        self.partition_side = side;
        self
    }

    /// Sets the world floor.
    pub fn with_min_y(mut self, min_y: i32) -> Self {
        self.min_y = min_y;
        self
    }

    /// Sets the recorded world height.
    pub fn with_world_height(mut self, height: u16) -> Self {
        self.world_height = height;
        self
    }

    /// Sets the compressor configuration.
    pub fn with_compressor(mut self, compressor: CompressorConfig) -> Self {
        self.compressor = compressor;
        self
    }
}

/// Snapshot of writer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    /// Cells currently buffered in memory.
    pub resident_cells: usize,
    /// Partitions currently buffered in memory.
    pub resident_partitions: usize,
    /// Spill batches written so far.
    pub spilled_batches: u64,
    /// Cells accepted by `add_cell`.
    pub cells_added: u64,
    /// Distinct descriptors interned.
    pub descriptors: usize,
}

/// Result of a finished write session.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Path of the written container.
    pub path: PathBuf,
    /// Final header.
    pub header: ContainerHeader,
    /// Regions written across all partitions.
    pub region_count: u64,
    /// Cells accepted by `add_cell`, duplicates included.
    pub cells_added: u64,
    /// Spill batches written during the session.
    pub spilled_batches: u64,
}

#[derive(Debug, Default)]
struct ResidentPartition {
    groups: Vec<CellGroup>,
    cells: usize,
}

/// Streaming, memory-bounded BCF writer.
#[derive(Debug)]
pub struct BoundedWriter {
    output: PathBuf,
    config: WriterConfig,
    grid: PartitionGrid,
    compressor: RegionCompressor,
    dictionaries: Dictionaries,
    palette: Palette,
    resident: HashMap<PartitionIndex, ResidentPartition>,
    resident_cells: usize,
    spill: SpillStore,
    calls_since_check: u32,
    cells_added: u64,
}

impl BoundedWriter {
    /// Starts a write session targeting `output`.
    ///
    /// The output file itself is only created by [`BoundedWriter::finalize`].
    ///
    /// # Arguments
    ///
    /// * `output` - Path of the container to produce
    /// * `config` - Writer configuration
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the spill directory cannot be created.
    pub fn create(output: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let spill = SpillStore::create_in(&config.spill_root)?;
        info!(
            "Starting BCF write session for {} (resident limit {} cells)",
            output.as_ref().display(),
            config.max_resident_cells
        );
        Ok(Self {
            output: output.as_ref().to_path_buf(),
            grid: PartitionGrid::new(config.partition_side, config.min_y),
            compressor: RegionCompressor::new(config.compressor),
            config,
            dictionaries: Dictionaries::new(),
            palette: Palette::new(),
            resident: HashMap::new(),
            resident_cells: 0,
            spill,
            calls_since_check: 0,
            cells_added: 0,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Returns the interning dictionaries.
    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dictionaries
    }

    /// Returns the descriptor palette.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            resident_cells: self.resident_cells,
            resident_partitions: self.resident.len(),
            spilled_batches: self.spill.total_batches(),
            cells_added: self.cells_added,
            descriptors: self.palette.len(),
        }
    }

    /// Adds one cell.
    ///
    /// Writing the same coordinate twice with the same descriptor stores it
    /// once; with different descriptors both are kept.
    ///
    /// # Arguments
    ///
    /// * `x`, `y`, `z` - World coordinates
    /// * `type_name` - Cell type
    /// * `states` - Ordered `(name, value)` state pairs
    /// * `aux` - Optional opaque payload
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The coordinate is outside the partition grid
    /// - A dictionary runs out of ids
    /// - Spilling fails
    pub fn add_cell<N, V>(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        type_name: &str,
        states: &[(N, V)],
        aux: Option<AuxBlob>,
    ) -> Result<DescriptorId>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let location = self.grid.locate(x, y, z)?;
        self.dictionaries.check_room(type_name, states)?;

        let type_id = self.dictionaries.intern_type(type_name)?;
        let mut pairs = Vec::with_capacity(states.len());
        for (name, value) in states {
            pairs.push((
                self.dictionaries.intern_state_name(name.as_ref())?,
                self.dictionaries.intern_state_value(value.as_ref())?,
            ));
        }
        let descriptor_id = self.palette.intern(Descriptor::new(type_id, pairs, aux))?;

        let partition = self.resident.entry(location.partition).or_default();
        add_cell_to_group(&mut partition.groups, descriptor_id, location.local);
        partition.cells += 1;
        self.resident_cells += 1;
        self.cells_added += 1;

        self.calls_since_check += 1;
        if self.calls_since_check >= self.config.check_interval.max(1) {
            self.calls_since_check = 0;
            self.flush_if_needed()?;
        }

        Ok(descriptor_id)
    }

    /// Spills largest partitions first while the resident count is at or
    /// above the limit, stopping once it is at most the limit.
    fn flush_if_needed(&mut self) -> Result<()> {
        let limit = self.config.max_resident_cells;
        if self.resident_cells < limit {
            return Ok(());
        }

        let mut order: Vec<(PartitionIndex, usize)> =
            self.resident.iter().map(|(&p, r)| (p, r.cells)).collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (partition, _) in order {
            if self.resident_cells <= limit {
                break;
            }
            self.spill_partition(partition)?;
        }
        Ok(())
    }

    fn spill_partition(&mut self, partition: PartitionIndex) -> Result<()> {
        if let Some(resident) = self.resident.remove(&partition) {
            self.spill.append(partition, &resident.groups)?;
            self.resident_cells -= resident.cells;
            debug!(
                "Spilled partition {} ({} cells, {} groups)",
                partition,
                resident.cells,
                resident.groups.len()
            );
        }
        Ok(())
    }

    /// Spills every resident partition.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a spill file cannot be written.
    pub fn spill_all(&mut self) -> Result<()> {
        let mut partitions: Vec<_> = self.resident.keys().copied().collect();
        partitions.sort_unstable();
        for partition in partitions {
            self.spill_partition(partition)?;
        }
        Ok(())
    }

    /// Writes the container and removes all transient files.
    ///
    /// On failure the partially written output file is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if spilling, reading spill files back or writing the
    /// container fails, or if a dictionary name is longer than 65535 bytes.
    pub fn finalize(self) -> Result<ContainerSummary> {
        let output = self.output.clone();
        match self.write_container() {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&output) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove incomplete container {}: {:?}",
                            output.display(),
                            rm
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn write_container(mut self) -> Result<ContainerSummary> {
        self.spill_all()?;

        let file = File::create(&self.output)?;
        let mut writer = BufWriter::new(file);

        // Placeholder header, patched at the end.
        let mut header = ContainerHeader::default();
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        header.write_to(&mut buf)?;
        writer.write_all(&buf)?;
        let mut position = HEADER_SIZE as u64;

        let mut index = IndexTable::default();
        let mut region_count = 0u64;
        let mut extent: Option<[i32; 4]> = None;

        for partition in self.spill.partitions() {
            let groups = merge_groups(self.spill.read_all(partition)?);
            let regions = self.compressor.compress(&groups);
            let record = PartitionRecord {
                origin: self.grid.origin_of(partition)?,
                regions,
            };

            buf.clear();
            let size = record.write_to(&mut buf)?;
            writer.write_all(&buf)?;
            index.offsets.push(position);
            position += size;
            region_count += record.regions.len() as u64;

            let gx = (partition % GRID_STRIDE as u64) as i32;
            let gz = (partition / GRID_STRIDE as u64) as i32;
            extent = Some(match extent {
                None => [gx, gx, gz, gz],
                Some([x0, x1, z0, z1]) => [x0.min(gx), x1.max(gx), z0.min(gz), z1.max(gz)],
            });

            debug!(
                "Wrote partition {} ({} regions from {} groups)",
                partition,
                record.regions.len(),
                groups.len()
            );
            self.spill.remove(partition)?;
        }

        header.partition_count = index.offsets.len() as u64;

        header.index_offset = position;
        buf.clear();
        index.write_to(&mut buf)?;
        writer.write_all(&buf)?;
        position += buf.len() as u64;

        header.descriptor_offset = position;
        buf.clear();
        DescriptorTable::write_entries(&mut buf, self.palette.len(), self.palette.iter())?;
        writer.write_all(&buf)?;
        position += buf.len() as u64;

        let dicts = &self.dictionaries;
        header.type_dict_offset = position;
        buf.clear();
        NameTable::write_entries(&mut buf, dicts.types.len(), dicts.types.iter())?;
        writer.write_all(&buf)?;
        position += buf.len() as u64;

        header.state_name_dict_offset = position;
        buf.clear();
        NameTable::write_entries(&mut buf, dicts.state_names.len(), dicts.state_names.iter())?;
        writer.write_all(&buf)?;
        position += buf.len() as u64;

        header.state_value_dict_offset = position;
        buf.clear();
        NameTable::write_entries(&mut buf, dicts.state_values.len(), dicts.state_values.iter())?;
        writer.write_all(&buf)?;

        let side = u32::from(self.grid.side());
        let span = |lo: i32, hi: i32| ((hi - lo + 1) as u32 * side).min(u32::from(u16::MAX)) as u16;
        if let Some([x0, x1, z0, z1]) = extent {
            header.width = span(x0, x1);
            header.length = span(z0, z1);
        }
        header.version = BCF_VERSION;
        header.height = self.config.world_height;
        header.base_size = self.grid.side();
        header.aux_offset = 0;

        writer.flush()?;
        writer.seek(SeekFrom::Start(0))?;
        header.write_to(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        let spilled_batches = self.spill.total_batches();
        self.spill.close()?;

        info!(
            "Finalized {}: {} partitions, {} regions, {} descriptors, {} cells",
            self.output.display(),
            header.partition_count,
            region_count,
            self.palette.len(),
            self.cells_added
        );

        Ok(ContainerSummary {
            path: self.output,
            header,
            region_count,
            cells_added: self.cells_added,
            spilled_batches,
        })
    }
}
