//! BCF - block container format storage engine
//!
//! This crate persists large, sparse voxel worlds as compact, randomly
//! readable container files.
//!
//! # Components
//!
//! - [`BoundedWriter`]: Memory-bounded writer that spills partitions to disk
//! - [`RegionCompressor`]: Greedy box carving of same-descriptor cells
//! - [`StreamReader`]: Lazy, per-partition container reader
//! - [`recompact`]: Re-carves an existing container
//!
//! # Example
//!
//! ```rust,ignore
//! use bcf_store::{BoundedWriter, StreamReader, WriterConfig};
//!
//! let mut writer = BoundedWriter::create(path, WriterConfig::default())?;
//! for (x, y, z, name) in cells {
//!     writer.add_cell(x, y, z, name, &[("facing", "north")], None)?;
//! }
//! writer.finalize()?;
//!
//! let mut reader = StreamReader::open(path)?;
//! for partition in 0..reader.partition_count() {
//!     for region in reader.regions(partition)? {
//!         let descriptor = reader.resolve(region.descriptor_id);
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod container;
pub mod error;
pub mod model;
pub mod partition;
pub mod recompact;
pub mod region;
pub mod writer;

pub use container::{ContainerHeader, StreamReader, WorldCell};
pub use error::{BcfError, Result};
pub use model::{AuxBlob, AuxCodec, BoundingBox, Descriptor, DescriptorId, LocalPos, Origin, Region};
pub use partition::PartitionGrid;
pub use recompact::recompact;
pub use region::{CompressorConfig, RegionCompressor};
pub use writer::{BoundedWriter, ContainerSummary, WriterConfig, WriterStats};
