//! Lossless compression of cell groups into axis-aligned box regions.

pub mod cell_set;
pub mod compressor;

pub use cell_set::{CellSet, DenseCellSet, HashCellSet, MembershipSet, RemovalStrategy};
pub use compressor::{CompressorConfig, RegionCompressor, AXIS_ORDERS};
