//! Error and Result types for BCF container operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for BCF operations.
pub type Result<T> = std::result::Result<T, BcfError>;

/// The error type for BCF operations.
#[derive(Debug, Error)]
pub enum BcfError {
    /// Invalid magic bytes in the container header.
    #[error("Invalid magic bytes: expected BCF, got {0:?}")]
    InvalidMagic([u8; 3]),

    /// Container version is newer than this crate understands.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Container version predates the streaming layout.
    #[error("Version {0} does not support streaming reads (need >= 2)")]
    StreamingUnsupported(u8),

    /// Container records lack the X/Z origin needed to place cells in
    /// world space.
    #[error("Version {0} records carry no column origin (need >= 3)")]
    ColumnOriginMissing(u8),

    /// An interning table ran out of ids.
    #[error("{table} dictionary is full ({limit} entries)")]
    CapacityExceeded {
        /// Name of the table that overflowed.
        table: &'static str,
        /// Maximum number of entries the table can hold.
        limit: usize,
    },

    /// A dictionary name does not fit its 16-bit length prefix.
    #[error("Name too long: {len} bytes (max 65535)")]
    NameTooLong {
        /// Length of the offending name in bytes.
        len: usize,
    },

    /// A cell lies outside the addressable partition grid.
    #[error("Coordinate out of range: ({x}, {y}, {z})")]
    CoordinateOutOfRange {
        /// World X.
        x: i32,
        /// World Y.
        y: i32,
        /// World Z.
        z: i32,
    },

    /// Requested partition index is not present in the container.
    #[error("Partition not found: {0}")]
    PartitionNotFound(u64),

    /// A spill batch failed its checksum on read-back.
    #[error("Spill checksum mismatch in partition {partition}: expected {expected}, got {actual}")]
    SpillChecksumMismatch {
        /// Partition the batch belongs to.
        partition: u64,
        /// Checksum stored with the batch.
        expected: u32,
        /// Checksum computed over the batch bytes.
        actual: u32,
    },

    /// Structural corruption detected while decoding.
    #[error("Corrupted container: {0}")]
    Corrupted(String),

    /// Auxiliary payload codec failure.
    #[error("Aux payload error: {0}")]
    Aux(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
