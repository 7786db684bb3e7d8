//! On-disk container format and its streaming reader.

pub mod file;
pub mod reader;

pub use file::{
    ContainerHeader, DescriptorTable, IndexTable, NameTable, PartitionRecord, BCF_MAGIC,
    BCF_VERSION, HEADER_SIZE, MIN_STREAMING_VERSION,
};
pub use reader::{ContainerStats, ResolvedDescriptor, StreamReader, WorldCell, UNKNOWN_TYPE_NAME};
