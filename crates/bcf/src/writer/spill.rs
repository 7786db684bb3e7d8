//! Transient per-partition spill files.
//!
//! Every partition evicted from memory appends one batch to
//! `partition_<index>.spill` inside a private temporary directory. Files are
//! append-only until finalize reads them back.
//!
//! ## Batch Frame
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────────────────┐
//! │ length (u32) │ crc32 (u32)  │ batch (length bytes)                 │
//! └──────────────┴──────────────┴──────────────────────────────────────┘
//!
//! batch := group count (u32)
//!          { descriptor id (u32), cell count (u32), count × (x, y, z: i16) }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::container::file::{read_i16, read_u32};
use crate::error::{BcfError, Result};
use crate::model::LocalPos;
use crate::partition::{CellGroup, PartitionIndex};

/// Spill file name prefix.
pub const SPILL_PREFIX: &str = "partition";

/// Spill file extension.
pub const SPILL_EXTENSION: &str = "spill";

/// Prefix of the transient spill directory.
pub const SPILL_DIR_PREFIX: &str = "bcf-spill-";

/// Encodes one batch body (without frame).
pub fn encode_batch(groups: &[CellGroup]) -> Vec<u8> {
    let cells: usize = groups.iter().map(CellGroup::len).sum();
    let mut buf = Vec::with_capacity(4 + groups.len() * 8 + cells * 6);
    buf.extend_from_slice(&(groups.len() as u32).to_le_bytes());
    for group in groups {
        buf.extend_from_slice(&group.descriptor_id.to_le_bytes());
        buf.extend_from_slice(&(group.cells.len() as u32).to_le_bytes());
        for pos in &group.cells {
            buf.extend_from_slice(&pos.x.to_le_bytes());
            buf.extend_from_slice(&pos.y.to_le_bytes());
            buf.extend_from_slice(&pos.z.to_le_bytes());
        }
    }
    buf
}

/// Decodes one batch body.
pub fn decode_batch(mut data: &[u8]) -> Result<Vec<CellGroup>> {
    let count = read_u32(&mut data)?;
    let mut groups = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        let descriptor_id = read_u32(&mut data)?;
        let len = read_u32(&mut data)? as usize;
        if len.saturating_mul(6) > data.len() {
            return Err(BcfError::Corrupted(format!(
                "Spill group of {} cells overruns batch",
                len
            )));
        }
        let mut cells = Vec::with_capacity(len);
        for _ in 0..len {
            cells.push(LocalPos::new(
                read_i16(&mut data)?,
                read_i16(&mut data)?,
                read_i16(&mut data)?,
            ));
        }
        groups.push(CellGroup {
            descriptor_id,
            cells,
        });
    }
    Ok(groups)
}

/// Owns the spill directory and tracks which partitions have data on disk.
#[derive(Debug)]
pub struct SpillStore {
    dir: TempDir,
    batches: BTreeMap<PartitionIndex, u32>,
    appended: u64,
    bytes_written: u64,
}

impl SpillStore {
    /// Creates a uniquely named spill directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn create_in(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(SPILL_DIR_PREFIX)
            .tempdir_in(root)?;
        debug!("Created spill directory: {}", dir.path().display());
        Ok(Self {
            dir,
            batches: BTreeMap::new(),
            appended: 0,
            bytes_written: 0,
        })
    }

    /// Spill directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file_path(&self, partition: PartitionIndex) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}_{}.{}", SPILL_PREFIX, partition, SPILL_EXTENSION))
    }

    /// Appends one batch for `partition`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the spill file cannot be written.
    pub fn append(&mut self, partition: PartitionIndex, groups: &[CellGroup]) -> Result<()> {
        let data = encode_batch(groups);
        let len = u32::try_from(data.len())
            .map_err(|_| BcfError::Corrupted(format!("Spill batch of {} bytes too large", data.len())))?;
        let crc = crc32fast::hash(&data);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(partition))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&data)?;
        writer.flush()?;

        *self.batches.entry(partition).or_insert(0) += 1;
        self.appended += 1;
        self.bytes_written += 8 + data.len() as u64;
        Ok(())
    }

    /// Reads every batch of `partition`, in append order.
    ///
    /// Returns an empty list for partitions that never spilled.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::SpillChecksumMismatch`] if a batch fails its CRC,
    /// or [`BcfError::Corrupted`] if a frame is truncated.
    pub fn read_all(&self, partition: PartitionIndex) -> Result<Vec<CellGroup>> {
        if !self.batches.contains_key(&partition) {
            return Ok(Vec::new());
        }
        let mut reader = BufReader::new(File::open(self.file_path(partition))?);
        let mut groups = Vec::new();
        loop {
            let mut frame = [0u8; 8];
            match reader.read_exact(&mut frame[..4]) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            reader.read_exact(&mut frame[4..])?;
            let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
            let expected = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

            let mut data = vec![0u8; len];
            reader.read_exact(&mut data).map_err(|_| {
                BcfError::Corrupted(format!("Truncated spill batch in partition {}", partition))
            })?;
            let actual = crc32fast::hash(&data);
            if actual != expected {
                return Err(BcfError::SpillChecksumMismatch {
                    partition,
                    expected,
                    actual,
                });
            }
            groups.extend(decode_batch(&data)?);
        }
        Ok(groups)
    }

    /// Deletes the spill file of `partition`.
    pub fn remove(&mut self, partition: PartitionIndex) -> Result<()> {
        if self.batches.remove(&partition).is_some() {
            fs::remove_file(self.file_path(partition))?;
        }
        Ok(())
    }

    /// Partitions with spilled data, ascending.
    pub fn partitions(&self) -> Vec<PartitionIndex> {
        self.batches.keys().copied().collect()
    }

    /// Number of batches appended for `partition`.
    pub fn batch_count(&self, partition: PartitionIndex) -> u32 {
        self.batches.get(&partition).copied().unwrap_or(0)
    }

    /// Total batches appended across all partitions, removed ones included.
    pub fn total_batches(&self) -> u64 {
        self.appended
    }

    /// Total bytes appended, frames included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Removes the spill directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if removal fails.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed spill directory: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Vec<CellGroup> {
        vec![
            CellGroup {
                descriptor_id: 1,
                cells: vec![LocalPos::new(0, 0, 0), LocalPos::new(143, 375, -1)],
            },
            CellGroup {
                descriptor_id: 0,
                cells: vec![LocalPos::new(5, 6, 7)],
            },
        ]
    }

    #[test]
    fn test_batch_layout() {
        let data = encode_batch(&groups());
        assert_eq!(data.len(), 4 + (8 + 12) + (8 + 6));
        assert_eq!(decode_batch(&data).unwrap(), groups());
    }

    #[test]
    fn test_decode_rejects_overrun() {
        let mut data = encode_batch(&groups());
        data[8] = 200;
        assert!(decode_batch(&data).is_err());
    }

    #[test]
    fn test_append_and_read_back() {
        let root = tempfile::TempDir::new().unwrap();
        let mut store = SpillStore::create_in(root.path()).unwrap();
        store.append(7, &groups()).unwrap();
        store.append(7, &groups()[1..]).unwrap();
        store.append(3, &groups()[..1]).unwrap();

        assert_eq!(store.partitions(), vec![3, 7]);
        assert_eq!(store.batch_count(7), 2);
        assert_eq!(store.total_batches(), 3);
        assert!(store.path().join("partition_7.spill").exists());

        let back = store.read_all(7).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[2].descriptor_id, 0);
        assert!(store.read_all(99).unwrap().is_empty());

        store.remove(7).unwrap();
        assert!(!store.path().join("partition_7.spill").exists());
        assert_eq!(store.partitions(), vec![3]);

        let dir = store.path().to_path_buf();
        store.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_checksum_mismatch() {
        let root = tempfile::TempDir::new().unwrap();
        let mut store = SpillStore::create_in(root.path()).unwrap();
        store.append(1, &groups()).unwrap();

        let path = store.path().join("partition_1.spill");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.read_all(1),
            Err(BcfError::SpillChecksumMismatch { partition: 1, .. })
        ));
    }
}
