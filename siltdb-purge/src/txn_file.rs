//! Read-only snapshot of a table's transaction file (`_txn`).
//!
//! The transaction file records the table's committed transaction number, the
//! truncate version (bumped on every TRUNCATE so that row offsets from before
//! the truncate can be recognized as stale) and the partition list with
//! per-partition flags. The purge path loads it once per task, lazily, and
//! only consults the three facts above.
//!
//! Layout, little endian:
//!
//! ```text
//! 0..8    txn
//! 8..16   truncate_version
//! 16..20  partition_count
//! 20..    partition records, 32 bytes each:
//!           0..8   partition timestamp (micros)
//!           8..16  partition name txn
//!           16..24 row count
//!           24..32 flags (bit 0: read-only)
//! ```

use std::fs;
use std::io;
use std::path::Path;

use crate::error::SiltDbError;

pub const TXN_FILE_NAME: &str = "_txn";

const TX_OFFSET_TXN: usize = 0;
const TX_OFFSET_TRUNCATE_VERSION: usize = 8;
const TX_OFFSET_PARTITION_COUNT: usize = 16;
const TX_HEADER_SIZE: usize = 20;
const TX_PARTITION_RECORD_SIZE: usize = 32;

const PARTITION_FLAG_READ_ONLY: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxnPartition {
    pub timestamp: i64,
    pub name_txn: i64,
    pub row_count: u64,
    pub read_only: bool,
}

/// Parsed `_txn` contents. The instance is reusable: [`TxnSnapshot::load`]
/// replaces the previous contents while keeping the partition buffer.
#[derive(Debug, Default)]
pub struct TxnSnapshot {
    txn: i64,
    truncate_version: i64,
    partitions: Vec<TxnPartition>,
}

impl TxnSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path) -> Result<(), SiltDbError> {
        let data = fs::read(path)?;
        if data.len() < TX_HEADER_SIZE {
            return Err(SiltDbError::CorruptTxnFile { path: path.into() });
        }
        let partition_count = read_u32(&data, TX_OFFSET_PARTITION_COUNT) as usize;
        if data.len() < TX_HEADER_SIZE + partition_count * TX_PARTITION_RECORD_SIZE {
            return Err(SiltDbError::CorruptTxnFile { path: path.into() });
        }
        self.txn = read_i64(&data, TX_OFFSET_TXN);
        self.truncate_version = read_i64(&data, TX_OFFSET_TRUNCATE_VERSION);
        self.partitions.clear();
        self.partitions.reserve(partition_count);
        for i in 0..partition_count {
            let offset = TX_HEADER_SIZE + i * TX_PARTITION_RECORD_SIZE;
            let flags = read_u64(&data, offset + 24);
            self.partitions.push(TxnPartition {
                timestamp: read_i64(&data, offset),
                name_txn: read_i64(&data, offset + 8),
                row_count: read_u64(&data, offset + 16),
                read_only: flags & PARTITION_FLAG_READ_ONLY != 0,
            });
        }
        Ok(())
    }

    pub fn txn(&self) -> i64 {
        self.txn
    }

    pub fn truncate_version(&self) -> i64 {
        self.truncate_version
    }

    pub fn partitions(&self) -> &[TxnPartition] {
        &self.partitions
    }

    /// Whether the partition holding `partition_timestamp` is flagged
    /// read-only. Unknown timestamps (including the table-root sentinel) are
    /// not read-only.
    pub fn is_partition_read_only(&self, partition_timestamp: i64) -> bool {
        self.partitions
            .iter()
            .any(|p| p.timestamp == partition_timestamp && p.read_only)
    }
}

/// Writes a `_txn` file. The engine's commit path owns this format; it lives
/// here so fixtures and tools stay in sync with the reader above.
pub fn write_txn_file(
    table_dir: &Path,
    txn: i64,
    truncate_version: i64,
    partitions: &[TxnPartition],
) -> io::Result<()> {
    let mut buf = vec![0u8; TX_HEADER_SIZE + partitions.len() * TX_PARTITION_RECORD_SIZE];
    buf[TX_OFFSET_TXN..TX_OFFSET_TXN + 8].copy_from_slice(&txn.to_le_bytes());
    buf[TX_OFFSET_TRUNCATE_VERSION..TX_OFFSET_TRUNCATE_VERSION + 8]
        .copy_from_slice(&truncate_version.to_le_bytes());
    buf[TX_OFFSET_PARTITION_COUNT..TX_OFFSET_PARTITION_COUNT + 4]
        .copy_from_slice(&(partitions.len() as u32).to_le_bytes());
    for (i, partition) in partitions.iter().enumerate() {
        let offset = TX_HEADER_SIZE + i * TX_PARTITION_RECORD_SIZE;
        buf[offset..offset + 8].copy_from_slice(&partition.timestamp.to_le_bytes());
        buf[offset + 8..offset + 16].copy_from_slice(&partition.name_txn.to_le_bytes());
        buf[offset + 16..offset + 24].copy_from_slice(&partition.row_count.to_le_bytes());
        let flags = if partition.read_only {
            PARTITION_FLAG_READ_ONLY
        } else {
            0
        };
        buf[offset + 24..offset + 32].copy_from_slice(&flags.to_le_bytes());
    }
    fs::write(table_dir.join(TXN_FILE_NAME), buf)
}

fn read_i64(data: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(data[offset..offset + 8].try_into().expect("8 bytes"))
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().expect("8 bytes"))
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().expect("4 bytes"))
}
