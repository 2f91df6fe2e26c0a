//! Fixed-offset access to the table metadata file (`_meta`).
//!
//! The purge path needs exactly one field out of the metadata: the table id,
//! so it can tell whether the table on disk is still the one a purge task was
//! created against. The id sits at a fixed offset and is read positionally
//! from a read-only handle; everything else in the file is opaque here.

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::types::PartitionBy;
use crate::utils;

pub const META_FILE_NAME: &str = "_meta";

const META_FORMAT_VERSION: u32 = 1;
const META_OFFSET_FORMAT_VERSION: usize = 0;
const META_OFFSET_PARTITION_BY: usize = 4;
const META_OFFSET_TABLE_ID: usize = 16;
const META_HEADER_SIZE: usize = 20;

/// Sentinel returned when the table id cannot be read; never matches a live
/// table id, so callers treat the task as orphaned.
pub const INVALID_TABLE_ID: u32 = u32::MAX;

/// Reads the table id out of `_meta`. A missing, unreadable or truncated file
/// yields [`INVALID_TABLE_ID`]: the table was dropped (or never finished
/// creation), and purge tasks against it are orphans either way.
pub fn read_table_id(meta_path: &Path) -> u32 {
    let file = match File::open(meta_path) {
        Ok(file) => file,
        Err(_) => return INVALID_TABLE_ID,
    };
    let mut buf = [0u8; 4];
    match utils::read_exact_at(&file, &mut buf, META_OFFSET_TABLE_ID as u64) {
        Ok(()) => u32::from_le_bytes(buf),
        Err(_) => INVALID_TABLE_ID,
    }
}

/// Writes a minimal `_meta` header into `table_dir`. Used by the engine side
/// when a table is created and by test fixtures.
pub fn write_table_meta(
    table_dir: &Path,
    table_id: u32,
    partition_by: PartitionBy,
) -> io::Result<()> {
    let mut buf = [0u8; META_HEADER_SIZE];
    buf[META_OFFSET_FORMAT_VERSION..META_OFFSET_FORMAT_VERSION + 4]
        .copy_from_slice(&META_FORMAT_VERSION.to_le_bytes());
    buf[META_OFFSET_PARTITION_BY..META_OFFSET_PARTITION_BY + 4]
        .copy_from_slice(&(partition_by as u32).to_le_bytes());
    buf[META_OFFSET_TABLE_ID..META_OFFSET_TABLE_ID + 4].copy_from_slice(&table_id.to_le_bytes());
    fs::write(table_dir.join(META_FILE_NAME), buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_table_id() {
        let dir = tempfile::tempdir().unwrap();
        write_table_meta(dir.path(), 42, PartitionBy::Day).unwrap();
        assert_eq!(read_table_id(&dir.path().join(META_FILE_NAME)), 42);
    }

    #[test]
    fn test_missing_meta_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            read_table_id(&dir.path().join(META_FILE_NAME)),
            INVALID_TABLE_ID
        );
    }

    #[test]
    fn test_truncated_meta_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(META_FILE_NAME);
        fs::write(&path, [0u8; 10]).unwrap();
        assert_eq!(read_table_id(&path), INVALID_TABLE_ID);
    }
}
