use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use tracing::{error, info};

use crate::error::SiltDbError;
use crate::paths::{self, PathBuilder};
use crate::purge_log::PurgeLogTable;
use crate::types::rows;
use crate::utils;

const COMPLETION_TIMESTAMP_SIZE: u64 = 8;

/// No partition cached yet; must differ from every real partition timestamp.
const NO_PARTITION: i64 = i64::MAX;
/// Cached handle is suspect after a failed write; forces a reopen.
const INVALIDATED: i64 = i64::MIN;

/// Stamps completion timestamps into the purge-log table's completion column
/// by direct positional writes, so the producer stops re-driving rows whose
/// files are gone.
///
/// The column file of the row's log partition is kept open across tasks;
/// tasks touching the same partition reuse the handle. Completion marking is
/// bookkeeping over work already done, so every failure here is logged and
/// swallowed; at worst a purge is re-driven once more and resolves through
/// the existence short-circuit.
pub(crate) struct CompletionLog {
    db_root: PathBuf,
    log: PurgeLogTable,
    column_name: String,
    file: Option<File>,
    partition_timestamp: i64,
}

impl CompletionLog {
    pub(crate) fn new(db_root: PathBuf, log: PurgeLogTable, column_name: String) -> Self {
        Self {
            db_root,
            log,
            column_name,
            file: None,
            partition_timestamp: NO_PARTITION,
        }
    }

    /// Writes `timestamp_micros` at every row id's slot. All rows of one task
    /// live in one log partition, so the partition file is resolved from the
    /// first row only.
    pub(crate) fn mark_completed(&mut self, row_ids: &[u64], timestamp_micros: i64) {
        let stamp = timestamp_micros.to_le_bytes();
        for (i, &row_id) in row_ids.iter().enumerate() {
            let partition_index = rows::to_partition_index(row_id) as usize;
            if i == 0 {
                let timestamp = match self.log.partition(partition_index) {
                    Some(partition) => partition.timestamp,
                    None => {
                        error!(
                            "purge log partition missing, cannot record completion [partition_index={}]",
                            partition_index
                        );
                        return;
                    }
                };
                if self.partition_timestamp != timestamp {
                    if let Err(e) = self.reopen(partition_index) {
                        error!(
                            "could not open purge log completion file [partition_index={}, error={}]",
                            partition_index, e
                        );
                        return;
                    }
                }
            }
            let Some(file) = self.file.as_ref() else {
                return;
            };
            let offset = rows::to_local_row(row_id) * COMPLETION_TIMESTAMP_SIZE;
            if let Err(e) = utils::write_all_at(file, &stamp, offset) {
                let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
                error!(
                    "could not mark purge row as completed [offset={}, file_size={}, error={}]",
                    offset, file_size, e
                );
                // Reopen on the next run in case the handle went bad.
                self.partition_timestamp = INVALIDATED;
            }
        }
    }

    fn reopen(&mut self, partition_index: usize) -> Result<(), SiltDbError> {
        let partition = *self
            .log
            .partition(partition_index)
            .ok_or(SiltDbError::PurgeLogPartitionMissing(partition_index))?;
        let mut path = PathBuilder::new(&self.db_root);
        path.push_name(self.log.token().dir_name());
        paths::partition_dir(
            &mut path,
            self.log.partition_by(),
            partition.timestamp,
            partition.name_txn,
        );
        paths::data_file(&mut path, &self.column_name, partition.completion_generation);
        self.close();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_std())?;
        info!("reopened purge log completion file [path={}]", path);
        self.file = Some(file);
        self.partition_timestamp = partition.timestamp;
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.file = None;
        self.partition_timestamp = NO_PARTITION;
    }
}
