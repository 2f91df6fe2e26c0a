use crate::types::{rows, ColumnType, PartitionBy, TableToken};

/// One obsolete (generation, partition) pair of a purge task, together with
/// the purge-log row that recorded it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeEntry {
    /// Generation of the column files to remove.
    pub column_generation: i64,
    /// Partition holding the files, or [`TABLE_ROOT_PARTITION`] for symbol
    /// dictionary files at table root.
    ///
    /// [`TABLE_ROOT_PARTITION`]: crate::types::TABLE_ROOT_PARTITION
    pub partition_timestamp: i64,
    /// Name txn of the partition directory (`-1` for the original
    /// incarnation).
    pub partition_name_txn: i64,
    /// Purge-log row mirroring this entry.
    pub log_row_id: u64,
}

/// Immutable unit of purge work, built by the task producer from pending
/// purge-log rows.
///
/// Every entry of one task must map to the same purge-log partition; the
/// producer writes all rows describing one column update in one batch, which
/// pins them to a single partition. Completion marking relies on this and
/// does not re-check it per row.
#[derive(Clone, Debug)]
pub struct ColumnPurgeTask {
    table: TableToken,
    partition_by: PartitionBy,
    truncate_version: i64,
    column_name: String,
    column_type: Option<ColumnType>,
    update_txn: i64,
    entries: Vec<PurgeEntry>,
}

impl ColumnPurgeTask {
    pub fn new(
        table: TableToken,
        partition_by: PartitionBy,
        truncate_version: i64,
        column_name: impl Into<String>,
        column_type: Option<ColumnType>,
        update_txn: i64,
        entries: Vec<PurgeEntry>,
    ) -> Self {
        debug_assert!(
            entries
                .windows(2)
                .all(|w| rows::to_partition_index(w[0].log_row_id)
                    == rows::to_partition_index(w[1].log_row_id)),
            "purge task entries must map to a single purge-log partition"
        );
        Self {
            table,
            partition_by,
            truncate_version,
            column_name: column_name.into(),
            column_type,
            update_txn,
            entries,
        }
    }

    pub fn table(&self) -> &TableToken {
        &self.table
    }

    pub fn partition_by(&self) -> PartitionBy {
        self.partition_by
    }

    /// Truncate version of the table when this task was produced. A table
    /// truncated since then invalidates the task wholesale.
    pub fn truncate_version(&self) -> i64 {
        self.truncate_version
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// `None` when the column no longer exists in the table metadata (it was
    /// dropped after the rewrite); the purger then tries every file family.
    pub fn column_type(&self) -> Option<ColumnType> {
        self.column_type
    }

    /// Transaction that superseded the generations in this task.
    pub fn update_txn(&self) -> i64 {
        self.update_txn
    }

    pub fn entries(&self) -> &[PurgeEntry] {
        &self.entries
    }
}
