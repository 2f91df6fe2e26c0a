use crate::types::{PartitionBy, TableToken};

/// One partition of the purge-log table, as seen by the completion writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeLogPartition {
    /// Partition timestamp (micros).
    pub timestamp: i64,
    /// Name txn of the partition directory.
    pub name_txn: i64,
    /// File generation of the completion-timestamp column in this partition.
    pub completion_generation: i64,
}

/// Descriptor of the engine's purge-log table: an append-only table whose
/// rows mirror purge entries 1:1. Pending rows are re-driven into new tasks
/// elsewhere; this crate only stamps completion timestamps into it, which is
/// why the descriptor is limited to partition enumeration and the completion
/// column's file generations.
#[derive(Clone, Debug)]
pub struct PurgeLogTable {
    token: TableToken,
    partition_by: PartitionBy,
    partitions: Vec<PurgeLogPartition>,
}

impl PurgeLogTable {
    pub fn new(
        token: TableToken,
        partition_by: PartitionBy,
        partitions: Vec<PurgeLogPartition>,
    ) -> Self {
        Self {
            token,
            partition_by,
            partitions,
        }
    }

    pub fn token(&self) -> &TableToken {
        &self.token
    }

    pub fn partition_by(&self) -> PartitionBy {
        self.partition_by
    }

    pub fn partition(&self, index: usize) -> Option<&PurgeLogPartition> {
        self.partitions.get(index)
    }
}
