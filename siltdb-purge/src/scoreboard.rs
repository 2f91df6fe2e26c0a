//! Transaction scoreboard: which transaction numbers may still be visible to
//! open readers of a table.
//!
//! Readers register the transaction number of the snapshot they open and
//! release it when they close. The purger asks whether an inclusive range of
//! transaction numbers is free of readers before deleting a superseded column
//! generation. Queries never block behind readers for longer than the
//! fine-grained lock below, and a failed query must be treated by callers as
//! "still visible".

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fail_parallel::{fail_point, FailPointRegistry};
use parking_lot::Mutex;

use crate::error::SiltDbError;
use crate::types::TableToken;

pub struct TxnScoreboard {
    readers: Mutex<BTreeMap<i64, u64>>,
    capacity: usize,
    fp_registry: Arc<FailPointRegistry>,
}

impl TxnScoreboard {
    pub(crate) fn new(capacity: usize, fp_registry: Arc<FailPointRegistry>) -> Self {
        Self {
            readers: Mutex::new(BTreeMap::new()),
            capacity,
            fp_registry,
        }
    }

    /// Registers a reader holding a snapshot at `txn`. Fails when the
    /// scoreboard already tracks `capacity` distinct transactions; the caller
    /// must not open the snapshot in that case.
    pub fn acquire(&self, txn: i64) -> Result<(), SiltDbError> {
        let mut readers = self.readers.lock();
        if readers.len() >= self.capacity && !readers.contains_key(&txn) {
            return Err(SiltDbError::ScoreboardCapacityExceeded {
                txn,
                capacity: self.capacity,
            });
        }
        *readers.entry(txn).or_insert(0) += 1;
        Ok(())
    }

    /// Releases one reader previously registered at `txn`.
    pub fn release(&self, txn: i64) {
        let mut readers = self.readers.lock();
        debug_assert!(readers.contains_key(&txn), "release without acquire");
        if let Some(count) = readers.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&txn);
            }
        }
    }

    /// Returns whether no reader holds any transaction in the inclusive
    /// range `[from_txn, to_txn]`.
    pub fn is_range_available(&self, from_txn: i64, to_txn: i64) -> Result<bool, SiltDbError> {
        fail_point!(Arc::clone(&self.fp_registry), "scoreboard-range-query", |_| {
            Err(SiltDbError::ScoreboardQueryFailed { from_txn, to_txn })
        });
        if from_txn > to_txn {
            return Ok(true);
        }
        let readers = self.readers.lock();
        Ok(readers.range(from_txn..=to_txn).next().is_none())
    }

    pub fn active_reader_count(&self) -> usize {
        self.readers.lock().len()
    }
}

/// Hands out shared per-table scoreboards, creating them on first use. All
/// components touching the same table observe the same scoreboard instance.
pub struct ScoreboardRegistry {
    capacity: usize,
    fp_registry: Arc<FailPointRegistry>,
    boards: Mutex<HashMap<String, Arc<TxnScoreboard>>>,
}

impl ScoreboardRegistry {
    pub fn new(capacity: usize) -> Self {
        Self::new_with_fp_registry(capacity, Arc::new(FailPointRegistry::new()))
    }

    pub fn new_with_fp_registry(capacity: usize, fp_registry: Arc<FailPointRegistry>) -> Self {
        Self {
            capacity,
            fp_registry,
            boards: Mutex::new(HashMap::new()),
        }
    }

    pub fn scoreboard(&self, table: &TableToken) -> Arc<TxnScoreboard> {
        let mut boards = self.boards.lock();
        boards
            .entry(table.dir_name().to_string())
            .or_insert_with(|| {
                Arc::new(TxnScoreboard::new(
                    self.capacity,
                    Arc::clone(&self.fp_registry),
                ))
            })
            .clone()
    }
}
