use crate::stats::{Counter, Gauge, StatRegistry};
use std::sync::Arc;

macro_rules! purge_stat_name {
    ($suffix:expr) => {
        crate::stat_name!("purge", $suffix)
    };
}

pub const PURGE_TASKS_COMPLETED: &str = purge_stat_name!("tasks_completed");
pub const PURGE_TASKS_RETRIED: &str = purge_stat_name!("tasks_retried");
pub const PURGE_FILES_DELETED: &str = purge_stat_name!("files_deleted");
pub const PURGE_ENTRIES_ORPHANED: &str = purge_stat_name!("entries_orphaned");
pub const PURGE_ENTRIES_SKIPPED_READ_ONLY: &str = purge_stat_name!("entries_skipped_read_only");
pub const PURGE_UNRESOLVED_ENTRIES: &str = purge_stat_name!("unresolved_entries");

/// Stats for the column purge processor.
pub struct PurgeStats {
    /// Tasks whose every entry reached a terminal state in one run.
    pub tasks_completed: Arc<Counter>,
    /// Tasks reported not-done, to be re-submitted by the producer.
    pub tasks_retried: Arc<Counter>,
    /// Column-generation files actually removed.
    pub files_deleted: Arc<Counter>,
    /// Entries resolved without deletion because their table was dropped,
    /// recreated or truncated since the task was produced.
    pub entries_orphaned: Arc<Counter>,
    /// Entries resolved without deletion because their partition is
    /// read-only.
    pub entries_skipped_read_only: Arc<Counter>,
    /// Entries left unresolved by the most recent task run.
    pub unresolved_entries: Arc<Gauge<i64>>,
}

impl PurgeStats {
    pub fn new(registry: Arc<StatRegistry>) -> Self {
        let stats = Self {
            tasks_completed: Arc::new(Counter::default()),
            tasks_retried: Arc::new(Counter::default()),
            files_deleted: Arc::new(Counter::default()),
            entries_orphaned: Arc::new(Counter::default()),
            entries_skipped_read_only: Arc::new(Counter::default()),
            unresolved_entries: Arc::new(Gauge::default()),
        };
        registry.register(PURGE_TASKS_COMPLETED, stats.tasks_completed.clone());
        registry.register(PURGE_TASKS_RETRIED, stats.tasks_retried.clone());
        registry.register(PURGE_FILES_DELETED, stats.files_deleted.clone());
        registry.register(PURGE_ENTRIES_ORPHANED, stats.entries_orphaned.clone());
        registry.register(
            PURGE_ENTRIES_SKIPPED_READ_ONLY,
            stats.entries_skipped_read_only.clone(),
        );
        registry.register(PURGE_UNRESOLVED_ENTRIES, stats.unresolved_entries.clone());
        stats
    }
}
