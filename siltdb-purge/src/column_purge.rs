//! Column-version purge.
//!
//! Rewriting a column in place (UPDATE), retyping it, or dropping it leaves
//! the previous generation of the column's files on disk. Those files cannot
//! be unlinked right away: readers holding older transaction snapshots may
//! still be mapping them. The engine records each superseded generation in
//! the purge log; the task producer batches pending log rows into
//! [`ColumnPurgeTask`]s and hands them to a [`ColumnPurger`].
//!
//! A purge run walks the task's entries, re-derives every file the
//! generation may have produced, and deletes whatever the table's scoreboard
//! proves invisible to all readers. Entries whose table was dropped,
//! recreated or truncated since the task was produced are resolved without
//! deletion; entries still visible to a reader stay unresolved and the task
//! is reported not-done so the producer re-submits it. Whatever did resolve
//! is stamped into the purge log's completion column before the run returns.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fail_parallel::{fail_point, FailPointRegistry};
use tracing::{debug, error, info};

use crate::clock::SystemClock;
use crate::column_purge::completion::CompletionLog;
use crate::column_purge::stats::PurgeStats;
use crate::config::Settings;
use crate::error::SiltDbError;
use crate::paths::{self, PathBuilder};
use crate::purge_log::PurgeLogTable;
use crate::purge_task::{ColumnPurgeTask, PurgeEntry};
use crate::scoreboard::{ScoreboardRegistry, TxnScoreboard};
use crate::stats::StatRegistry;
use crate::table_meta;
use crate::txn_file::{TxnSnapshot, TXN_FILE_NAME};
use crate::types::{ColumnType, TABLE_ROOT_PARTITION};
use crate::utils::system_time_to_micros;

mod completion;
pub mod stats;

/// Where the visibility facts for a purge run come from.
#[derive(Clone, Copy)]
enum ScoreboardMode<'a> {
    /// The purger acquires the table's scoreboard and loads its own `_txn`
    /// snapshot for the duration of the run.
    Internal,
    /// An open reader lends its snapshot and scoreboard; the purger must not
    /// release them. The reader's existence also pins the table identity, so
    /// identity/epoch validation is skipped.
    External {
        snapshot: &'a TxnSnapshot,
        scoreboard: &'a TxnScoreboard,
    },
    /// The caller guarantees no concurrent readers; visibility checks are
    /// skipped, identity/epoch validation still runs.
    Exclusive,
}

/// Deletes superseded column generations once no reader can see them.
///
/// One instance serves one worker: the path buffer, snapshot buffers and the
/// cached completion-log handle are reused across tasks without locking.
/// Concurrent purging of different tables takes one instance each.
pub struct ColumnPurger {
    db_root: PathBuf,
    scoreboards: Arc<ScoreboardRegistry>,
    clock: Arc<dyn SystemClock>,
    stats: Arc<PurgeStats>,
    fp_registry: Arc<FailPointRegistry>,
    path: PathBuilder,
    root_len: usize,
    table_len: usize,
    snapshot: TxnSnapshot,
    completed_row_ids: Vec<u64>,
    completion: Option<CompletionLog>,
    completion_column: String,
}

impl ColumnPurger {
    pub fn new(
        settings: &Settings,
        scoreboards: Arc<ScoreboardRegistry>,
        stat_registry: Arc<StatRegistry>,
        clock: Arc<dyn SystemClock>,
    ) -> Self {
        Self::new_with_fp_registry(
            settings,
            scoreboards,
            stat_registry,
            clock,
            Arc::new(FailPointRegistry::new()),
        )
    }

    pub fn new_with_fp_registry(
        settings: &Settings,
        scoreboards: Arc<ScoreboardRegistry>,
        stat_registry: Arc<StatRegistry>,
        clock: Arc<dyn SystemClock>,
        fp_registry: Arc<FailPointRegistry>,
    ) -> Self {
        let path = PathBuilder::new(&settings.db_root);
        let root_len = path.len();
        Self {
            db_root: settings.db_root.clone(),
            scoreboards,
            clock,
            stats: Arc::new(PurgeStats::new(stat_registry)),
            fp_registry,
            path,
            root_len,
            table_len: root_len,
            snapshot: TxnSnapshot::new(),
            completed_row_ids: Vec::new(),
            completion: None,
            completion_column: settings.column_purge_options.completion_column.clone(),
        }
    }

    /// Attaches the purge-log table so that completed rows get their
    /// completion timestamp stamped at the end of each [`purge`] run.
    ///
    /// [`purge`]: ColumnPurger::purge
    pub fn with_completion_log(mut self, log: PurgeLogTable) -> Self {
        self.completion = Some(CompletionLog::new(
            self.db_root.clone(),
            log,
            self.completion_column.clone(),
        ));
        self
    }

    /// Processes a purge task with the purger's own scoreboard handle and
    /// transaction snapshot, then records completion for every row resolved
    /// in this run.
    ///
    /// Returns `true` when every entry reached a terminal state. `false`
    /// asks the caller to re-submit the task later; rows that did resolve are
    /// already recorded and will short-circuit on the next run.
    pub fn purge(&mut self, task: &ColumnPurgeTask) -> bool {
        let done = match self.purge0(task, ScoreboardMode::Internal) {
            Ok(done) => done,
            Err(e) => {
                error!(
                    "could not purge [table={}, error={}]",
                    task.table().dir_name(),
                    e
                );
                self.stats.tasks_retried.inc();
                return false;
            }
        };
        let now_micros = system_time_to_micros(self.clock.now());
        if let Some(completion) = self.completion.as_mut() {
            completion.mark_completed(&self.completed_row_ids, now_micros);
        }
        if done {
            self.stats.tasks_completed.inc();
        } else {
            self.stats.tasks_retried.inc();
        }
        done
    }

    /// Processes a purge task piggybacked on an already-open reader. The
    /// reader's snapshot and scoreboard are borrowed for the run and left
    /// untouched; completion rows are not stamped here.
    pub fn purge_with_reader(
        &mut self,
        task: &ColumnPurgeTask,
        snapshot: &TxnSnapshot,
        scoreboard: &TxnScoreboard,
    ) -> bool {
        match self.purge0(
            task,
            ScoreboardMode::External {
                snapshot,
                scoreboard,
            },
        ) {
            Ok(done) => {
                if done {
                    self.stats.tasks_completed.inc();
                } else {
                    self.stats.tasks_retried.inc();
                }
                done
            }
            Err(e) => {
                error!(
                    "could not purge [table={}, error={}]",
                    task.table().dir_name(),
                    e
                );
                self.stats.tasks_retried.inc();
                false
            }
        }
    }

    /// Processes a purge task for a caller that owns the table exclusively,
    /// e.g. during a maintenance operation. Best effort: visibility checks
    /// are skipped, failures are logged and the task is simply dropped.
    pub fn purge_exclusive(&mut self, task: &ColumnPurgeTask) {
        if let Err(e) = self.purge0(task, ScoreboardMode::Exclusive) {
            error!(
                "could not purge [table={}, error={}]",
                task.table().dir_name(),
                e
            );
        }
    }

    fn purge0(&mut self, task: &ColumnPurgeTask, mode: ScoreboardMode<'_>) -> Result<bool, SiltDbError> {
        self.set_table_path(task);
        self.completed_row_ids.clear();

        let mut scoreboard: Option<Arc<TxnScoreboard>> = None;
        let mut min_unlocked_floor = i64::MAX;
        let mut all_done = true;
        let mut needs_validation = !matches!(mode, ScoreboardMode::External { .. });

        let column_name = task.column_name();
        let rogue = task.column_type().is_none();

        for entry in task.entries() {
            let symbol_root = (task.column_type().is_some_and(ColumnType::is_symbol) || rogue)
                && entry.partition_timestamp == TABLE_ROOT_PARTITION;

            let mut partition_len = self.set_primary_path(task, entry, symbol_root);

            // Existence short-circuit: nothing left on disk means an earlier
            // run (possibly crashed after deleting) already handled this
            // generation. A rogue type never short-circuits; with the
            // metadata gone there is no telling which families to probe.
            if !self.path.as_std().exists() && !rogue {
                match task.column_type() {
                    Some(t) if t.is_var_size() => {
                        self.path.trim_to(partition_len);
                        paths::index_file(&mut self.path, column_name, entry.column_generation);
                        if !self.path.as_std().exists() {
                            self.completed_row_ids.push(entry.log_row_id);
                            continue;
                        }
                    }
                    Some(t) if t.is_symbol() => {
                        // key/value files can outlive the rest, e.g. after an
                        // index drop; probe all three before declaring done.
                        self.path.trim_to(partition_len);
                        paths::dict_offsets_file(
                            &mut self.path,
                            column_name,
                            entry.column_generation,
                        );
                        if !self.path.as_std().exists() {
                            self.path.trim_to(partition_len);
                            paths::index_key_file(
                                &mut self.path,
                                column_name,
                                entry.column_generation,
                            );
                            if !self.path.as_std().exists() {
                                self.path.trim_to(partition_len);
                                paths::index_value_file(
                                    &mut self.path,
                                    column_name,
                                    entry.column_generation,
                                );
                                if !self.path.as_std().exists() {
                                    self.completed_row_ids.push(entry.log_row_id);
                                    continue;
                                }
                            }
                        }
                    }
                    _ => {
                        self.completed_row_ids.push(entry.log_row_id);
                        continue;
                    }
                }
            }

            if needs_validation {
                // Validated lazily: the files, or the entire table, may be
                // gone already, and a dropped table must not fail entries
                // whose files a previous run removed.
                if matches!(mode, ScoreboardMode::Internal) && scoreboard.is_none() {
                    scoreboard = Some(self.scoreboards.scoreboard(task.table()));
                }
                if !self.validate_table_state(task)? {
                    self.completed_row_ids.push(entry.log_row_id);
                    self.stats.entries_orphaned.inc();
                    continue;
                }
                // validation reused the path buffer; re-derive this entry
                partition_len = self.set_primary_path(task, entry, symbol_root);
                needs_validation = false;
            }

            let read_only = match mode {
                ScoreboardMode::External { snapshot, .. } => {
                    snapshot.is_partition_read_only(entry.partition_timestamp)
                }
                _ => self.snapshot.is_partition_read_only(entry.partition_timestamp),
            };
            if read_only {
                info!(
                    "skipping purge of read-only partition [path={}, column={}]",
                    self.path, column_name
                );
                self.completed_row_ids.push(entry.log_row_id);
                self.stats.entries_skipped_read_only.inc();
                continue;
            }

            // Generations at or above a floor that already checked out clean
            // don't need another scoreboard query: their visibility range is
            // contained in the one proven reader-free.
            if entry.column_generation < min_unlocked_floor {
                let still_in_use = match mode {
                    ScoreboardMode::Exclusive => false,
                    ScoreboardMode::External { scoreboard, .. } => {
                        generation_in_use(scoreboard, entry.column_generation, task)
                    }
                    ScoreboardMode::Internal => {
                        let scoreboard = scoreboard
                            .as_deref()
                            .expect("scoreboard acquired during validation");
                        generation_in_use(scoreboard, entry.column_generation, task)
                    }
                };
                if still_in_use {
                    all_done = false;
                    debug!(
                        "cannot purge, generation still visible to a reader [path={}]",
                        self.path
                    );
                    continue;
                }
                min_unlocked_floor = entry.column_generation;
            }

            info!("purging [path={}]", self.path);

            if self.could_not_remove() {
                all_done = false;
                continue;
            }

            if task.column_type().is_some_and(ColumnType::is_var_size) || rogue {
                self.path.trim_to(partition_len);
                paths::index_file(&mut self.path, column_name, entry.column_generation);
                if self.could_not_remove() {
                    all_done = false;
                    continue;
                }
            }

            if task.column_type().is_some_and(ColumnType::is_symbol) || rogue {
                if symbol_root {
                    self.path.trim_to(partition_len);
                    paths::dict_entries_file(&mut self.path, column_name, entry.column_generation);
                    if self.could_not_remove() {
                        all_done = false;
                        continue;
                    }
                    self.path.trim_to(partition_len);
                    paths::dict_offsets_file(&mut self.path, column_name, entry.column_generation);
                    if self.could_not_remove() {
                        all_done = false;
                        continue;
                    }
                }
                self.path.trim_to(partition_len);
                paths::index_key_file(&mut self.path, column_name, entry.column_generation);
                if self.could_not_remove() {
                    all_done = false;
                    continue;
                }
                self.path.trim_to(partition_len);
                paths::index_value_file(&mut self.path, column_name, entry.column_generation);
                if self.could_not_remove() {
                    all_done = false;
                    continue;
                }
            }

            self.completed_row_ids.push(entry.log_row_id);
        }

        self.stats
            .unresolved_entries
            .set((task.entries().len() - self.completed_row_ids.len()) as i64);
        Ok(all_done)
    }

    /// Checks that the table on disk is still the one the task was produced
    /// against: same table id (a recreated table gets a new one) and same
    /// truncate version (a truncate shifts row offsets under the task's
    /// feet). Loads the purger's own `_txn` snapshot as a side effect.
    fn validate_table_state(&mut self, task: &ColumnPurgeTask) -> Result<bool, SiltDbError> {
        self.path.trim_to(self.table_len);
        self.path.push_name(table_meta::META_FILE_NAME);
        let table_id = table_meta::read_table_id(self.path.as_std());
        if table_id != task.table().table_id() {
            self.path.trim_to(self.table_len);
            info!("cannot purge orphan table [path={}]", self.path);
            return Ok(false);
        }

        self.path.trim_to(self.table_len);
        self.path.push_name(TXN_FILE_NAME);
        self.snapshot.load(self.path.as_std())?;
        if self.snapshot.truncate_version() != task.truncate_version() {
            self.path.trim_to(self.table_len);
            info!(
                "cannot purge, purge request overlaps with truncate [path={}]",
                self.path
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn set_table_path(&mut self, task: &ColumnPurgeTask) {
        self.path.trim_to(self.root_len);
        self.path.push_name(task.table().dir_name());
        self.table_len = self.path.len();
    }

    /// Points the path buffer at the entry's primary file and returns the
    /// length of the enclosing directory prefix, to trim back to for
    /// companion files.
    fn set_primary_path(
        &mut self,
        task: &ColumnPurgeTask,
        entry: &PurgeEntry,
        symbol_root: bool,
    ) -> usize {
        self.path.trim_to(self.table_len);
        if symbol_root {
            let partition_len = self.path.len();
            paths::dict_entries_file(&mut self.path, task.column_name(), entry.column_generation);
            partition_len
        } else {
            paths::partition_dir(
                &mut self.path,
                task.partition_by(),
                entry.partition_timestamp,
                entry.partition_name_txn,
            );
            let partition_len = self.path.len();
            paths::data_file(&mut self.path, task.column_name(), entry.column_generation);
            partition_len
        }
    }

    /// Removes the file the path buffer points at. Reports `true` only when
    /// the file is still there afterwards; a target already removed by
    /// someone else is as good as removed by us.
    fn could_not_remove(&self) -> bool {
        let path = self.path.as_std();
        match remove_file(&self.fp_registry, path) {
            Ok(()) => {
                self.stats.files_deleted.inc();
                false
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                if path.exists() {
                    info!("cannot delete file, will retry [path={}, error={}]", self.path, e);
                    true
                } else {
                    false
                }
            }
        }
    }
}

fn remove_file(fp_registry: &Arc<FailPointRegistry>, path: &Path) -> io::Result<()> {
    fail_point!(
        Arc::clone(fp_registry),
        "purge-remove-file",
        |payload: Option<String>| {
            match payload {
                Some(fragment) if !path.to_string_lossy().contains(fragment.as_str()) => {
                    fs::remove_file(path)
                }
                _ => Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "purge-remove-file failpoint",
                )),
            }
        }
    );
    fs::remove_file(path)
}

/// A generation is still in use while any reader transaction in
/// `(generation, update_txn]` is outstanding: such a reader opened after the
/// generation was written and before it was superseded, so it may still be
/// reading these files. A scoreboard failure counts as in-use: an unhealthy
/// scoreboard must never unlock deletion; the task is re-run instead.
fn generation_in_use(scoreboard: &TxnScoreboard, generation: i64, task: &ColumnPurgeTask) -> bool {
    match scoreboard.is_range_available(generation + 1, task.update_txn()) {
        Ok(available) => !available,
        Err(e) => {
            error!(
                "cannot check reader range in scoreboard, column purge will re-run [table={}, txn={}, error={}]",
                task.table().dir_name(),
                task.update_txn(),
                e
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DefaultSystemClock;
    use crate::txn_file::{self, TxnPartition};
    use crate::types::{PartitionBy, TableToken};
    use std::path::PathBuf;

    struct Fixture {
        _tmp: tempfile::TempDir,
        settings: Settings,
        scoreboards: Arc<ScoreboardRegistry>,
        fp_registry: Arc<FailPointRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let settings = Settings {
                db_root: tmp.path().join("db"),
                ..Settings::default()
            };
            fs::create_dir_all(&settings.db_root).unwrap();
            let fp_registry = Arc::new(FailPointRegistry::new());
            let scoreboards = Arc::new(ScoreboardRegistry::new_with_fp_registry(
                settings.scoreboard_capacity,
                Arc::clone(&fp_registry),
            ));
            Self {
                _tmp: tmp,
                settings,
                scoreboards,
                fp_registry,
            }
        }

        fn purger(&self) -> ColumnPurger {
            ColumnPurger::new_with_fp_registry(
                &self.settings,
                Arc::clone(&self.scoreboards),
                Arc::new(StatRegistry::new()),
                Arc::new(DefaultSystemClock::new()),
                Arc::clone(&self.fp_registry),
            )
        }

        fn create_table(
            &self,
            name: &str,
            table_id: u32,
            truncate_version: i64,
            partitions: &[TxnPartition],
        ) -> TableToken {
            let dir = self.settings.db_root.join(name);
            fs::create_dir_all(&dir).unwrap();
            table_meta::write_table_meta(&dir, table_id, PartitionBy::Day).unwrap();
            txn_file::write_txn_file(&dir, 100, truncate_version, partitions).unwrap();
            TableToken::new(name, table_id)
        }

        fn file(
            &self,
            token: &TableToken,
            partition_timestamp: i64,
            name_txn: i64,
            build: impl FnOnce(&mut PathBuilder),
        ) -> PathBuf {
            let mut path = PathBuilder::new(&self.settings.db_root);
            path.push_name(token.dir_name());
            if partition_timestamp != TABLE_ROOT_PARTITION {
                paths::partition_dir(&mut path, PartitionBy::Day, partition_timestamp, name_txn);
            }
            build(&mut path);
            PathBuf::from(path.to_string())
        }

        fn touch(&self, path: &PathBuf) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
    }

    const TS: i64 = 1_700_000_000_000_000;

    fn partition(read_only: bool) -> TxnPartition {
        TxnPartition {
            timestamp: TS,
            name_txn: -1,
            row_count: 100,
            read_only,
        }
    }

    fn task(
        token: &TableToken,
        column_type: Option<ColumnType>,
        truncate_version: i64,
        update_txn: i64,
    ) -> ColumnPurgeTask {
        ColumnPurgeTask::new(
            token.clone(),
            PartitionBy::Day,
            truncate_version,
            "price",
            column_type,
            update_txn,
            vec![PurgeEntry {
                column_generation: 3,
                partition_timestamp: TS,
                partition_name_txn: -1,
                log_row_id: 0,
            }],
        )
    }

    #[test]
    fn test_completes_without_table_when_files_are_gone() {
        // no table directory at all: the short-circuit resolves the entry
        // before identity validation would have failed the run
        let fixture = Fixture::new();
        let token = TableToken::new("ghost", 9);
        let mut purger = fixture.purger();
        assert!(purger.purge(&task(&token, Some(ColumnType::Int), 0, 10)));
    }

    #[test]
    fn test_rogue_type_removes_every_family() {
        let fixture = Fixture::new();
        let token = fixture.create_table("trades", 1, 0, &[partition(false)]);
        let files = [
            fixture.file(&token, TS, -1, |p| paths::data_file(p, "price", 3)),
            fixture.file(&token, TS, -1, |p| paths::index_file(p, "price", 3)),
            fixture.file(&token, TS, -1, |p| paths::index_key_file(p, "price", 3)),
            fixture.file(&token, TS, -1, |p| paths::index_value_file(p, "price", 3)),
        ];
        for file in &files {
            fixture.touch(file);
        }

        let mut purger = fixture.purger();
        assert!(purger.purge(&task(&token, None, 0, 10)));
        for file in &files {
            assert!(!file.exists(), "{file:?} should be gone");
        }
    }

    #[test]
    fn test_read_only_partition_is_skipped() {
        let fixture = Fixture::new();
        let token = fixture.create_table("trades", 1, 0, &[partition(true)]);
        let data = fixture.file(&token, TS, -1, |p| paths::data_file(p, "price", 3));
        fixture.touch(&data);

        let mut purger = fixture.purger();
        assert!(purger.purge(&task(&token, Some(ColumnType::Int), 0, 10)));
        assert!(data.exists());
    }

    #[test]
    fn test_fixed_size_column_removes_only_data_file() {
        let fixture = Fixture::new();
        let token = fixture.create_table("trades", 1, 0, &[partition(false)]);
        let data = fixture.file(&token, TS, -1, |p| paths::data_file(p, "price", 3));
        let decoy = fixture.file(&token, TS, -1, |p| paths::index_file(p, "price", 3));
        fixture.touch(&data);
        fixture.touch(&decoy);

        let mut purger = fixture.purger();
        assert!(purger.purge(&task(&token, Some(ColumnType::Long), 0, 10)));
        assert!(!data.exists());
        // a fixed-size column has no index companion; the stray file stays
        assert!(decoy.exists());
    }
}
