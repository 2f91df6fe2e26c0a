#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]

//! Column-version garbage collection for the SiltDB storage engine.
//!
//! SiltDB stores each column of a time-partitioned table in its own files.
//! Rewriting a column leaves the previous file generation on disk for readers
//! that still hold older transaction snapshots. This crate decides when such
//! a generation is invisible to every reader, deletes its files, and records
//! completion in the engine's purge log; see [`ColumnPurger`] for the entry
//! point.

/// Re-export the fail-parallel crate.
///
/// This is useful for users of the crate who want to exercise its failpoints
/// in their tests without having to depend on the fail-parallel crate
/// directly.
pub use fail_parallel;

pub use clock::{DefaultSystemClock, SystemClock};
pub use column_purge::stats as column_purge_stats;
pub use column_purge::ColumnPurger;
pub use config::{ColumnPurgeOptions, Settings};
pub use error::SiltDbError;
pub use purge_log::{PurgeLogPartition, PurgeLogTable};
pub use purge_task::{ColumnPurgeTask, PurgeEntry};
pub use scoreboard::{ScoreboardRegistry, TxnScoreboard};
pub use types::{ColumnType, PartitionBy, TableToken, TABLE_ROOT_PARTITION};

pub mod clock;
pub mod config;
pub mod paths;
pub mod stats;
pub mod table_meta;
pub mod txn_file;
pub mod types;

mod column_purge;
mod error;
mod purge_log;
mod purge_task;
mod scoreboard;
mod utils;
