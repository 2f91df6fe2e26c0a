use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[non_exhaustive]
#[derive(Clone, Debug, ThisError)]
pub enum SiltDbError {
    #[error("io error")]
    IoError(#[from] Arc<std::io::Error>),

    #[error("corrupt transaction file. path=`{path}`")]
    CorruptTxnFile { path: PathBuf },

    #[error("scoreboard capacity exceeded. txn=`{txn}`, capacity=`{capacity}`")]
    ScoreboardCapacityExceeded { txn: i64, capacity: usize },

    #[error("scoreboard range query failed. from_txn=`{from_txn}`, to_txn=`{to_txn}`")]
    ScoreboardQueryFailed { from_txn: i64, to_txn: i64 },

    #[error("purge log partition missing. partition_index=`{0}`")]
    PurgeLogPartitionMissing(usize),

    #[error("unknown configuration file format. path=`{0}`")]
    UnknownConfigurationFormat(PathBuf),

    #[error("invalid configuration format")]
    InvalidConfigurationFormat(#[from] Box<figment::Error>),
}

impl From<std::io::Error> for SiltDbError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(Arc::new(value))
    }
}
