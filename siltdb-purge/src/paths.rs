//! Path construction for table, partition and column-generation files.
//!
//! Every column generation can leave several file families on disk:
//!
//! * `<col>.d[.<gen>]`: primary data, all types
//! * `<col>.i[.<gen>]`: row offsets, var-size types only
//! * `<col>.c[.<gen>]` / `<col>.o[.<gen>]`: symbol dictionary entries and
//!   offsets, rooted at the table directory
//! * `<col>.k[.<gen>]` / `<col>.v[.<gen>]`: bitmap index key and value
//!   files, per partition (or at table root for the dictionary's own index)
//!
//! The generation suffix is omitted for the base generation (`gen < 0`).
//!
//! File names are appended onto a [`PathBuilder`], a growable buffer with
//! explicit truncation so that the purge loop can re-derive many sibling
//! paths without reallocating. Callers trim back to the table or partition
//! length before requesting the next name.

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Datelike, Utc};

use crate::types::PartitionBy;

const DATA_FILE_EXT: &str = "d";
const INDEX_FILE_EXT: &str = "i";
const DICT_ENTRIES_FILE_EXT: &str = "c";
const DICT_OFFSETS_FILE_EXT: &str = "o";
const INDEX_KEY_FILE_EXT: &str = "k";
const INDEX_VALUE_FILE_EXT: &str = "v";

/// Directory name of non-partitioned tables' single partition.
const DEFAULT_PARTITION_NAME: &str = "default";

pub struct PathBuilder {
    buf: String,
}

impl PathBuilder {
    pub fn new(root: &Path) -> Self {
        let mut buf = root.to_string_lossy().into_owned();
        while buf.len() > 1 && buf.ends_with('/') {
            buf.pop();
        }
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Truncates the buffer back to a previously recorded length.
    pub fn trim_to(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Appends a path separator followed by `name`.
    pub fn push_name(&mut self, name: &str) {
        self.buf.push('/');
        self.buf.push_str(name);
    }

    pub fn as_std(&self) -> &Path {
        Path::new(&self.buf)
    }
}

impl fmt::Display for PathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Appends the directory of the partition holding `partition_timestamp`
/// (micros since epoch). Partitions that were rewritten out of place carry a
/// `.<name_txn>` suffix distinguishing them from earlier incarnations.
pub fn partition_dir(
    path: &mut PathBuilder,
    partition_by: PartitionBy,
    partition_timestamp: i64,
    name_txn: i64,
) {
    path.buf.push('/');
    let ts = DateTime::<Utc>::from_timestamp_micros(partition_timestamp)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    match partition_by {
        PartitionBy::None => path.buf.push_str(DEFAULT_PARTITION_NAME),
        PartitionBy::Hour => {
            let _ = write!(path.buf, "{}", ts.format("%Y-%m-%dT%H"));
        }
        PartitionBy::Day => {
            let _ = write!(path.buf, "{}", ts.format("%Y-%m-%d"));
        }
        PartitionBy::Week => {
            let week = ts.iso_week();
            let _ = write!(path.buf, "{:04}-W{:02}", week.year(), week.week());
        }
        PartitionBy::Month => {
            let _ = write!(path.buf, "{}", ts.format("%Y-%m"));
        }
        PartitionBy::Year => {
            let _ = write!(path.buf, "{}", ts.format("%Y"));
        }
    }
    if name_txn > -1 {
        let _ = write!(path.buf, ".{name_txn}");
    }
}

/// Primary data file, present for every column type.
pub fn data_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, DATA_FILE_EXT, generation);
}

/// Row-offset companion of a var-size column.
pub fn index_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, INDEX_FILE_EXT, generation);
}

/// Symbol dictionary entries, rooted at the table directory.
pub fn dict_entries_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, DICT_ENTRIES_FILE_EXT, generation);
}

/// Symbol dictionary entry offsets, rooted at the table directory.
pub fn dict_offsets_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, DICT_OFFSETS_FILE_EXT, generation);
}

/// Bitmap index key file of a symbol column.
pub fn index_key_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, INDEX_KEY_FILE_EXT, generation);
}

/// Bitmap index value file of a symbol column.
pub fn index_value_file(path: &mut PathBuilder, column: &str, generation: i64) {
    column_file(path, column, INDEX_VALUE_FILE_EXT, generation);
}

fn column_file(path: &mut PathBuilder, column: &str, ext: &str, generation: i64) {
    path.push_name(column);
    path.buf.push('.');
    path.buf.push_str(ext);
    if generation > -1 {
        let _ = write!(path.buf, ".{generation}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn micros(y: i32, mo: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0)
            .unwrap()
            .timestamp_micros()
    }

    #[rstest]
    #[case::by_none(PartitionBy::None, micros(2024, 3, 5, 13), -1, "default")]
    #[case::by_hour(PartitionBy::Hour, micros(2024, 3, 5, 13), -1, "2024-03-05T13")]
    #[case::by_day(PartitionBy::Day, micros(2024, 3, 5, 13), -1, "2024-03-05")]
    #[case::by_week(PartitionBy::Week, micros(2024, 1, 1, 0), -1, "2024-W01")]
    #[case::by_month(PartitionBy::Month, micros(2024, 3, 5, 13), -1, "2024-03")]
    #[case::by_year(PartitionBy::Year, micros(2024, 3, 5, 13), -1, "2024")]
    #[case::with_name_txn(PartitionBy::Day, micros(2024, 3, 5, 13), 4, "2024-03-05.4")]
    fn test_partition_dir_names(
        #[case] partition_by: PartitionBy,
        #[case] ts: i64,
        #[case] name_txn: i64,
        #[case] expected: &str,
    ) {
        let mut path = PathBuilder::new(Path::new("/db/trades"));
        partition_dir(&mut path, partition_by, ts, name_txn);
        assert_eq!(path.to_string(), format!("/db/trades/{expected}"));
    }

    #[test]
    fn test_column_file_names() {
        let mut path = PathBuilder::new(Path::new("/db/trades/2024-03-05"));
        let partition_len = path.len();

        data_file(&mut path, "price", 3);
        assert_eq!(path.to_string(), "/db/trades/2024-03-05/price.d.3");

        path.trim_to(partition_len);
        index_file(&mut path, "price", 3);
        assert_eq!(path.to_string(), "/db/trades/2024-03-05/price.i.3");

        path.trim_to(partition_len);
        index_key_file(&mut path, "price", 3);
        assert_eq!(path.to_string(), "/db/trades/2024-03-05/price.k.3");

        path.trim_to(partition_len);
        index_value_file(&mut path, "price", 3);
        assert_eq!(path.to_string(), "/db/trades/2024-03-05/price.v.3");
    }

    #[test]
    fn test_base_generation_has_no_suffix() {
        let mut path = PathBuilder::new(Path::new("/db/trades"));
        dict_entries_file(&mut path, "sym", -1);
        assert_eq!(path.to_string(), "/db/trades/sym.c");

        path.trim_to("/db/trades".len());
        dict_offsets_file(&mut path, "sym", 0);
        assert_eq!(path.to_string(), "/db/trades/sym.o.0");
    }

    #[test]
    fn test_trailing_separator_is_trimmed() {
        let path = PathBuilder::new(Path::new("/db/"));
        assert_eq!(path.to_string(), "/db");
    }
}
