//! # Configuration
//!
//! [`Settings`] carries the knobs a deployment can tweak. It can be built in
//! code, loaded from a JSON/TOML/YAML file, or merged from environment
//! variables with a prefix:
//!
//! ```toml
//! db_root = "/var/lib/siltdb/db"
//! scoreboard_capacity = 16384
//!
//! [column_purge_options]
//! completion_column = "completed"
//! ```
//!
//! Scheduling of purge runs is deliberately absent: the task producer owns
//! when tasks are built and submitted, so there are no intervals here.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

use crate::error::SiltDbError;

/// Engine settings consumed by the purge subsystem.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Root directory holding every table directory.
    pub db_root: PathBuf,

    /// Maximum number of distinct reader transactions a single table's
    /// scoreboard will track. Readers beyond this fail to open; the purger
    /// only queries and is unaffected by the limit.
    pub scoreboard_capacity: usize,

    /// Options for the column purge processor.
    pub column_purge_options: ColumnPurgeOptions,
}

/// Options for the column purge processor.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ColumnPurgeOptions {
    /// Name of the purge-log column that receives completion timestamps.
    pub completion_column: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_root: PathBuf::from("db"),
            scoreboard_capacity: 16_384,
            column_purge_options: ColumnPurgeOptions::default(),
        }
    }
}

impl Default for ColumnPurgeOptions {
    fn default() -> Self {
        Self {
            completion_column: "completed".to_string(),
        }
    }
}

impl Settings {
    /// Converts the settings to a JSON string representation.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Loads settings from a file. The format is determined by the
    /// extension: `.json`, `.toml`, `.yaml` or `.yml`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Settings, SiltDbError> {
        let path = path.as_ref();
        let Some(ext) = path.extension() else {
            return Err(SiltDbError::UnknownConfigurationFormat(path.into()));
        };

        let mut builder = Figment::from(Settings::default());
        match ext.to_str().unwrap_or_default() {
            "json" => builder = builder.merge(Json::file(path)),
            "toml" => builder = builder.merge(Toml::file(path)),
            "yaml" | "yml" => builder = builder.merge(Yaml::file(path)),
            _ => return Err(SiltDbError::UnknownConfigurationFormat(path.into())),
        }
        builder
            .extract()
            .map_err(|e| SiltDbError::InvalidConfigurationFormat(Box::new(e)))
    }

    /// Loads settings from environment variables with the given prefix, e.g.
    /// `SILTDB_DB_ROOT` for `db_root` when the prefix is `SILTDB_`.
    pub fn from_env(prefix: &str) -> Result<Settings, SiltDbError> {
        Figment::from(Settings::default())
            .merge(Env::prefixed(prefix))
            .extract()
            .map_err(|e| SiltDbError::InvalidConfigurationFormat(Box::new(e)))
    }

    /// Loads settings by merging, in order: defaults, `SiltDb.json`,
    /// `SiltDb.toml`, `SiltDb.yaml`/`SiltDb.yml`, then `SILTDB_`-prefixed
    /// environment variables. Later sources win.
    pub fn load() -> Result<Settings, SiltDbError> {
        Figment::from(Settings::default())
            .merge(Json::file("SiltDb.json"))
            .merge(Toml::file("SiltDb.toml"))
            .merge(Yaml::file("SiltDb.yaml"))
            .merge(Yaml::file("SiltDb.yml"))
            .admerge(Env::prefixed("SILTDB_"))
            .extract()
            .map_err(|e| SiltDbError::InvalidConfigurationFormat(Box::new(e)))
    }
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("SiltDb purge configuration")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(Settings::default()).data()
    }
}
