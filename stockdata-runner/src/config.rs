//! Pipeline configuration, loaded from TOML.
//!
//! Every section has defaults, so an empty file (or `Config::default()`) is a
//! working configuration with the two built-in profiles:
//!
//! ```toml
//! date_scope = "latest"
//!
//! [pool]
//! max_workers = 32
//!
//! [storage]
//! backend = "sqlite"
//! database = "stockdata.db"
//!
//! [tables.intraday]
//! NSE = "nseintraday"
//! BSE = "bseintraday"
//!
//! [profiles.stream]
//! selection = { index_baskets = ["innifty200", "inniftymidcap100"] }
//! post_process = ["reduce_size"]
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stockdata_core::data::details::{DetailFields, DetailsError};
use stockdata_core::data::{
    validate_identifier, InvalidIdentifier, PostProcess, ProviderSettings, RegistryError,
    Selection,
};
use stockdata_core::domain::{Exchange, RequestWindow, UnknownExchange};
use thiserror::Error;

/// Name of the profile used when none is given.
pub const DEFAULT_PROFILE: &str = "intraday";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    UnknownExchange(#[from] UnknownExchange),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("no intraday table configured for {0}")]
    MissingTable(Exchange),

    #[error("profile '{profile}': {reason}")]
    InvalidSelection { profile: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which provider window a run's as-of date maps to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateScope {
    /// Always the provider's most recent one-day range; the date is informational.
    #[default]
    Latest,
    /// The exchange-local calendar day of the as-of date.
    AsOf,
}

impl DateScope {
    pub fn window(&self, as_of: NaiveDate, exchange: Exchange) -> RequestWindow {
        match self {
            DateScope::Latest => RequestWindow::MostRecent,
            DateScope::AsOf => RequestWindow::for_day(as_of, exchange),
        }
    }
}

/// Bounded fetch pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on concurrent provider requests.
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_workers: 32 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Sqlite,
    Parquet,
}

/// Where tables go. The symbol registry always lives in `database`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub database: PathBuf,
    pub parquet_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database: PathBuf::from("stockdata.db"),
            parquet_dir: PathBuf::from("data"),
        }
    }
}

/// Destination table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Exchange code (`NSE`, `BSE`) to intraday table name.
    pub intraday: BTreeMap<String, String>,
    pub details: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            intraday: Exchange::ALL
                .iter()
                .map(|e| (e.code().to_string(), format!("{}intraday", e.code().to_lowercase())))
                .collect(),
            details: "details".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailsConfig {
    /// Sectioned field list; the built-in list when absent.
    pub fields_file: Option<PathBuf>,
}

impl DetailsConfig {
    pub fn fields(&self) -> Result<DetailFields, DetailsError> {
        match &self.fields_file {
            Some(path) => DetailFields::from_file(path),
            None => Ok(DetailFields::builtin()),
        }
    }
}

/// One parameterization of the intraday pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub selection: Selection,
    #[serde(default)]
    pub post_process: Vec<PostProcess>,
    /// Overrides the exchange's intraday table.
    #[serde(default)]
    pub table: Option<String>,
}

/// Profiles every configuration starts with.
pub fn builtin_profiles() -> BTreeMap<String, Profile> {
    BTreeMap::from([
        (
            "intraday".to_string(),
            Profile {
                selection: Selection::Listed,
                post_process: Vec::new(),
                table: None,
            },
        ),
        (
            "stream".to_string(),
            Profile {
                selection: Selection::IndexBaskets(vec![
                    "innifty200".into(),
                    "inniftymidcap100".into(),
                    "inniftysmallcap100".into(),
                ]),
                post_process: vec![PostProcess::ReduceSize],
                table: None,
            },
        ),
    ])
}

/// Complete configuration for the `stockdata` tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub date_scope: DateScope,
    pub provider: ProviderSettings,
    pub pool: PoolConfig,
    pub storage: StorageConfig,
    pub tables: TableConfig,
    pub details: DetailsConfig,
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            date_scope: DateScope::default(),
            provider: ProviderSettings::default(),
            pool: PoolConfig::default(),
            storage: StorageConfig::default(),
            tables: TableConfig::default(),
            details: DetailsConfig::default(),
            profiles: builtin_profiles(),
        }
    }
}

impl Config {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    ///
    /// Built-in profiles are kept unless the file redefines them by name.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        for (name, profile) in builtin_profiles() {
            config.profiles.entry(name).or_insert(profile);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check everything a run relies on before any network traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid("pool.max_workers must be at least 1".into()));
        }

        for (code, table) in &self.tables.intraday {
            code.parse::<Exchange>()?;
            validate_identifier(table)?;
        }
        for exchange in Exchange::ALL {
            if !self.tables.intraday.contains_key(exchange.code()) {
                return Err(ConfigError::MissingTable(exchange));
            }
        }
        validate_identifier(&self.tables.details)?;

        for (name, profile) in &self.profiles {
            profile.selection.validate().map_err(|e| match e {
                RegistryError::InvalidIdentifier(id) => ConfigError::InvalidIdentifier(id),
                other => ConfigError::InvalidSelection {
                    profile: name.clone(),
                    reason: other.to_string(),
                },
            })?;
            if let Some(table) = &profile.table {
                validate_identifier(table)?;
            }
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Table a profile writes for `exchange`.
    pub fn table_for(&self, profile: &Profile, exchange: Exchange) -> Result<String, ConfigError> {
        let table = match &profile.table {
            Some(table) => table.clone(),
            None => self
                .tables
                .intraday
                .get(exchange.code())
                .cloned()
                .ok_or(ConfigError::MissingTable(exchange))?,
        };
        validate_identifier(&table)?;
        Ok(table)
    }
}
