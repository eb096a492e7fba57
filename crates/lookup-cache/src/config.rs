use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration of a [`LookupCache`](crate::LookupCache).
///
/// This can be built in code, or deserialized, for example from YAML:
///
/// ```yaml
/// name: users
/// max_entries: 10000
/// max_age: 5m
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The name of the cache, used in logs and as a metrics tag.
    pub name: String,

    /// The number of insertions after which the generations rotate.
    ///
    /// Roughly between `max_entries` and `2 * max_entries` results are kept in memory.
    /// A value of `0` disables storage altogether, leaving only the deduplication of concurrent
    /// requests. This needs to be provided.
    pub max_entries: Option<usize>,

    /// The time after which a fetched result, successful or not, is fetched anew.
    ///
    /// A value of `None` means results never expire.
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            max_entries: None,
            max_age: None,
        }
    }
}

/// The validated limits of a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Limits {
    pub max_entries: usize,
    pub max_age: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config holding up to `max_entries` results that never expire.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Default::default()
        }
    }

    /// Sets the maximum age of cached results.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets the name of the cache.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Loads the config from the YAML file at `path`, or returns the default config.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(CacheConfig::default()),
        }
    }

    /// Parses the config from YAML.
    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    pub(crate) fn validate(&self) -> Result<Limits, ConfigError> {
        let max_entries = self.max_entries.ok_or(ConfigError::InvalidMaxEntries)?;
        if self.max_age.is_some_and(|max_age| max_age.is_zero()) {
            return Err(ConfigError::InvalidMaxAge);
        }
        Ok(Limits {
            max_entries,
            max_age: self.max_age,
        })
    }
}
