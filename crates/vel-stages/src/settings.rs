//! Runtime settings
//!
//! Loaded from an optional YAML file named by `VEL_CONFIG`, then overridden
//! by environment variables:
//!
//! | variable              | field             | default        |
//! |-----------------------|-------------------|----------------|
//! | `VEL_ADDR`            | `addr`            | `0.0.0.0:8787` |
//! | `VEL_STORE`           | `store`           | `memory`       |
//! | `VEL_READ_TIMEOUT_MS` | `read_timeout_ms` | `30000`        |
//! | `VEL_MAX_LIMIT`       | `max_limit`       | `100000`       |
//! | `VEL_FLOAT_TOLERANCE` | `compare.float_tolerance` | exact  |
//!
//! `VEL_STORE` is either `memory` or a directory used as a [`FileStore`] root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vel_core::{DatasetAccessor, FileStore, MemoryStore};
use vel_quality::{CompareOptions, Rule, RuleError, RuleSet};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("SETTINGS/cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SETTINGS/invalid YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("SETTINGS/{key}={value} is not valid: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Where table versions live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreSettings {
    #[default]
    Memory,
    Filesystem { root: PathBuf },
}

impl StoreSettings {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "memory" | "mem" => StoreSettings::Memory,
            root => StoreSettings::Filesystem {
                root: PathBuf::from(root),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub addr: String,
    pub store: StoreSettings,
    pub read_timeout_ms: u64,
    pub max_limit: u64,
    pub compare: CompareOptions,
    /// Replaces the default transcript rules when set.
    pub validator_rules: Option<Vec<Rule>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8787".to_string(),
            store: StoreSettings::Memory,
            read_timeout_ms: 30_000,
            max_limit: 100_000,
            compare: CompareOptions::default(),
            validator_rules: None,
        }
    }
}

impl Settings {
    /// Settings from `VEL_CONFIG` and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::load`] with an injectable environment.
    pub fn load_with<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup("VEL_CONFIG").filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(path.trim())?,
            None => Self::default(),
        };
        settings.apply_env(lookup)?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `VEL_*` overrides on top of the current values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("VEL_ADDR") {
            self.addr = addr.trim().to_string();
        }
        if let Some(store) = lookup("VEL_STORE") {
            self.store = StoreSettings::parse(&store);
        }
        if let Some(value) = lookup("VEL_READ_TIMEOUT_MS") {
            self.read_timeout_ms = parse_env("VEL_READ_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("VEL_MAX_LIMIT") {
            self.max_limit = parse_env("VEL_MAX_LIMIT", &value)?;
        }
        if let Some(value) = lookup("VEL_FLOAT_TOLERANCE") {
            let tolerance: f64 = parse_env("VEL_FLOAT_TOLERANCE", &value)?;
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(SettingsError::Env {
                    key: "VEL_FLOAT_TOLERANCE",
                    value,
                    reason: "must be a non-negative number".to_string(),
                });
            }
            self.compare.float_tolerance = Some(tolerance);
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Open the configured dataset accessor.
    pub fn open_store(&self) -> Arc<dyn DatasetAccessor> {
        match &self.store {
            StoreSettings::Memory => Arc::new(MemoryStore::new()),
            StoreSettings::Filesystem { root } => Arc::new(FileStore::new(root)),
        }
    }

    /// Validator rules: the configured list, or the transcript defaults.
    pub fn rule_set(&self) -> Result<RuleSet, SettingsError> {
        match &self.validator_rules {
            Some(rules) => Ok(RuleSet::new(rules.clone())?),
            None => Ok(RuleSet::transcript_defaults()),
        }
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| SettingsError::Env {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
