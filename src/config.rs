// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Tunables of the controller process, loaded from a YAML file passed to `run`.
/// Missing fields take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Requeue delay after a successful reconcile; 0 waits for the next change instead.
    pub resync_period_secs: u64,
    pub requeue_delay_secs: u64,
    pub fatal_requeue_delay_secs: u64,
    /// Upper bound on each API call made by the store.
    pub api_timeout_secs: u64,
    pub watch_owned_resources: bool,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            resync_period_secs: 300,
            requeue_delay_secs: 10,
            fatal_requeue_delay_secs: 300,
            api_timeout_secs: 30,
            watch_owned_resources: true,
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml(yaml: &str) -> Result<ControllerConfig, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        if yaml.trim().is_empty() {
            return Ok(ControllerConfig::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<ControllerConfig, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ControllerConfig::from_yaml(&yaml)
    }

    pub fn resync_period(&self) -> Option<Duration> {
        match self.resync_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }

    pub fn fatal_requeue_delay(&self) -> Duration {
        Duration::from_secs(self.fatal_requeue_delay_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
