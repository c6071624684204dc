// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine configuration, built once at process start and passed down.

use crate::domain::config::dynamic::apply_overrides;
use crate::infrastructure::constants::*;
use crate::shared::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the reachability prober's worker pool. Zero disables probing.
    pub prober_workers: usize,
    /// Logical sub-tasks (e.g. per-node patches) in flight at once.
    pub workers_limit: usize,
    /// External processes running at once, system-wide.
    pub spawn_limit: usize,
    /// Deadline for a single subprocess attempt, in seconds.
    pub command_timeout_secs: u64,
    /// Deadline for long per-cluster operations such as a drain, in seconds.
    pub cluster_timeout_secs: u64,
    pub kubectl_retries: u32,
    /// Echo probes sent per address.
    pub ping_count: usize,
    pub work_dir: PathBuf,
    pub kubectl_binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prober_workers: DEFAULT_PROBE_WORKERS,
            workers_limit: DEFAULT_WORKERS_LIMIT,
            spawn_limit: DEFAULT_SPAWN_LIMIT,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            cluster_timeout_secs: DEFAULT_CLUSTER_TIMEOUT_SECS,
            kubectl_retries: DEFAULT_KUBECTL_RETRIES,
            ping_count: DEFAULT_PING_COUNT,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            kubectl_binary: DEFAULT_KUBECTL.to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the `FLEET_*` environment variables.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Same as [`EngineConfig::from_env`] but reads from an explicit map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mapping = [
            (ENV_PROBE_WORKERS, "prober-workers"),
            (ENV_WORKERS_LIMIT, "workers-limit"),
            (ENV_SPAWN_LIMIT, "spawn-limit"),
            (ENV_COMMAND_TIMEOUT, "command-timeout"),
            (ENV_CLUSTER_TIMEOUT, "cluster-timeout"),
            (ENV_KUBECTL_RETRIES, "kubectl-retries"),
            (ENV_PING_COUNT, "ping-count"),
            (ENV_WORK_DIR, "work-dir"),
            (ENV_KUBECTL, "kubectl"),
        ];

        let overrides: HashMap<String, String> = mapping
            .iter()
            .filter_map(|(env, key)| vars.get(*env).map(|v| (key.to_string(), v.clone())))
            .collect();

        let mut config = Self::default();
        apply_overrides(&overrides, &mut config);
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = read_to_string(path.as_ref()).map_err(|e| {
            FleetError::config_error(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spawn_limit == 0 {
            return Err(FleetError::config_error("spawn_limit must be > 0"));
        }
        if self.workers_limit == 0 {
            return Err(FleetError::config_error("workers_limit must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(FleetError::config_error("command_timeout_secs must be > 0"));
        }
        if self.cluster_timeout_secs == 0 {
            return Err(FleetError::config_error("cluster_timeout_secs must be > 0"));
        }
        if self.kubectl_binary.trim().is_empty() {
            return Err(FleetError::config_error("kubectl_binary must not be empty"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }
}
