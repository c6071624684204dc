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

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

/// How a failure is treated by the code that observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Logged and swallowed; the state is already converged or the step is advisory.
    Ignore,
    /// Recorded against a single node; other nodes keep going.
    Isolate,
    /// Aborts the current operation and propagates to the pipeline.
    Fatal,
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("timed out after {timeout:?}: {operation}")]
    Timeout { operation: String, timeout: Duration },

    #[error("address {address} is unreachable: {lost}/{count} echo probes lost")]
    Unreachable {
        address: String,
        lost: usize,
        count: usize,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("command '{command}' failed after {attempts} attempt(s): {last_error}")]
    CommandFailed {
        command: String,
        attempts: u32,
        last_error: String,
    },

    #[error("partial failure: {0}")]
    Partial(String),

    #[error("node {0} not found in the cluster")]
    NodeNotFound(String),

    #[error("failed to taint node {node}: {source}")]
    Taint {
        node: String,
        #[source]
        source: Box<FleetError>,
    },

    #[error("failed to cordon node {node}: {source}")]
    Cordon {
        node: String,
        #[source]
        source: Box<FleetError>,
    },

    #[error("failed to drain node {node}: {source}")]
    Drain {
        node: String,
        #[source]
        source: Box<FleetError>,
    },

    #[error("failed to remove etcd member for {node}: {reason}")]
    EtcdRemoval { node: String, reason: String },

    #[error("failed to delete node object {node}: {source}")]
    NodeDelete {
        node: String,
        #[source]
        source: Box<FleetError>,
    },

    #[error("failed to clean up storage replicas of {node}: {reason}")]
    ReplicaCleanup { node: String, reason: String },

    #[error("cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", render_joined(.0))]
    Joined(Vec<FleetError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

fn render_joined(errors: &[FleetError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl FleetError {
    pub fn invalid_state(context: impl Into<String>) -> Self {
        Self::InvalidState(context.into())
    }

    pub fn config_error(context: impl Into<String>) -> Self {
        Self::Config(context.into())
    }

    pub fn taint(node: impl Into<String>, source: FleetError) -> Self {
        Self::Taint {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn cordon(node: impl Into<String>, source: FleetError) -> Self {
        Self::Cordon {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn drain(node: impl Into<String>, source: FleetError) -> Self {
        Self::Drain {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn node_delete(node: impl Into<String>, source: FleetError) -> Self {
        Self::NodeDelete {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Central failure policy: which failures are swallowed, which stay local
    /// to one node and which stop the current operation.
    pub fn disposition(&self) -> Disposition {
        match self {
            FleetError::NodeNotFound(_)
            | FleetError::Taint { .. }
            | FleetError::ReplicaCleanup { .. }
            | FleetError::Unreachable { .. } => Disposition::Ignore,
            FleetError::Cordon { .. } | FleetError::NodeDelete { .. } => Disposition::Isolate,
            FleetError::Joined(errors) => errors
                .iter()
                .map(FleetError::disposition)
                .max_by_key(|d| match d {
                    Disposition::Ignore => 0,
                    Disposition::Isolate => 1,
                    Disposition::Fatal => 2,
                })
                .unwrap_or(Disposition::Ignore),
            _ => Disposition::Fatal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FleetError::Timeout { .. })
    }
}

/// Folds a list of errors into one, `None` when the list is empty.
pub fn join_errors(mut errors: Vec<FleetError>) -> Option<FleetError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(FleetError::Joined(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_errors() {
        assert!(join_errors(Vec::new()).is_none());

        let single = join_errors(vec![FleetError::NodeNotFound("a".into())]).unwrap();
        assert!(matches!(single, FleetError::NodeNotFound(_)));

        let joined = join_errors(vec![
            FleetError::NodeNotFound("a".into()),
            FleetError::invalid_state("b"),
        ])
        .unwrap();
        let rendered = joined.to_string();
        assert!(rendered.contains("node a not found"));
        assert!(rendered.contains("invalid state: b"));
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn test_disposition() {
        let not_found = FleetError::NodeNotFound("n".into());
        assert_eq!(not_found.disposition(), Disposition::Ignore);

        let cordon = FleetError::cordon("n", FleetError::invalid_state("x"));
        assert_eq!(cordon.disposition(), Disposition::Isolate);

        let drain = FleetError::drain("n", FleetError::invalid_state("x"));
        assert_eq!(drain.disposition(), Disposition::Fatal);

        let mixed = FleetError::Joined(vec![
            FleetError::taint("n", FleetError::invalid_state("x")),
            FleetError::cordon("m", FleetError::invalid_state("y")),
        ]);
        assert_eq!(mixed.disposition(), Disposition::Isolate);
    }
}
