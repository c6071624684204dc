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

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    /// A failure stops the remaining stages.
    Fatal,
    /// A failure is recorded and the run continues.
    Warn,
}

/// Step kinds understood by the pipeline. Names the pipeline does not know
/// are kept as `Unknown` so they can be reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageKind {
    CheckReachability,
    DeleteNodes,
    ApiEndpointChange,
    PatchNodes,
    ClearState,
    Unknown(String),
}

impl StageKind {
    pub fn as_str(&self) -> &str {
        match self {
            StageKind::CheckReachability => "check_reachability",
            StageKind::DeleteNodes => "delete_nodes",
            StageKind::ApiEndpointChange => "api_endpoint_change",
            StageKind::PatchNodes => "patch_nodes",
            StageKind::ClearState => "clear_state",
            StageKind::Unknown(name) => name,
        }
    }
}

impl From<String> for StageKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "check_reachability" => StageKind::CheckReachability,
            "delete_nodes" => StageKind::DeleteNodes,
            "api_endpoint_change" => StageKind::ApiEndpointChange,
            "patch_nodes" => StageKind::PatchNodes,
            "clear_state" => StageKind::ClearState,
            _ => StageKind::Unknown(name),
        }
    }
}

impl From<StageKind> for String {
    fn from(kind: StageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub about: String,
    pub error_level: ErrorLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub description: Description,
}

impl Stage {
    pub fn new(kind: StageKind, about: impl Into<String>, error_level: ErrorLevel) -> Self {
        Self {
            kind,
            description: Description {
                about: about.into(),
                error_level,
            },
        }
    }

    pub fn fatal(kind: StageKind, about: impl Into<String>) -> Self {
        Self::new(kind, about, ErrorLevel::Fatal)
    }

    pub fn warn(kind: StageKind, about: impl Into<String>) -> Self {
        Self::new(kind, about, ErrorLevel::Warn)
    }

    pub fn error_level(&self) -> ErrorLevel {
        self.description.error_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_round_trips_unknown_names() {
        let stages: Vec<Stage> = serde_json::from_str(
            r#"[
                {"kind": "delete_nodes", "description": {"about": "remove", "error_level": "FATAL"}},
                {"kind": "reconcile_vpn", "description": {"error_level": "WARN"}}
            ]"#,
        )
        .unwrap();

        assert_eq!(stages[0].kind, StageKind::DeleteNodes);
        assert_eq!(stages[0].error_level(), ErrorLevel::Fatal);
        assert_eq!(stages[1].kind, StageKind::Unknown("reconcile_vpn".into()));

        let rendered = serde_json::to_string(&stages[1]).unwrap();
        assert!(rendered.contains("\"reconcile_vpn\""));
    }

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::PatchNodes.to_string(), "patch_nodes");
    }
}
