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

use crate::domain::model::cluster::{ClusterSnapshot, LbData, LoadBalancer};
use serde::{Deserialize, Serialize};

/// Typed difference carried by an `Update` task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateDelta {
    #[default]
    None,
    DeleteNodes {
        #[serde(default)]
        masters: Vec<String>,
        #[serde(default)]
        workers: Vec<String>,
    },
    LoadBalancers {
        transitions: Vec<LbData>,
        /// Set on the cluster's first reconciliation; nothing to migrate away from.
        #[serde(default)]
        first_run: bool,
        /// API-server load balancer recorded for this transition, if any.
        #[serde(default)]
        previous_api_endpoint: Option<LoadBalancer>,
    },
}

/// An action to perform on one cluster. Immutable input to a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    Create {
        desired: ClusterSnapshot,
    },
    Update {
        state: ClusterSnapshot,
        #[serde(default)]
        delta: UpdateDelta,
    },
    Delete {
        current: ClusterSnapshot,
    },
}

impl Task {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Task::Create { .. } => "create",
            Task::Update { .. } => "update",
            Task::Delete { .. } => "delete",
        }
    }

    /// The snapshot the task operates on.
    pub fn snapshot(&self) -> &ClusterSnapshot {
        match self {
            Task::Create { desired } => desired,
            Task::Update { state, .. } => state,
            Task::Delete { current } => current,
        }
    }

    pub fn cluster_id(&self) -> String {
        self.snapshot().kubernetes.id()
    }
}
