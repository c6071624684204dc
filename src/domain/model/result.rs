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

use crate::domain::model::cluster::{K8sCluster, LoadBalancer};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// State change committed by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    #[default]
    None,
    /// Snapshots to merge into tracked state. `None` fields are left untouched.
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kubernetes: Option<K8sCluster>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        load_balancers: Option<Vec<LoadBalancer>>,
    },
    /// Ids of resources to drop from tracked state.
    Clear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kubernetes: Option<String>,
        #[serde(default)]
        load_balancers: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskErrorKind {
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub mutation: Mutation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResult {
    /// Merges snapshots into the pending update. Successive commits
    /// accumulate; a pending `Clear` is replaced.
    pub fn commit_update(
        &mut self,
        kubernetes: Option<K8sCluster>,
        load_balancers: Option<Vec<LoadBalancer>>,
    ) {
        match &mut self.mutation {
            Mutation::Update {
                kubernetes: pending_k8s,
                load_balancers: pending_lbs,
            } => {
                if kubernetes.is_some() {
                    *pending_k8s = kubernetes;
                }
                if load_balancers.is_some() {
                    *pending_lbs = load_balancers;
                }
            }
            other => {
                if matches!(other, Mutation::Clear { .. }) {
                    warn!("update commit replaces a pending clear");
                }
                *other = Mutation::Update {
                    kubernetes,
                    load_balancers,
                };
            }
        }
    }

    pub fn commit_clear(&mut self, kubernetes: Option<String>, load_balancers: Vec<String>) {
        match &mut self.mutation {
            Mutation::Clear {
                kubernetes: pending_k8s,
                load_balancers: pending_lbs,
            } => {
                if kubernetes.is_some() {
                    *pending_k8s = kubernetes;
                }
                for id in load_balancers {
                    if !pending_lbs.contains(&id) {
                        pending_lbs.push(id);
                    }
                }
            }
            other => {
                if matches!(other, Mutation::Update { .. }) {
                    warn!("clear commit replaces a pending update");
                }
                *other = Mutation::Clear {
                    kubernetes,
                    load_balancers,
                };
            }
        }
    }

    /// Pending cluster snapshot, if an update committed one.
    pub fn pending_cluster(&self) -> Option<&K8sCluster> {
        match &self.mutation {
            Mutation::Update {
                kubernetes: Some(k8s),
                ..
            } => Some(k8s),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == TaskErrorKind::Partial)
    }
}
