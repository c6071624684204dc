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

//! Longhorn replicas left behind on deleted nodes.

use crate::infrastructure::constants::REPLICA_STATE_STOPPED;
use crate::infrastructure::kubernetes::ItemList;
use crate::shared::error::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplicaSpec {
    #[serde(rename = "nodeID", default)]
    pub node_id: String,
    #[serde(rename = "failedAt", default)]
    pub failed_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplicaStatus {
    #[serde(rename = "currentState", default)]
    pub current_state: String,
    #[serde(default)]
    pub started: bool,
    #[serde(rename = "instanceManagerName", default)]
    pub instance_manager_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Replica {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ReplicaSpec,
    #[serde(default)]
    pub status: ReplicaStatus,
}

impl Replica {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// A replica pinned to `node` is safe to delete only when it is stopped,
    /// not started, owned by no instance manager and has failed. Anything
    /// else is presumed in use.
    pub fn is_orphaned_on(&self, node: &str) -> bool {
        self.spec.node_id == node
            && self.status.current_state == REPLICA_STATE_STOPPED
            && !self.status.started
            && self.status.instance_manager_name.is_empty()
            && !self.spec.failed_at.is_empty()
    }
}

pub fn parse_replicas(json: &str) -> Result<Vec<Replica>> {
    let list: ItemList<Replica> = serde_json::from_str(json)?;
    Ok(list.items)
}

pub fn orphaned_replicas<'a>(replicas: &'a [Replica], node: &str) -> Vec<&'a Replica> {
    replicas
        .iter()
        .filter(|r| r.is_orphaned_on(node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(name: &str, node: &str, state: &str, started: bool, im: &str, failed_at: &str) -> Replica {
        Replica {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: ReplicaSpec {
                node_id: node.to_string(),
                failed_at: failed_at.to_string(),
            },
            status: ReplicaStatus {
                current_state: state.to_string(),
                started,
                instance_manager_name: im.to_string(),
            },
        }
    }

    #[test]
    fn test_only_fully_orphaned_replicas_match() {
        let replicas = vec![
            replica("orphan", "w1", "stopped", false, "", "2025-01-01T00:00:00Z"),
            replica("running", "w1", "running", true, "im-1", ""),
            replica("started", "w1", "stopped", true, "", "2025-01-01T00:00:00Z"),
            replica("owned", "w1", "stopped", false, "im-1", "2025-01-01T00:00:00Z"),
            replica("healthy", "w1", "stopped", false, "", ""),
            replica("elsewhere", "w2", "stopped", false, "", "2025-01-01T00:00:00Z"),
        ];

        let names: Vec<_> = orphaned_replicas(&replicas, "w1")
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names, vec!["orphan"]);
    }

    #[test]
    fn test_parse_replicas() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "List",
            "items": [{
                "metadata": {"name": "pvc-1-r-0", "namespace": "longhorn-system"},
                "spec": {"nodeID": "w1", "failedAt": "2025-01-01T00:00:00Z", "volumeName": "pvc-1"},
                "status": {"currentState": "stopped", "started": false, "instanceManagerName": ""}
            }]
        }"#;
        let replicas = parse_replicas(json).unwrap();
        assert_eq!(replicas.len(), 1);
        assert!(replicas[0].is_orphaned_on("w1"));
    }
}
