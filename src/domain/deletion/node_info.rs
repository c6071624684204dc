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

use crate::domain::model::K8sCluster;

/// A node scheduled for deletion, reduced to the names and address the
/// deletion steps need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Name as tracked in the cluster snapshot, `<cluster id>-<name>`.
    pub full_name: String,
    /// Name of the node object inside the cluster.
    pub cluster_local_name: String,
    /// Empty when the snapshot has no address for the node.
    pub public_endpoint: String,
}

impl NodeInfo {
    pub fn resolve(cluster: &K8sCluster, full_name: &str) -> Self {
        let prefix = format!("{}-", cluster.id());
        let cluster_local_name = full_name
            .strip_prefix(&prefix)
            .unwrap_or(full_name)
            .to_string();
        let public_endpoint = cluster
            .find_node(full_name)
            .map(|n| n.public.clone())
            .unwrap_or_default();

        Self {
            full_name: full_name.to_string(),
            cluster_local_name,
            public_endpoint,
        }
    }
}
