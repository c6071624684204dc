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

//! Cluster and load-balancer snapshots as handed over by the caller.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Master,
    Worker,
    /// Control node whose public address is advertised as the API server.
    ApiEndpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Full name, prefixed with the cluster id.
    pub name: String,
    #[serde(default)]
    pub public: String,
    #[serde(default)]
    pub private: String,
    pub node_type: NodeType,
}

impl Node {
    pub fn is_control(&self) -> bool {
        matches!(self.node_type, NodeType::Master | NodeType::ApiEndpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
}

impl Taint {
    /// `key[=value]:effect`, the form kubectl expects.
    pub fn to_kubectl(&self) -> String {
        match &self.value {
            Some(value) => format!("{}={}:{}", self.key, value, self.effect),
            None => format!("{}:{}", self.key, self.effect),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePool {
    pub name: String,
    #[serde(default)]
    pub is_control: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sCluster {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub nodepools: Vec<NodePool>,
}

impl K8sCluster {
    /// `name-hash`; also the prefix of every node name in the cluster.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.hash)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodepools.iter().flat_map(|np| np.nodes.iter())
    }

    pub fn control_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodepools
            .iter()
            .filter(|np| np.is_control)
            .flat_map(|np| np.nodes.iter())
    }

    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|n| n.name == name)
    }

    pub fn nodepool_of(&self, name: &str) -> Option<&NodePool> {
        self.nodepools
            .iter()
            .find(|np| np.nodes.iter().any(|n| n.name == name))
    }

    pub fn api_endpoint_node(&self) -> Option<&Node> {
        self.control_nodes()
            .find(|n| n.node_type == NodeType::ApiEndpoint)
    }

    pub fn api_endpoint_node_mut(&mut self) -> Option<&mut Node> {
        self.nodepools
            .iter_mut()
            .filter(|np| np.is_control)
            .flat_map(|np| np.nodes.iter_mut())
            .find(|n| n.node_type == NodeType::ApiEndpoint)
    }

    pub fn first_control_node_mut(&mut self) -> Option<&mut Node> {
        self.nodepools
            .iter_mut()
            .filter(|np| np.is_control)
            .flat_map(|np| np.nodes.iter_mut())
            .next()
    }

    /// Drops the named nodes. Worker nodepools left empty are dropped too;
    /// control nodepools are kept even when empty.
    pub fn remove_nodes(&mut self, names: &HashSet<String>) {
        for np in &mut self.nodepools {
            np.nodes.retain(|n| !names.contains(&n.name));
        }
        self.nodepools.retain(|np| np.is_control || !np.nodes.is_empty());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    ApiServer,
    Ingress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub target_port: u16,
    pub role_type: RoleType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub dns_endpoint: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Id of the Kubernetes cluster this load balancer fronts.
    pub target_cluster: String,
}

impl LoadBalancer {
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.hash)
    }

    pub fn has_api_role(&self) -> bool {
        self.roles.iter().any(|r| r.role_type == RoleType::ApiServer)
    }
}

/// A load balancer's current and desired spec. `None` means it did not exist
/// or should no longer exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbData {
    #[serde(default)]
    pub current: Option<LoadBalancer>,
    #[serde(default)]
    pub desired: Option<LoadBalancer>,
}

impl LbData {
    pub fn carries_api_role(&self) -> bool {
        self.current.as_ref().is_some_and(LoadBalancer::has_api_role)
            || self.desired.as_ref().is_some_and(LoadBalancer::has_api_role)
    }

    pub fn target_cluster(&self) -> Option<&str> {
        self.desired
            .as_ref()
            .or(self.current.as_ref())
            .map(|lb| lb.target_cluster.as_str())
    }

    pub fn id(&self) -> Option<String> {
        self.desired.as_ref().or(self.current.as_ref()).map(LoadBalancer::id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub kubernetes: K8sCluster,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn node(cluster: &str, name: &str, node_type: NodeType, public: &str) -> Node {
        Node {
            name: format!("{}-{}", cluster, name),
            public: public.to_string(),
            private: String::new(),
            node_type,
        }
    }

    pub fn pool(name: &str, is_control: bool, nodes: Vec<Node>) -> NodePool {
        NodePool {
            name: name.to_string(),
            is_control,
            nodes,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            taints: Vec::new(),
        }
    }

    /// `prod-abc` with masters m1 (api endpoint), m2 and workers w1, w2.
    pub fn cluster() -> K8sCluster {
        let id = "prod-abc";
        K8sCluster {
            name: "prod".into(),
            hash: "abc".into(),
            kubeconfig: String::new(),
            nodepools: vec![
                pool(
                    "control",
                    true,
                    vec![
                        node(id, "m1", NodeType::ApiEndpoint, "10.0.0.1"),
                        node(id, "m2", NodeType::Master, "10.0.0.2"),
                    ],
                ),
                pool(
                    "compute",
                    false,
                    vec![
                        node(id, "w1", NodeType::Worker, "10.0.1.1"),
                        node(id, "w2", NodeType::Worker, "10.0.1.2"),
                    ],
                ),
            ],
        }
    }

    pub fn lb(name: &str, endpoint: &str, api: bool) -> LoadBalancer {
        let role_type = if api {
            RoleType::ApiServer
        } else {
            RoleType::Ingress
        };
        LoadBalancer {
            name: name.to_string(),
            hash: "h".into(),
            dns_endpoint: endpoint.to_string(),
            roles: vec![Role {
                name: "role".into(),
                port: 6443,
                target_port: 6443,
                role_type,
            }],
            target_cluster: "prod-abc".into(),
        }
    }
}
