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

use crate::domain::model::{K8sCluster, Taint};
use crate::shared::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Metadata and taints to converge on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.annotations.is_empty() && self.taints.is_empty()
    }
}

/// `items` of a Kubernetes list response, whatever its `kind`.
#[derive(Debug, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Idempotent operations against one live cluster. Every verb retries
/// internally and fails with a bounded-retry error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApplier: Send + Sync {
    async fn get_nodes(&self) -> Result<Vec<Node>>;

    /// `taint` is in `key[=value]:effect` form.
    async fn taint_node(&self, node: &str, taint: &str) -> Result<()>;

    async fn cordon(&self, node: &str) -> Result<()>;

    /// Evicts every pod except daemonset-managed ones; emptyDir data is discarded.
    async fn drain(&self, node: &str) -> Result<()>;

    async fn delete_node(&self, node: &str) -> Result<()>;

    async fn patch_node(&self, node: &str, patch: &NodePatch) -> Result<()>;

    async fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    async fn exec(&self, namespace: &str, pod: &str, command: &[String]) -> Result<String>;

    /// Raw JSON list of `resource` in `namespace`.
    async fn get_json(&self, resource: &str, namespace: &str) -> Result<String>;

    async fn delete_resource(&self, resource: &str, name: &str, namespace: &str) -> Result<()>;

    async fn get_configmap(&self, namespace: &str, name: &str) -> Result<ConfigMap>;

    async fn apply_manifest(&self, manifest: &str) -> Result<()>;
}

/// Connects a cluster snapshot to an applier for that cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplierProvider: Send + Sync {
    async fn connect(&self, cluster: &K8sCluster) -> Result<Arc<dyn ClusterApplier>>;

    /// Per-cluster working directory holding the kubeconfig written by `connect`.
    fn work_dir(&self, cluster: &K8sCluster) -> PathBuf;
}
