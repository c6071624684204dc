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

//! Rewrites the API endpoint advertised in a kubeadm cluster's join
//! configuration.

use crate::domain::config::EngineConfig;
use crate::domain::model::K8sCluster;
use crate::infrastructure::command::CommandRunner;
use crate::infrastructure::constants::{
    CLUSTER_INFO_CONFIGMAP, CLUSTER_INFO_KUBECONFIG_KEY, KUBEADM_CLUSTER_CONFIGURATION_KEY,
    KUBEADM_CONFIGMAP, NAMESPACE_KUBE_PUBLIC, NAMESPACE_KUBE_SYSTEM,
};
use crate::infrastructure::kubernetes::applier::ClusterApplier;
use crate::infrastructure::kubernetes::kubectl::Kubectl;
use crate::shared::error::{FleetError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
#[cfg(test)]
use mockall::automock;
use serde_yaml::Value;
use std::path::Path;
use tracing::{info, warn};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApiEndpointEditor: Send + Sync {
    /// Points the cluster's bootstrap configuration at `new` instead of `old`.
    /// Idempotent.
    async fn update_api_endpoint(
        &self,
        cluster: &K8sCluster,
        old: &str,
        new: &str,
        work_dir: &Path,
    ) -> Result<()>;
}

/// Edits `kube-system/kubeadm-config` and `kube-public/cluster-info` with
/// kubectl, using the kubeconfig found in the working directory.
pub struct KubeadmEndpointEditor {
    runner: CommandRunner,
    config: EngineConfig,
}

impl KubeadmEndpointEditor {
    pub fn new(runner: CommandRunner, config: EngineConfig) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl ApiEndpointEditor for KubeadmEndpointEditor {
    async fn update_api_endpoint(
        &self,
        cluster: &K8sCluster,
        old: &str,
        new: &str,
        work_dir: &Path,
    ) -> Result<()> {
        let kubectl = Kubectl::new(self.runner.clone(), &self.config, work_dir, cluster.id());
        let changed = rewrite_endpoint(&kubectl, old, new).await?;
        info!(
            cluster = %cluster.id(),
            old,
            new,
            configmaps_changed = changed,
            "API endpoint updated"
        );
        Ok(())
    }
}

/// Applies the endpoint change through `applier`. Returns how many
/// ConfigMaps had to be rewritten.
pub async fn rewrite_endpoint(applier: &dyn ClusterApplier, old: &str, new: &str) -> Result<usize> {
    let mut changed = 0;

    let kubeadm = applier
        .get_configmap(NAMESPACE_KUBE_SYSTEM, KUBEADM_CONFIGMAP)
        .await?;
    if let Some(updated) = edit_data(kubeadm, KUBEADM_CLUSTER_CONFIGURATION_KEY, |doc| {
        rewrite_control_plane_endpoint(doc, old, new)
    })? {
        applier.apply_manifest(&updated).await?;
        changed += 1;
    }

    let cluster_info = applier
        .get_configmap(NAMESPACE_KUBE_PUBLIC, CLUSTER_INFO_CONFIGMAP)
        .await?;
    if let Some(updated) = edit_data(cluster_info, CLUSTER_INFO_KUBECONFIG_KEY, |doc| {
        rewrite_servers(doc, old, new)
    })? {
        applier.apply_manifest(&updated).await?;
        changed += 1;
    }

    Ok(changed)
}

/// Runs `edit` on the YAML document stored under `key`. Returns the ConfigMap
/// manifest to apply, or `None` when nothing changed.
fn edit_data<F>(mut configmap: ConfigMap, key: &str, edit: F) -> Result<Option<String>>
where
    F: FnOnce(&mut Value) -> bool,
{
    let name = configmap.metadata.name.clone().unwrap_or_default();
    let raw = configmap
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            FleetError::invalid_state(format!("ConfigMap {} has no '{}' entry", name, key))
        })?;

    let mut doc: Value = serde_yaml::from_str(raw)?;
    if !edit(&mut doc) {
        return Ok(None);
    }

    let rendered = serde_yaml::to_string(&doc)?;
    if let Some(data) = configmap.data.as_mut() {
        data.insert(key.to_string(), rendered);
    }
    configmap.metadata.managed_fields = None;
    configmap.metadata.resource_version = None;
    configmap.metadata.uid = None;
    configmap.metadata.creation_timestamp = None;

    Ok(Some(serde_yaml::to_string(&configmap)?))
}

fn rewrite_control_plane_endpoint(doc: &mut Value, old: &str, new: &str) -> bool {
    let Some(Value::String(endpoint)) = doc.get_mut("controlPlaneEndpoint") else {
        warn!("kubeadm ClusterConfiguration has no controlPlaneEndpoint");
        return false;
    };
    replace_in_place(endpoint, old, new, replace_host)
}

fn rewrite_servers(doc: &mut Value, old: &str, new: &str) -> bool {
    let Some(clusters) = doc.get_mut("clusters").and_then(Value::as_sequence_mut) else {
        return false;
    };

    let mut changed = false;
    for entry in clusters {
        if let Some(Value::String(server)) = entry
            .get_mut("cluster")
            .and_then(|cluster| cluster.get_mut("server"))
        {
            changed |= replace_in_place(server, old, new, replace_server_host);
        }
    }
    changed
}

fn replace_in_place(value: &mut String, old: &str, new: &str, rewrite: fn(&str, &str) -> String) -> bool {
    let current_host = host_of(value);
    if current_host == new {
        return false;
    }
    if current_host != old {
        warn!(endpoint = %value, expected = old, "endpoint host differs from the expected old host");
    }
    *value = rewrite(value, new);
    true
}

fn host_of(endpoint: &str) -> &str {
    let authority = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let authority = authority.split('/').next().unwrap_or(authority);
    split_host_port(authority).0
}

fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, Some(port))
        }
        _ => (authority, None),
    }
}

/// Replaces the host of `host[:port]`, keeping the port.
pub fn replace_host(endpoint: &str, host: &str) -> String {
    match split_host_port(endpoint) {
        (_, Some(port)) => format!("{}:{}", host, port),
        (_, None) => host.to_string(),
    }
}

/// Replaces the host of a `scheme://host[:port][/path]` URL.
pub fn replace_server_host(server: &str, host: &str) -> String {
    let Some((scheme, rest)) = server.split_once("://") else {
        return replace_host(server, host);
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    format!("{}://{}{}", scheme, replace_host(authority, host), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kubernetes::applier::MockClusterApplier;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn configmap(name: &str, key: &str, payload: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), payload.to_string())])),
            ..Default::default()
        }
    }

    fn kubeadm(endpoint: &str) -> ConfigMap {
        configmap(
            KUBEADM_CONFIGMAP,
            KUBEADM_CLUSTER_CONFIGURATION_KEY,
            &format!("apiVersion: kubeadm.k8s.io/v1beta3\ncontrolPlaneEndpoint: {endpoint}\n"),
        )
    }

    fn cluster_info(server: &str) -> ConfigMap {
        configmap(
            CLUSTER_INFO_CONFIGMAP,
            CLUSTER_INFO_KUBECONFIG_KEY,
            &format!("apiVersion: v1\nclusters:\n- name: ''\n  cluster:\n    server: {server}\n"),
        )
    }

    #[test]
    fn test_replace_host_keeps_port() {
        assert_eq!(replace_host("10.0.0.1:6443", "lb.example"), "lb.example:6443");
        assert_eq!(replace_host("10.0.0.1", "lb.example"), "lb.example");
        assert_eq!(
            replace_server_host("https://10.0.0.1:6443/base", "lb.example"),
            "https://lb.example:6443/base"
        );
        assert_eq!(host_of("https://lb.example:6443"), "lb.example");
    }

    #[tokio::test]
    async fn test_rewrite_endpoint_applies_both_configmaps() {
        let mut applier = MockClusterApplier::new();
        applier
            .expect_get_configmap()
            .withf(|ns, name| ns == NAMESPACE_KUBE_SYSTEM && name == KUBEADM_CONFIGMAP)
            .times(1)
            .returning(|_, _| Ok(kubeadm("10.0.0.1:6443")));
        applier
            .expect_get_configmap()
            .withf(|ns, name| ns == NAMESPACE_KUBE_PUBLIC && name == CLUSTER_INFO_CONFIGMAP)
            .times(1)
            .returning(|_, _| Ok(cluster_info("https://10.0.0.1:6443")));
        applier
            .expect_apply_manifest()
            .withf(|manifest| {
                manifest.contains("lb.example:6443")
                    && !manifest.contains("10.0.0.1")
                    && !manifest.contains("resourceVersion")
            })
            .times(2)
            .returning(|_| Ok(()));

        let changed = rewrite_endpoint(&applier, "10.0.0.1", "lb.example")
            .await
            .unwrap();
        assert_eq!(changed, 2);
    }

    #[tokio::test]
    async fn test_rewrite_endpoint_is_idempotent() {
        let mut applier = MockClusterApplier::new();
        applier
            .expect_get_configmap()
            .withf(|_, name| name == KUBEADM_CONFIGMAP)
            .returning(|_, _| Ok(kubeadm("lb.example:6443")));
        applier
            .expect_get_configmap()
            .withf(|_, name| name == CLUSTER_INFO_CONFIGMAP)
            .returning(|_, _| Ok(cluster_info("https://lb.example:6443")));
        applier.expect_apply_manifest().never();

        let changed = rewrite_endpoint(&applier, "10.0.0.1", "lb.example")
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_rewrite_endpoint_requires_configuration() {
        let mut applier = MockClusterApplier::new();
        applier
            .expect_get_configmap()
            .returning(|_, _| Ok(configmap(KUBEADM_CONFIGMAP, "other", "a: b")));

        let err = rewrite_endpoint(&applier, "a", "b").await.unwrap_err();
        assert!(matches!(err, FleetError::InvalidState(_)));
    }
}
