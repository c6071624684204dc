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

use crate::domain::config::EngineConfig;
use crate::domain::model::K8sCluster;
use crate::infrastructure::command::{CommandRunner, CommandSpec};
use crate::infrastructure::constants::KUBECONFIG_FILE_NAME;
use crate::infrastructure::kubernetes::applier::{
    ApplierProvider, ClusterApplier, ItemList, NodePatch,
};
use crate::shared::error::{FleetError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
use kube::config::Kubeconfig;
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

fn not_found_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Error from server \(NotFound\)").ok())
        .as_ref()
}

/// Whether `err` is kubectl reporting a missing object.
pub fn is_not_found(err: &FleetError) -> bool {
    match (err, not_found_pattern()) {
        (FleetError::CommandFailed { last_error, .. }, Some(pattern)) => {
            pattern.is_match(last_error)
        }
        _ => false,
    }
}

/// [`ClusterApplier`] that shells out to kubectl through the command runner.
#[derive(Clone)]
pub struct Kubectl {
    runner: CommandRunner,
    binary: String,
    kubeconfig: PathBuf,
    work_dir: PathBuf,
    label: String,
    retries: u32,
    command_timeout: Duration,
    cluster_timeout: Duration,
}

impl Kubectl {
    pub fn new(
        runner: CommandRunner,
        config: &EngineConfig,
        work_dir: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        let work_dir = work_dir.into();
        Self {
            runner,
            binary: config.kubectl_binary.clone(),
            kubeconfig: work_dir.join(KUBECONFIG_FILE_NAME),
            work_dir,
            label: label.into(),
            retries: config.kubectl_retries,
            command_timeout: config.command_timeout(),
            cluster_timeout: config.cluster_timeout(),
        }
    }

    pub fn kubeconfig_path(&self) -> &Path {
        &self.kubeconfig
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(&self.binary)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.display().to_string())
            .args(args)
            .work_dir(&self.work_dir)
    }

    /// Runs a read-only command; output is captured, not echoed.
    async fn query(&self, spec: CommandSpec) -> Result<String> {
        self.runner
            .run(&spec, self.retries, self.command_timeout)
            .await
    }

    /// Runs a mutating command with its output streamed under the cluster label.
    async fn mutate(&self, spec: CommandSpec, timeout: Duration) -> Result<String> {
        let spec = spec.label(format!("[{}]", self.label));
        self.runner.run(&spec, self.retries, timeout).await
    }
}

#[async_trait]
impl ClusterApplier for Kubectl {
    async fn get_nodes(&self) -> Result<Vec<Node>> {
        let output = self.query(self.command(["get", "nodes", "-o", "json"])).await?;
        let list: ItemList<Node> = serde_json::from_str(&output)?;
        Ok(list.items)
    }

    async fn taint_node(&self, node: &str, taint: &str) -> Result<()> {
        let spec = self.command(["taint", "nodes", node, taint, "--overwrite"]);
        self.mutate(spec, self.command_timeout)
            .await
            .map_err(|e| not_found_as(e, node))?;
        Ok(())
    }

    async fn cordon(&self, node: &str) -> Result<()> {
        self.mutate(self.command(["cordon", node]), self.command_timeout)
            .await
            .map_err(|e| not_found_as(e, node))?;
        Ok(())
    }

    async fn drain(&self, node: &str) -> Result<()> {
        let drain_timeout = format!("--timeout={}s", self.cluster_timeout.as_secs());
        let spec = self.command([
            "drain",
            node,
            "--ignore-daemonsets",
            "--delete-emptydir-data",
            "--force",
            drain_timeout.as_str(),
        ]);
        self.mutate(spec, self.cluster_timeout)
            .await
            .map_err(|e| not_found_as(e, node))?;
        Ok(())
    }

    async fn delete_node(&self, node: &str) -> Result<()> {
        let spec = self.command(["delete", "node", node, "--ignore-not-found"]);
        self.mutate(spec, self.command_timeout).await?;
        Ok(())
    }

    async fn patch_node(&self, node: &str, patch: &NodePatch) -> Result<()> {
        if !patch.labels.is_empty() || !patch.annotations.is_empty() {
            let body = json!({
                "metadata": {
                    "labels": patch.labels,
                    "annotations": patch.annotations,
                }
            });
            let spec = self.command([
                "patch".to_string(),
                "node".to_string(),
                node.to_string(),
                "--type".to_string(),
                "merge".to_string(),
                "-p".to_string(),
                body.to_string(),
            ]);
            self.mutate(spec, self.command_timeout)
                .await
                .map_err(|e| not_found_as(e, node))?;
        }

        for taint in &patch.taints {
            self.taint_node(node, &taint.to_kubectl()).await?;
        }
        Ok(())
    }

    async fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let spec = self.command(["get", "pods", "-n", namespace, "-l", selector, "-o", "json"]);
        let output = self.query(spec).await?;
        let list: ItemList<Pod> = serde_json::from_str(&output)?;
        Ok(list.items)
    }

    async fn exec(&self, namespace: &str, pod: &str, command: &[String]) -> Result<String> {
        let spec = self
            .command(["exec", "-n", namespace, pod, "--"])
            .args(command.iter().cloned());
        self.query(spec).await
    }

    async fn get_json(&self, resource: &str, namespace: &str) -> Result<String> {
        self.query(self.command(["get", resource, "-n", namespace, "-o", "json"]))
            .await
    }

    async fn delete_resource(&self, resource: &str, name: &str, namespace: &str) -> Result<()> {
        let spec = self.command(["delete", resource, name, "-n", namespace, "--ignore-not-found"]);
        self.mutate(spec, self.command_timeout).await?;
        Ok(())
    }

    async fn get_configmap(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        let spec = self.command(["get", "configmap", name, "-n", namespace, "-o", "json"]);
        let output = self.query(spec).await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        let spec = self.command(["apply", "-f", "-"]).stdin(manifest);
        self.mutate(spec, self.command_timeout).await?;
        Ok(())
    }
}

fn not_found_as(err: FleetError, node: &str) -> FleetError {
    if is_not_found(&err) {
        FleetError::NodeNotFound(node.to_string())
    } else {
        err
    }
}

/// Writes each cluster's kubeconfig under `<work_dir>/<cluster id>/` and hands
/// out a [`Kubectl`] bound to it.
pub struct KubectlProvider {
    runner: CommandRunner,
    config: EngineConfig,
}

impl KubectlProvider {
    pub fn new(runner: CommandRunner, config: EngineConfig) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl ApplierProvider for KubectlProvider {
    async fn connect(&self, cluster: &K8sCluster) -> Result<Arc<dyn ClusterApplier>> {
        if cluster.kubeconfig.trim().is_empty() {
            return Err(FleetError::invalid_state(format!(
                "cluster {} has no kubeconfig",
                cluster.id()
            )));
        }
        Kubeconfig::from_yaml(&cluster.kubeconfig).map_err(|e| {
            FleetError::config_error(format!("invalid kubeconfig for {}: {}", cluster.id(), e))
        })?;

        let dir = self.work_dir(cluster);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(KUBECONFIG_FILE_NAME), &cluster.kubeconfig).await?;
        debug!(cluster = %cluster.id(), dir = %dir.display(), "kubeconfig written");
        info!(cluster = %cluster.id(), "connected cluster applier");

        Ok(Arc::new(Kubectl::new(
            self.runner.clone(),
            &self.config,
            dir,
            cluster.id(),
        )))
    }

    fn work_dir(&self, cluster: &K8sCluster) -> PathBuf {
        self.config.work_dir.join(cluster.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::command::SpawnLimit;
    use std::os::unix::fs::PermissionsExt;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://10.0.0.1:6443
contexts:
- name: prod
  context:
    cluster: prod
    user: admin
current-context: prod
users:
- name: admin
  user:
    token: secret
"#;

    /// Writes an executable shell script standing in for kubectl.
    fn fake_kubectl(dir: &Path, body: &str) -> String {
        let path = dir.join("kubectl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn kubectl(dir: &Path, body: &str) -> Kubectl {
        let config = EngineConfig {
            kubectl_binary: fake_kubectl(dir, body),
            kubectl_retries: 0,
            ..Default::default()
        };
        let runner = CommandRunner::new(SpawnLimit::new(2))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1));
        Kubectl::new(runner, &config, dir, "prod-abc")
    }

    #[test]
    fn test_is_not_found() {
        let err = FleetError::CommandFailed {
            command: "kubectl cordon x".into(),
            attempts: 1,
            last_error: "exit status: 1: Error from server (NotFound): nodes \"x\" not found"
                .into(),
        };
        assert!(is_not_found(&err));
        assert!(matches!(not_found_as(err, "x"), FleetError::NodeNotFound(_)));
        assert!(!is_not_found(&FleetError::invalid_state("x")));
    }

    #[tokio::test]
    async fn test_get_nodes_parses_list() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = kubectl(
            dir.path(),
            r#"echo '{"kind":"List","items":[{"metadata":{"name":"prod-abc-m1"}}]}'"#,
        );
        let nodes = kubectl.get_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].metadata.name.as_deref(), Some("prod-abc-m1"));
    }

    #[tokio::test]
    async fn test_commands_carry_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = kubectl(dir.path(), r#"echo "$@""#);
        let output = kubectl
            .exec("kube-system", "etcd-0", &["etcdctl".to_string(), "version".to_string()])
            .await
            .unwrap();

        let expected = format!(
            "--kubeconfig {} exec -n kube-system etcd-0 -- etcdctl version",
            kubectl.kubeconfig_path().display()
        );
        assert_eq!(output.trim(), expected);
    }

    #[tokio::test]
    async fn test_cordon_maps_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = kubectl(
            dir.path(),
            r#"echo 'Error from server (NotFound): nodes "gone" not found' >&2; exit 1"#,
        );
        let err = kubectl.cordon("gone").await.unwrap_err();
        assert!(matches!(err, FleetError::NodeNotFound(name) if name == "gone"));
    }

    #[tokio::test]
    async fn test_apply_manifest_uses_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("applied.yaml");
        let kubectl = kubectl(dir.path(), &format!("cat > {}", captured.display()));

        kubectl.apply_manifest("kind: ConfigMap\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(captured).unwrap(), "kind: ConfigMap\n");
    }

    #[tokio::test]
    async fn test_provider_writes_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let provider = KubectlProvider::new(CommandRunner::new(SpawnLimit::new(1)), config);

        let mut cluster = crate::domain::model::cluster::fixtures::cluster();
        cluster.kubeconfig = KUBECONFIG.to_string();
        provider.connect(&cluster).await.unwrap();

        let written = dir.path().join("prod-abc").join(KUBECONFIG_FILE_NAME);
        assert_eq!(std::fs::read_to_string(written).unwrap(), KUBECONFIG);
    }

    #[tokio::test]
    async fn test_provider_rejects_missing_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let provider = KubectlProvider::new(CommandRunner::new(SpawnLimit::new(1)), config);

        let cluster = crate::domain::model::cluster::fixtures::cluster();
        let err = provider.connect(&cluster).await.err().unwrap();
        assert!(matches!(err, FleetError::InvalidState(_)));
    }
}
