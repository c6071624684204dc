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

use crate::domain::deletion::etcd::{
    find_member, member_list_command, member_remove_command, parse_member_list,
};
use crate::domain::deletion::longhorn::{orphaned_replicas, parse_replicas};
use crate::domain::deletion::node_info::NodeInfo;
use crate::domain::model::K8sCluster;
use crate::infrastructure::constants::{
    DEFAULT_WORKERS_LIMIT, ETCD_POD_SELECTOR, LONGHORN_REPLICA_RESOURCE, NAMESPACE_KUBE_SYSTEM,
    NAMESPACE_LONGHORN, TAINT_OUT_OF_SERVICE,
};
use crate::infrastructure::kubernetes::ClusterApplier;
use crate::infrastructure::reachability::Prober;
use crate::shared::error::{join_errors, Disposition, FleetError, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What a deletion run achieved.
#[derive(Debug, Default)]
pub struct DeletionOutcome {
    /// Full names of nodes that are gone from the cluster, including those
    /// that were already absent.
    pub removed: Vec<String>,
    pub error: Option<FleetError>,
}

#[derive(Default)]
struct Progress {
    removed: Vec<String>,
    errors: Vec<FleetError>,
}

impl Progress {
    /// Applies the failure policy of `err`. Fatal failures end the run and
    /// carry every error recorded so far.
    fn record(&mut self, err: FleetError) -> Result<()> {
        match err.disposition() {
            Disposition::Ignore => {
                warn!(error = %err, "ignoring best-effort failure");
                Ok(())
            }
            Disposition::Isolate => {
                error!(error = %err, "node step failed, continuing with the next node");
                self.errors.push(err);
                Ok(())
            }
            Disposition::Fatal => {
                error!(error = %err, "node deletion aborted");
                let mut errors = std::mem::take(&mut self.errors);
                errors.push(err);
                Err(FleetError::Joined(errors))
            }
        }
    }
}

/// Removes master and worker nodes from a live cluster without breaking etcd
/// quorum or dropping storage replicas that are still in use.
pub struct Deleter {
    masters: Vec<NodeInfo>,
    workers: Vec<NodeInfo>,
    /// Cluster-local name of a control node that is not being deleted.
    surviving_master: String,
    applier: Arc<dyn ClusterApplier>,
    prober: Prober,
    /// Workers pinged and cordoned at once.
    fan_out: usize,
}

impl Deleter {
    /// Fails with `InvalidState` when no control node would survive. Makes no
    /// calls against the cluster.
    pub fn new(
        cluster: &K8sCluster,
        masters: &[String],
        workers: &[String],
        applier: Arc<dyn ClusterApplier>,
        prober: Prober,
    ) -> Result<Self> {
        let doomed: HashSet<&str> = masters.iter().map(String::as_str).collect();
        let survivor = cluster
            .control_nodes()
            .find(|n| !doomed.contains(n.name.as_str()))
            .ok_or_else(|| {
                FleetError::invalid_state(format!(
                    "deleting {:?} would remove every control node of {}",
                    masters,
                    cluster.id()
                ))
            })?;

        let surviving_master = NodeInfo::resolve(cluster, &survivor.name).cluster_local_name;

        Ok(Self {
            masters: masters.iter().map(|m| NodeInfo::resolve(cluster, m)).collect(),
            workers: workers.iter().map(|w| NodeInfo::resolve(cluster, w)).collect(),
            surviving_master,
            applier,
            prober,
            fan_out: DEFAULT_WORKERS_LIMIT,
        })
    }

    pub fn with_fan_out(mut self, limit: usize) -> Self {
        self.fan_out = limit.max(1);
        self
    }

    pub fn surviving_master(&self) -> &str {
        &self.surviving_master
    }

    /// Deletes every requested node. Isolated failures are joined into the
    /// returned error.
    pub async fn delete_nodes(&self) -> Result<()> {
        match self.run().await.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Like [`Deleter::delete_nodes`] but also reports which nodes are gone,
    /// so a caller can commit partial progress.
    pub async fn run(&self) -> DeletionOutcome {
        let mut progress = Progress::default();

        let present: HashSet<String> = match self.applier.get_nodes().await {
            Ok(nodes) => nodes.into_iter().filter_map(|n| n.metadata.name).collect(),
            Err(e) => {
                return DeletionOutcome {
                    removed: Vec::new(),
                    error: Some(e),
                }
            }
        };

        let result = match self.delete_masters(&present, &mut progress).await {
            Ok(()) => self.delete_workers(&present, &mut progress).await,
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => join_errors(progress.errors),
            Err(fatal) => Some(fatal),
        };
        DeletionOutcome {
            removed: progress.removed,
            error,
        }
    }

    async fn delete_masters(&self, present: &HashSet<String>, progress: &mut Progress) -> Result<()> {
        for master in &self.masters {
            let name = master.cluster_local_name.as_str();
            if !present.contains(name) {
                info!(node = %name, "master not present in the cluster, skipping");
                progress.removed.push(master.full_name.clone());
                continue;
            }

            if let Err(e) = self.taint_if_unreachable(master).await {
                progress.record(e)?;
            }

            if let Err(e) = self.applier.cordon(name).await {
                if vanished(&e) {
                    progress.removed.push(master.full_name.clone());
                } else {
                    progress.record(FleetError::cordon(name, e))?;
                }
                continue;
            }

            if let Err(e) = self.applier.drain(name).await {
                if !vanished(&e) {
                    progress.record(FleetError::drain(name, e))?;
                }
            }

            if let Err(e) = self.remove_etcd_member(master).await {
                progress.record(e)?;
            }

            match self.applier.delete_node(name).await {
                Ok(()) => {
                    info!(node = %name, "master deleted");
                    progress.removed.push(master.full_name.clone());
                }
                Err(e) => progress.record(FleetError::node_delete(name, e))?,
            }
        }
        Ok(())
    }

    async fn delete_workers(&self, present: &HashSet<String>, progress: &mut Progress) -> Result<()> {
        let mut candidates = Vec::new();
        for worker in &self.workers {
            if present.contains(&worker.cluster_local_name) {
                candidates.push(worker);
            } else {
                info!(node = %worker.cluster_local_name, "worker not present in the cluster, skipping");
                progress.removed.push(worker.full_name.clone());
            }
        }

        // Cordoning has no cross-node side effects.
        let cordon_futures: Vec<_> = candidates
            .into_iter()
            .map(|worker| async move {
                let taint = self.taint_if_unreachable(worker).await;
                let cordon = self.applier.cordon(&worker.cluster_local_name).await;
                (worker, taint, cordon)
            })
            .collect();
        let cordoned: Vec<_> = stream::iter(cordon_futures)
            .buffer_unordered(self.fan_out)
            .collect()
            .await;

        let mut ready = Vec::new();
        for (worker, taint, cordon) in cordoned {
            if let Err(e) = taint {
                progress.record(e)?;
            }
            match cordon {
                Ok(()) => ready.push(worker),
                Err(e) if vanished(&e) => progress.removed.push(worker.full_name.clone()),
                Err(e) => progress.record(FleetError::cordon(&worker.cluster_local_name, e))?,
            }
        }

        for worker in ready {
            let name = worker.cluster_local_name.as_str();

            if let Err(e) = self.applier.drain(name).await {
                if !vanished(&e) {
                    progress.record(FleetError::drain(name, e))?;
                }
            }

            match self.applier.delete_node(name).await {
                Ok(()) => {
                    info!(node = %name, "worker deleted");
                    progress.removed.push(worker.full_name.clone());
                }
                Err(e) => {
                    progress.record(FleetError::node_delete(name, e))?;
                    continue;
                }
            }

            if let Err(e) = self.cleanup_replicas(worker).await {
                progress.record(e)?;
            }
        }
        Ok(())
    }

    /// Pings the node and, when it does not answer, marks it out of service
    /// so its workloads are released without waiting for the kubelet.
    async fn taint_if_unreachable(&self, node: &NodeInfo) -> Result<()> {
        if node.public_endpoint.is_empty() {
            return Ok(());
        }
        if let Err(e) = self
            .prober
            .ping(&node.public_endpoint, self.prober.count())
            .await
        {
            warn!(node = %node.cluster_local_name, error = %e, "node unreachable, tainting out of service");
            self.applier
                .taint_node(&node.cluster_local_name, TAINT_OUT_OF_SERVICE)
                .await
                .map_err(|e| FleetError::taint(&node.cluster_local_name, e))?;
        }
        Ok(())
    }

    async fn remove_etcd_member(&self, master: &NodeInfo) -> Result<()> {
        let node = master.cluster_local_name.as_str();
        let fail = |reason: String| FleetError::EtcdRemoval {
            node: node.to_string(),
            reason,
        };

        let pods = self
            .applier
            .get_pods(NAMESPACE_KUBE_SYSTEM, ETCD_POD_SELECTOR)
            .await
            .map_err(|e| fail(e.to_string()))?;

        let pod = pods
            .iter()
            .find(|p| {
                p.spec.as_ref().and_then(|s| s.node_name.as_deref())
                    == Some(self.surviving_master.as_str())
            })
            .and_then(|p| p.metadata.name.clone())
            .ok_or_else(|| fail(format!("no etcd pod on {}", self.surviving_master)))?;

        let listing = self
            .applier
            .exec(NAMESPACE_KUBE_SYSTEM, &pod, &member_list_command())
            .await
            .map_err(|e| fail(e.to_string()))?;
        let members = parse_member_list(&listing).map_err(|e| fail(e.to_string()))?;

        let Some(member) = find_member(&members, node) else {
            info!(node, "no etcd member with this name, already removed");
            return Ok(());
        };

        self.applier
            .exec(NAMESPACE_KUBE_SYSTEM, &pod, &member_remove_command(&member.id))
            .await
            .map_err(|e| fail(e.to_string()))?;
        info!(node, member = %member.id, "etcd member removed");
        Ok(())
    }

    async fn cleanup_replicas(&self, worker: &NodeInfo) -> Result<()> {
        let node = worker.cluster_local_name.as_str();
        let fail = |reason: String| FleetError::ReplicaCleanup {
            node: node.to_string(),
            reason,
        };

        let raw = self
            .applier
            .get_json(LONGHORN_REPLICA_RESOURCE, NAMESPACE_LONGHORN)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let replicas = parse_replicas(&raw).map_err(|e| fail(e.to_string()))?;

        let mut failures = Vec::new();
        for replica in orphaned_replicas(&replicas, node) {
            match self
                .applier
                .delete_resource(LONGHORN_REPLICA_RESOURCE, replica.name(), NAMESPACE_LONGHORN)
                .await
            {
                Ok(()) => info!(node, replica = replica.name(), "orphaned replica deleted"),
                Err(e) => failures.push(format!("{}: {}", replica.name(), e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(fail(failures.join("; ")))
        }
    }
}

/// The node disappeared after the initial listing.
fn vanished(err: &FleetError) -> bool {
    if let FleetError::NodeNotFound(node) = err {
        info!(node = %node, "node vanished during deletion, treating as removed");
        return true;
    }
    false
}
