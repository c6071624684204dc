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

//! Built-in stage handlers.

use crate::domain::config::EngineConfig;
use crate::domain::deletion::{Deleter, NodeInfo};
use crate::domain::endpoint::apply_transitions;
use crate::domain::model::{K8sCluster, LbData, LoadBalancer, StageKind, Task, UpdateDelta};
use crate::domain::pipeline::executor::{Pipeline, StageHandler};
use crate::domain::pipeline::tracker::Tracker;
use crate::infrastructure::kubernetes::{ApiEndpointEditor, ApplierProvider, NodePatch};
use crate::infrastructure::reachability::Prober;
use crate::shared::error::{join_errors, FleetError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by the built-in handlers.
#[derive(Clone)]
pub struct StageContext {
    pub config: EngineConfig,
    pub provider: Arc<dyn ApplierProvider>,
    pub editor: Arc<dyn ApiEndpointEditor>,
    pub prober: Prober,
}

impl Pipeline {
    /// Pipeline with every built-in stage registered.
    pub fn standard(ctx: StageContext) -> Self {
        let ctx = Arc::new(ctx);
        Pipeline::new()
            .register(
                StageKind::CheckReachability,
                Arc::new(CheckReachability { ctx: ctx.clone() }),
            )
            .register(StageKind::DeleteNodes, Arc::new(DeleteNodes { ctx: ctx.clone() }))
            .register(
                StageKind::ApiEndpointChange,
                Arc::new(ApiEndpointChange { ctx: ctx.clone() }),
            )
            .register(StageKind::PatchNodes, Arc::new(PatchNodes { ctx }))
            .register(StageKind::ClearState, Arc::new(ClearState))
    }
}

/// The cluster as already mutated by earlier stages of this run, or as
/// supplied by the task.
fn working_cluster(tracker: &Tracker<'_>, supplied: &K8sCluster) -> K8sCluster {
    tracker
        .result
        .pending_cluster()
        .cloned()
        .unwrap_or_else(|| supplied.clone())
}

pub struct CheckReachability {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl StageHandler for CheckReachability {
    async fn handle(&self, tracker: &mut Tracker<'_>) {
        let addresses: Vec<String> = tracker
            .task
            .snapshot()
            .kubernetes
            .nodes()
            .map(|n| n.public.clone())
            .filter(|address| !address.is_empty())
            .collect();

        let outcome = self
            .ctx
            .prober
            .probe_all(&addresses, self.ctx.config.prober_workers)
            .await;

        if !outcome.unreachable.is_empty() {
            warn!(unreachable = ?outcome.unreachable, "nodes failed the reachability check");
        }
        if let Some(err) = outcome.error {
            tracker.fail(err);
        }
    }
}

pub struct DeleteNodes {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl StageHandler for DeleteNodes {
    async fn handle(&self, tracker: &mut Tracker<'_>) {
        let Task::Update {
            state,
            delta: UpdateDelta::DeleteNodes { masters, workers },
        } = tracker.task
        else {
            debug!("task carries no node deletions");
            return;
        };
        if masters.is_empty() && workers.is_empty() {
            return;
        }

        let applier = match self.ctx.provider.connect(&state.kubernetes).await {
            Ok(applier) => applier,
            Err(e) => return tracker.fail(e),
        };
        let prober = self.ctx.prober.clone();
        let deleter = match Deleter::new(&state.kubernetes, masters, workers, applier, prober) {
            Ok(deleter) => deleter.with_fan_out(self.ctx.config.workers_limit),
            Err(e) => return tracker.fail(e),
        };

        let outcome = deleter.run().await;
        if !outcome.removed.is_empty() {
            let mut cluster = working_cluster(tracker, &state.kubernetes);
            let removed: HashSet<String> = outcome.removed.into_iter().collect();
            cluster.remove_nodes(&removed);
            info!(cluster = %cluster.id(), removed = removed.len(), "nodes removed from the snapshot");
            tracker.result.commit_update(Some(cluster), None);
        }
        if let Some(err) = outcome.error {
            tracker.fail(err);
        }
    }
}

pub struct ApiEndpointChange {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl StageHandler for ApiEndpointChange {
    async fn handle(&self, tracker: &mut Tracker<'_>) {
        let Task::Update {
            state,
            delta:
                UpdateDelta::LoadBalancers {
                    transitions,
                    first_run,
                    previous_api_endpoint,
                },
        } = tracker.task
        else {
            debug!("task carries no load balancer transitions");
            return;
        };

        let mut cluster = working_cluster(tracker, &state.kubernetes);
        if transitions.iter().any(LbData::carries_api_role) {
            if let Err(e) = self.ctx.provider.connect(&cluster).await {
                return tracker.fail(e);
            }
        }

        let work_dir = self.ctx.provider.work_dir(&cluster);
        let applied = apply_transitions(
            &mut cluster,
            transitions,
            *first_run,
            previous_api_endpoint.as_ref(),
            self.ctx.editor.as_ref(),
            &work_dir,
        )
        .await;

        match applied {
            Ok(applied) => {
                info!(cluster = %cluster.id(), changes = applied.len(), "API endpoint reconciled");
                let load_balancers = merge_load_balancers(&state.load_balancers, transitions);
                tracker
                    .result
                    .commit_update(Some(cluster), Some(load_balancers));
            }
            Err(e) => tracker.fail(e),
        }
    }
}

/// Tracked load balancers after applying `transitions`: current specs are
/// replaced by desired ones, dropped when nothing is desired.
pub fn merge_load_balancers(tracked: &[LoadBalancer], transitions: &[LbData]) -> Vec<LoadBalancer> {
    let mut merged = tracked.to_vec();
    for transition in transitions {
        for lb in [&transition.current, &transition.desired].into_iter().flatten() {
            let id = lb.id();
            merged.retain(|existing| existing.id() != id);
        }
        if let Some(desired) = &transition.desired {
            merged.push(desired.clone());
        }
    }
    merged
}

pub struct PatchNodes {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl StageHandler for PatchNodes {
    async fn handle(&self, tracker: &mut Tracker<'_>) {
        let cluster = working_cluster(tracker, &tracker.task.snapshot().kubernetes);

        let patches: Vec<(String, NodePatch)> = cluster
            .nodepools
            .iter()
            .flat_map(|pool| {
                let patch = NodePatch {
                    labels: pool.labels.clone(),
                    annotations: pool.annotations.clone(),
                    taints: pool.taints.clone(),
                };
                pool.nodes
                    .iter()
                    .map(move |node| (node.name.clone(), patch.clone()))
            })
            .filter(|(_, patch)| !patch.is_empty())
            .map(|(name, patch)| (NodeInfo::resolve(&cluster, &name).cluster_local_name, patch))
            .collect();

        if patches.is_empty() {
            return;
        }

        let applier = match self.ctx.provider.connect(&cluster).await {
            Ok(applier) => applier,
            Err(e) => return tracker.fail(e),
        };

        let limit = self.ctx.config.workers_limit.max(1);
        let failures: Vec<FleetError> = stream::iter(patches)
            .map(|(node, patch)| {
                let applier = applier.clone();
                async move { applier.patch_node(&node, &patch).await }
            })
            .buffer_unordered(limit)
            .filter_map(|result| async move { result.err() })
            .collect()
            .await;

        if let Some(err) = join_errors(failures) {
            tracker.fail(err);
        }
    }
}

pub struct ClearState;

#[async_trait]
impl StageHandler for ClearState {
    async fn handle(&self, tracker: &mut Tracker<'_>) {
        let Task::Delete { current } = tracker.task else {
            debug!("only delete tasks clear state");
            return;
        };
        let load_balancers = current.load_balancers.iter().map(LoadBalancer::id).collect();
        tracker
            .result
            .commit_clear(Some(current.kubernetes.id()), load_balancers);
    }
}
