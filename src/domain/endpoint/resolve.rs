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

use crate::domain::endpoint::state::EndpointState;
use crate::domain::model::{K8sCluster, LbData, LoadBalancer, NodeType};
use crate::shared::error::{FleetError, Result};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointChange {
    pub old: String,
    pub new: String,
}

/// Inputs shared by every transition of one batch.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Whole batch, used to find another load balancer holding the role.
    pub batch: &'a [LbData],
    pub first_run: bool,
    pub previous_api_endpoint: Option<&'a LoadBalancer>,
}

/// Resolves the `(old, new)` endpoint pair for the transition at `index` of
/// the batch. Promotes or demotes control nodes of `cluster` as needed.
/// Returns `None` when no endpoint change is required.
pub fn resolve(
    state: EndpointState,
    index: usize,
    ctx: &ResolveContext<'_>,
    cluster: &mut K8sCluster,
) -> Result<Option<EndpointChange>> {
    let transition = ctx.batch.get(index).ok_or_else(|| {
        FleetError::invalid_state(format!("transition {} is outside the batch", index))
    })?;
    let current = transition.current.as_ref();
    let desired = transition.desired.as_ref();

    let replacement = replacement_in_batch(index, ctx);

    let change = match state {
        EndpointState::NoChange => None,
        EndpointState::EndpointRenamed => Some(EndpointChange {
            old: endpoint_of(current, "current")?,
            new: endpoint_of(desired, "desired")?,
        }),
        EndpointState::DetachingLoadBalancer | EndpointState::RoleChangedFromApiServer
            if replacement.is_some() =>
        {
            info!(
                replacement = replacement.unwrap_or_default(),
                "API role handed to another load balancer of the batch"
            );
            None
        }
        EndpointState::DetachingLoadBalancer | EndpointState::RoleChangedFromApiServer => {
            Some(EndpointChange {
                old: endpoint_of(current, "current")?,
                new: promote_control_node(cluster)?,
            })
        }
        EndpointState::AttachingLoadBalancer if ctx.first_run => {
            info!("first reconciliation, no API endpoint to migrate from");
            None
        }
        EndpointState::AttachingLoadBalancer | EndpointState::RoleChangedToApiServer => {
            let new = endpoint_of(desired, "desired")?;
            let old = previous_endpoint(index, ctx, cluster)?;
            Some(EndpointChange { old, new })
        }
    };
    Ok(change)
}

fn endpoint_of(lb: Option<&LoadBalancer>, side: &str) -> Result<String> {
    lb.map(|lb| lb.dns_endpoint.clone()).ok_or_else(|| {
        FleetError::invalid_state(format!("{} load balancer spec is missing", side))
    })
}

/// Endpoint of another load balancer of the batch that takes over the API
/// role for the same cluster. Its own transition owns the endpoint move.
fn replacement_in_batch<'a>(index: usize, ctx: &ResolveContext<'a>) -> Option<&'a str> {
    let target = ctx.batch.get(index)?.target_cluster()?;
    ctx.batch
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .filter_map(|(_, data)| data.desired.as_ref())
        .find(|lb| lb.has_api_role() && lb.target_cluster == target)
        .map(|lb| lb.dns_endpoint.as_str())
}

/// Address of the control node serving as API endpoint, promoting the first
/// control node when none does yet.
fn promote_control_node(cluster: &mut K8sCluster) -> Result<String> {
    if let Some(node) = cluster.api_endpoint_node() {
        return Ok(node.public.clone());
    }

    let cluster_id = cluster.id();
    let node = cluster.first_control_node_mut().ok_or_else(|| {
        FleetError::invalid_state(format!("cluster {} has no control node to promote", cluster_id))
    })?;
    node.node_type = NodeType::ApiEndpoint;
    info!(node = %node.name, "control node promoted to API endpoint");
    Ok(node.public.clone())
}

/// Where the API endpoint pointed before the new load balancer took over:
/// the recorded previous load balancer, another load balancer of the batch
/// currently holding the role, or the API-endpoint node, which is demoted.
fn previous_endpoint(index: usize, ctx: &ResolveContext<'_>, cluster: &mut K8sCluster) -> Result<String> {
    if let Some(previous) = ctx.previous_api_endpoint {
        return Ok(previous.dns_endpoint.clone());
    }

    let other = ctx
        .batch
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .filter_map(|(_, data)| data.current.as_ref())
        .find(|lb| lb.has_api_role());
    if let Some(lb) = other {
        return Ok(lb.dns_endpoint.clone());
    }

    let cluster_id = cluster.id();
    let node = cluster.api_endpoint_node_mut().ok_or_else(|| {
        FleetError::invalid_state(format!(
            "cannot determine the current API endpoint of {}",
            cluster_id
        ))
    })?;
    node.node_type = NodeType::Master;
    info!(node = %node.name, "API endpoint node demoted to master");
    Ok(node.public.clone())
}
