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

//! API endpoint state machine.
//!
//! When load balancers are attached, detached, renamed or re-roled the
//! address advertised as the cluster's API server may have to move. Each
//! transition is first classified into an [`EndpointState`], then resolved
//! into an `(old, new)` endpoint pair, then handed to an
//! [`ApiEndpointEditor`].

pub mod resolve;
pub mod state;

pub use self::resolve::{resolve, EndpointChange, ResolveContext};
pub use self::state::{classify, EndpointState};

use crate::domain::model::{K8sCluster, LbData, LoadBalancer};
use crate::infrastructure::kubernetes::ApiEndpointEditor;
use crate::shared::error::Result;
use std::path::Path;
use tracing::{debug, info};

/// An endpoint change that was pushed to the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub load_balancer: String,
    pub state: EndpointState,
    pub change: EndpointChange,
}

/// Runs the state machine over a batch of transitions for `cluster`.
///
/// Skipped entirely when no load balancer of the batch carries the API-server
/// role: the control plane is then reached directly on the nodes. Node role
/// changes are written into `cluster`; the first failing transition aborts
/// the batch.
pub async fn apply_transitions(
    cluster: &mut K8sCluster,
    transitions: &[LbData],
    first_run: bool,
    previous_api_endpoint: Option<&LoadBalancer>,
    editor: &dyn ApiEndpointEditor,
    work_dir: &Path,
) -> Result<Vec<AppliedChange>> {
    if !transitions.iter().any(LbData::carries_api_role) {
        debug!(cluster = %cluster.id(), "no API-server load balancer, endpoint unchanged");
        return Ok(Vec::new());
    }

    let ctx = ResolveContext {
        batch: transitions,
        first_run,
        previous_api_endpoint,
    };
    let cluster_id = cluster.id();
    let mut applied = Vec::new();

    for (index, transition) in transitions.iter().enumerate() {
        if transition.target_cluster() != Some(cluster_id.as_str()) {
            continue;
        }

        let state = classify(transition.current.as_ref(), transition.desired.as_ref());
        if state == EndpointState::NoChange {
            continue;
        }

        let Some(change) = resolve(state, index, &ctx, cluster)? else {
            continue;
        };
        let load_balancer = transition.id().unwrap_or_default();

        if change.old == change.new {
            debug!(lb = %load_balancer, %state, endpoint = %change.new, "endpoint already in place");
            continue;
        }

        info!(
            cluster = %cluster_id,
            lb = %load_balancer,
            %state,
            old = %change.old,
            new = %change.new,
            "moving API endpoint"
        );
        editor
            .update_api_endpoint(cluster, &change.old, &change.new, work_dir)
            .await?;

        applied.push(AppliedChange {
            load_balancer,
            state,
            change,
        });
    }

    Ok(applied)
}
