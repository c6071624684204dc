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

use crate::domain::model::LoadBalancer;
use std::fmt;

/// How a load balancer transition affects the cluster's API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointState {
    NoChange,
    AttachingLoadBalancer,
    DetachingLoadBalancer,
    EndpointRenamed,
    RoleChangedToApiServer,
    RoleChangedFromApiServer,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::NoChange => "no-change",
            EndpointState::AttachingLoadBalancer => "attaching-load-balancer",
            EndpointState::DetachingLoadBalancer => "detaching-load-balancer",
            EndpointState::EndpointRenamed => "endpoint-renamed",
            EndpointState::RoleChangedToApiServer => "role-changed-to-api-server",
            EndpointState::RoleChangedFromApiServer => "role-changed-from-api-server",
        };
        f.write_str(name)
    }
}

/// Classifies one transition. Only load balancers that carry the API-server
/// role on at least one side can move the endpoint; conditions are checked in
/// declaration order and the first match wins.
pub fn classify(current: Option<&LoadBalancer>, desired: Option<&LoadBalancer>) -> EndpointState {
    match (current, desired) {
        (None, Some(desired)) if desired.has_api_role() => EndpointState::AttachingLoadBalancer,
        (Some(current), None) if current.has_api_role() => EndpointState::DetachingLoadBalancer,
        (Some(current), Some(desired)) => {
            let (was, is) = (current.has_api_role(), desired.has_api_role());
            if was && is && current.dns_endpoint != desired.dns_endpoint {
                EndpointState::EndpointRenamed
            } else if !was && is {
                EndpointState::RoleChangedToApiServer
            } else if was && !is {
                EndpointState::RoleChangedFromApiServer
            } else {
                EndpointState::NoChange
            }
        }
        _ => EndpointState::NoChange,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::cluster::fixtures::lb;

    #[test]
    fn test_classify() {
        let api_a = lb("x", "a", true);
        let api_b = lb("x", "b", true);
        let ingress_a = lb("x", "a", false);
        let ingress_b = lb("x", "b", false);

        let cases = [
            (None, None, EndpointState::NoChange),
            (None, Some(&api_a), EndpointState::AttachingLoadBalancer),
            (None, Some(&ingress_a), EndpointState::NoChange),
            (Some(&api_a), None, EndpointState::DetachingLoadBalancer),
            (Some(&ingress_a), None, EndpointState::NoChange),
            (Some(&api_a), Some(&api_b), EndpointState::EndpointRenamed),
            (Some(&api_a), Some(&api_a), EndpointState::NoChange),
            (Some(&ingress_a), Some(&api_a), EndpointState::RoleChangedToApiServer),
            (Some(&api_a), Some(&ingress_a), EndpointState::RoleChangedFromApiServer),
            (Some(&ingress_a), Some(&ingress_b), EndpointState::NoChange),
        ];

        for (current, desired, expected) in cases {
            assert_eq!(classify(current, desired), expected, "{current:?} -> {desired:?}");
        }
    }

    #[test]
    fn test_role_change_with_new_endpoint() {
        // Endpoint and role change together: the role change decides.
        let current = lb("x", "a", false);
        let desired = lb("x", "b", true);
        assert_eq!(
            classify(Some(&current), Some(&desired)),
            EndpointState::RoleChangedToApiServer
        );
    }
}
