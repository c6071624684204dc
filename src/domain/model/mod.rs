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

pub mod cluster;
pub mod result;
pub mod stage;
pub mod task;

pub use self::cluster::{
    ClusterSnapshot, K8sCluster, LbData, LoadBalancer, Node, NodePool, NodeType, Role, RoleType,
    Taint,
};
pub use self::result::{Mutation, TaskError, TaskErrorKind, TaskResult};
pub use self::stage::{Description, ErrorLevel, Stage, StageKind};
pub use self::task::{Task, UpdateDelta};
