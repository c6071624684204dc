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

use std::time::Duration;

/// Namespaces
pub const NAMESPACE_KUBE_SYSTEM: &str = "kube-system";
pub const NAMESPACE_KUBE_PUBLIC: &str = "kube-public";
pub const NAMESPACE_LONGHORN: &str = "longhorn-system";

/// Taint applied to nodes that no longer answer echo probes
pub const TAINT_OUT_OF_SERVICE: &str = "node.kubernetes.io/out-of-service=nodeshutdown:NoExecute";

/// etcd static pods
pub const ETCD_POD_SELECTOR: &str = "component=etcd";
pub const ETCD_ENDPOINT: &str = "https://127.0.0.1:2379";
pub const ETCD_CA_FILE: &str = "/etc/kubernetes/pki/etcd/ca.crt";
pub const ETCD_CERT_FILE: &str = "/etc/kubernetes/pki/etcd/healthcheck-client.crt";
pub const ETCD_KEY_FILE: &str = "/etc/kubernetes/pki/etcd/healthcheck-client.key";

/// Longhorn replica resource
pub const LONGHORN_REPLICA_RESOURCE: &str = "replicas.longhorn.io";
pub const REPLICA_STATE_STOPPED: &str = "stopped";

/// kubeadm ConfigMaps holding the advertised API endpoint
pub const KUBEADM_CONFIGMAP: &str = "kubeadm-config";
pub const KUBEADM_CLUSTER_CONFIGURATION_KEY: &str = "ClusterConfiguration";
pub const CLUSTER_INFO_CONFIGMAP: &str = "cluster-info";
pub const CLUSTER_INFO_KUBECONFIG_KEY: &str = "kubeconfig";

/// File name of the kubeconfig inside a cluster working directory
pub const KUBECONFIG_FILE_NAME: &str = "kubeconfig";

/// Retry backoff: base * 2^attempt, capped
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Echo probing
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);
pub const PROBE_PAYLOAD: &[u8] = b"fleet-kube-reachability";

/// Environment variables read by `EngineConfig::from_env`
pub const ENV_PROBE_WORKERS: &str = "FLEET_PROBE_WORKERS";
pub const ENV_WORKERS_LIMIT: &str = "FLEET_WORKERS_LIMIT";
pub const ENV_SPAWN_LIMIT: &str = "FLEET_SPAWN_LIMIT";
pub const ENV_COMMAND_TIMEOUT: &str = "FLEET_COMMAND_TIMEOUT_SECS";
pub const ENV_CLUSTER_TIMEOUT: &str = "FLEET_CLUSTER_TIMEOUT_SECS";
pub const ENV_KUBECTL_RETRIES: &str = "FLEET_KUBECTL_RETRIES";
pub const ENV_PING_COUNT: &str = "FLEET_PING_COUNT";
pub const ENV_WORK_DIR: &str = "FLEET_WORK_DIR";
pub const ENV_KUBECTL: &str = "FLEET_KUBECTL";

/// Defaults
pub const DEFAULT_PROBE_WORKERS: usize = 20;
pub const DEFAULT_WORKERS_LIMIT: usize = 8;
pub const DEFAULT_SPAWN_LIMIT: usize = 5;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_KUBECTL_RETRIES: u32 = 5;
pub const DEFAULT_PING_COUNT: usize = 3;
pub const DEFAULT_WORK_DIR: &str = "./clusters";
pub const DEFAULT_KUBECTL: &str = "kubectl";
