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

use async_trait::async_trait;
use fleet_kube::domain::config::{apply_overrides, parse_properties};
use fleet_kube::domain::model::ErrorLevel;
use fleet_kube::*;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod test_utils {
    use super::*;

    pub const CLUSTER_JSON: &str = r#"{
        "name": "prod",
        "hash": "abc",
        "nodepools": [
            {
                "name": "control",
                "is_control": true,
                "nodes": [
                    {"name": "prod-abc-m1", "public": "10.0.0.1", "node_type": "api_endpoint"},
                    {"name": "prod-abc-m2", "public": "10.0.0.2", "node_type": "master"}
                ]
            },
            {
                "name": "compute",
                "nodes": [
                    {"name": "prod-abc-w1", "public": "10.0.1.1", "node_type": "worker"}
                ],
                "labels": {"tier": "compute"}
            }
        ]
    }"#;

    pub fn cluster() -> K8sCluster {
        serde_json::from_str(CLUSTER_JSON).unwrap()
    }

    pub fn update_task() -> Task {
        Task::Update {
            state: ClusterSnapshot {
                kubernetes: cluster(),
                load_balancers: Vec::new(),
            },
            delta: UpdateDelta::None,
        }
    }

    pub fn api_lb(name: &str, endpoint: &str) -> LoadBalancer {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "hash": "h",
            "dns_endpoint": endpoint,
            "roles": [{"name": "api", "port": 6443, "target_port": 6443, "role_type": "api_server"}],
            "target_cluster": "prod-abc"
        }))
        .unwrap()
    }

    /// Counts invocations and optionally reports a failure.
    pub struct Recording {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl Recording {
        pub fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageHandler for Recording {
        async fn handle(&self, tracker: &mut Tracker<'_>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                tracker.fail(FleetError::invalid_state("stage failed"));
            }
        }
    }
}

use test_utils::*;

#[test]
fn test_config_file_with_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "spawn_limit = 3\nprober_workers = 0").unwrap();

    let mut config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.spawn_limit, 3);
    assert_eq!(config.prober_workers, 0);
    assert_eq!(config.kubectl_binary, "kubectl");

    let overrides =
        parse_properties(&["ping-count=9".to_string(), "kubectl=/opt/kubectl".to_string()])
            .unwrap();
    apply_overrides(&overrides, &mut config);
    assert_eq!(config.ping_count, 9);
    assert_eq!(config.kubectl_binary, "/opt/kubectl");
    assert!(config.validate().is_ok());

    config.spawn_limit = 0;
    assert!(matches!(config.validate(), Err(FleetError::Config(_))));
}

#[test]
fn test_task_and_stages_from_json() {
    let task: Task = serde_json::from_str(&format!(
        r#"{{"kind": "update", "state": {{"kubernetes": {}}},
            "delta": {{"type": "delete_nodes", "workers": ["prod-abc-w1"]}}}}"#,
        CLUSTER_JSON
    ))
    .unwrap();
    assert_eq!(task.cluster_id(), "prod-abc");
    match &task {
        Task::Update {
            delta: UpdateDelta::DeleteNodes { masters, workers },
            ..
        } => {
            assert!(masters.is_empty());
            assert_eq!(workers, &vec!["prod-abc-w1".to_string()]);
        }
        other => panic!("unexpected task: {other:?}"),
    }

    let stages: Vec<Stage> = serde_json::from_str(
        r#"[
            {"kind": "delete_nodes", "description": {"about": "remove nodes", "error_level": "FATAL"}},
            {"kind": "rotate_certs", "description": {"error_level": "WARN"}}
        ]"#,
    )
    .unwrap();
    assert_eq!(stages[0].kind, StageKind::DeleteNodes);
    assert_eq!(stages[1].kind, StageKind::Unknown("rotate_certs".to_string()));
    assert_eq!(stages[1].error_level(), ErrorLevel::Warn);
}

#[test]
fn test_loss_threshold_never_tolerates_total_loss() {
    assert_eq!(loss_threshold(0), 0);
    assert_eq!(loss_threshold(1), 0);
    assert_eq!(loss_threshold(3), 2);
    assert_eq!(loss_threshold(4), 2);
    assert_eq!(loss_threshold(10), 5);
}

#[test]
fn test_classify_transitions() {
    let old = api_lb("api", "old.example.com");
    let new = api_lb("api", "new.example.com");

    assert_eq!(classify(None, Some(&new)), EndpointState::AttachingLoadBalancer);
    assert_eq!(classify(Some(&old), None), EndpointState::DetachingLoadBalancer);
    assert_eq!(classify(Some(&old), Some(&new)), EndpointState::EndpointRenamed);
    assert_eq!(classify(Some(&old), Some(&old)), EndpointState::NoChange);
    assert_eq!(classify(None, None), EndpointState::NoChange);
}

#[tokio::test]
async fn test_pipeline_fatal_stage_stops_run() {
    let first = Recording::new(true);
    let second = Recording::new(false);
    let pipeline = Pipeline::new()
        .register(StageKind::CheckReachability, first.clone())
        .register(StageKind::PatchNodes, second.clone());

    let stages = vec![
        Stage::fatal(StageKind::CheckReachability, "probe"),
        Stage::fatal(StageKind::PatchNodes, "patch"),
    ];
    let run = pipeline
        .execute(&update_task(), &stages, &CancellationToken::new())
        .await;

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);
    assert!(run.result.is_partial());
    assert_eq!(run.diagnostics.len(), 1);
}

#[tokio::test]
async fn test_pipeline_warn_stage_continues() {
    let first = Recording::new(true);
    let second = Recording::new(false);
    let pipeline = Pipeline::new()
        .register(StageKind::CheckReachability, first.clone())
        .register(StageKind::PatchNodes, second.clone());

    let stages = vec![
        Stage::warn(StageKind::CheckReachability, "probe"),
        Stage::fatal(StageKind::Unknown("rotate_certs".into()), "no handler"),
        Stage::fatal(StageKind::PatchNodes, "patch"),
    ];
    let run = pipeline
        .execute(&update_task(), &stages, &CancellationToken::new())
        .await;

    assert_eq!(second.calls(), 1);
    assert!(run.result.is_partial());
    let description = &run.result.error.as_ref().unwrap().description;
    assert!(description.contains("check_reachability: invalid state: stage failed"));
}

#[tokio::test]
async fn test_pipeline_cancelled_before_first_stage() {
    let handler = Recording::new(false);
    let pipeline = Pipeline::new().register(StageKind::PatchNodes, handler.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = pipeline
        .execute(
            &update_task(),
            &[Stage::warn(StageKind::PatchNodes, "patch")],
            &cancel,
        )
        .await;

    assert_eq!(handler.calls(), 0);
    assert!(run.result.is_partial());
    assert!(matches!(
        run.diagnostics.iter().next().map(|d| &d.error),
        Some(FleetError::Cancelled { .. })
    ));
}

#[tokio::test]
async fn test_clean_run_has_no_error() {
    let handler = Recording::new(false);
    let pipeline = Pipeline::new().register(StageKind::PatchNodes, handler.clone());

    let run = pipeline
        .execute(
            &update_task(),
            &[Stage::fatal(StageKind::PatchNodes, "patch")],
            &CancellationToken::new(),
        )
        .await;

    assert!(run.diagnostics.is_empty());
    assert!(run.result.error.is_none());
    assert_eq!(run.result.mutation, Mutation::None);
}
