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

use crate::domain::model::{
    ErrorLevel, Stage, StageKind, Task, TaskError, TaskErrorKind, TaskResult,
};
use crate::domain::pipeline::diagnostics::Diagnostics;
use crate::domain::pipeline::tracker::Tracker;
use crate::shared::error::FleetError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Work performed for one stage kind. Failures are reported through
/// [`Tracker::fail`], mutations through `tracker.result`.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, tracker: &mut Tracker<'_>);
}

/// Outcome of a pipeline run.
#[derive(Debug, Default)]
pub struct TaskRun {
    pub result: TaskResult,
    pub diagnostics: Diagnostics,
}

/// Runs a task through an ordered list of stages.
#[derive(Default, Clone)]
pub struct Pipeline {
    handlers: HashMap<StageKind, Arc<dyn StageHandler>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: StageKind, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handles(&self, kind: &StageKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Executes `stages` in order.
    ///
    /// Cancellation is checked before every stage and recorded as a
    /// diagnostic. A stage that adds diagnostics stops the run when it is
    /// `FATAL` and is only logged when it is `WARN`. Stages without a handler
    /// are skipped. Mutations committed before a failure are kept; any
    /// diagnostic turns the result into a `PARTIAL` error.
    pub async fn execute(
        &self,
        task: &Task,
        stages: &[Stage],
        cancel: &CancellationToken,
    ) -> TaskRun {
        let mut result = TaskResult::default();
        let mut diagnostics = Diagnostics::new();
        let cluster = task.cluster_id();

        for stage in stages {
            if cancel.is_cancelled() {
                warn!(cluster = %cluster, stage = %stage.kind, "run cancelled");
                diagnostics.push(
                    stage.kind.as_str(),
                    FleetError::Cancelled {
                        operation: format!("before stage {}", stage.kind),
                    },
                );
                break;
            }

            let Some(handler) = self.handlers.get(&stage.kind) else {
                warn!(cluster = %cluster, stage = %stage.kind, "no handler for stage, skipping");
                continue;
            };

            info!(
                cluster = %cluster,
                stage = %stage.kind,
                about = %stage.description.about,
                "stage started"
            );
            let before = diagnostics.len();
            {
                let mut tracker = Tracker::new(task, &mut result, &mut diagnostics, stage);
                handler.handle(&mut tracker).await;
            }

            if diagnostics.len() == before {
                info!(cluster = %cluster, stage = %stage.kind, "stage finished");
                continue;
            }

            match stage.error_level() {
                ErrorLevel::Fatal => {
                    error!(cluster = %cluster, stage = %stage.kind, "fatal stage failed, stopping");
                    break;
                }
                ErrorLevel::Warn => {
                    warn!(cluster = %cluster, stage = %stage.kind, "stage failed, continuing");
                }
            }
        }

        if !diagnostics.is_empty() {
            result.error = Some(TaskError {
                kind: TaskErrorKind::Partial,
                description: diagnostics.render(),
            });
        }

        TaskRun { result, diagnostics }
    }
}
