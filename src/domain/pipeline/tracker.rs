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

use crate::domain::model::{Stage, Task, TaskResult};
use crate::domain::pipeline::diagnostics::Diagnostics;
use crate::shared::error::FleetError;

/// Everything a stage handler may touch during one run: the task it reads,
/// the result it commits into and the diagnostics it reports failures to.
pub struct Tracker<'a> {
    pub task: &'a Task,
    pub result: &'a mut TaskResult,
    diagnostics: &'a mut Diagnostics,
    stage: &'a Stage,
}

impl<'a> Tracker<'a> {
    pub fn new(
        task: &'a Task,
        result: &'a mut TaskResult,
        diagnostics: &'a mut Diagnostics,
        stage: &'a Stage,
    ) -> Self {
        Self {
            task,
            result,
            diagnostics,
            stage,
        }
    }

    pub fn stage(&self) -> &Stage {
        self.stage
    }

    /// Records a failure of the current stage.
    pub fn fail(&mut self, error: FleetError) {
        self.diagnostics.push(self.stage.kind.as_str(), error);
    }
}
