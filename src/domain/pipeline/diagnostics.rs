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

use crate::shared::error::FleetError;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug)]
pub struct Diagnostic {
    pub stage: String,
    pub at: DateTime<Utc>,
    pub error: FleetError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.at.format("%Y-%m-%dT%H:%M:%SZ"),
            self.stage,
            self.error
        )
    }
}

/// Errors recorded during one pipeline run, in order. Append-only.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: impl Into<String>, error: FleetError) {
        self.entries.push(Diagnostic {
            stage: stage.into(),
            at: Utc::now(),
            error,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// One line per diagnostic.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
