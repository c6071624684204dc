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

use crate::shared::error::{FleetError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounds how many external processes may run at once across every stage
/// handler sharing this value. Clones share the same pool.
#[derive(Clone, Debug)]
pub struct SpawnLimit {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl SpawnLimit {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot. Returns `Cancelled` if `cancel` fires first.
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        operation: &str,
    ) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FleetError::Cancelled {
                operation: operation.to_string(),
            }),
            permit = self.semaphore.clone().acquire_owned() => permit.map_err(|_| {
                FleetError::invalid_state("spawn limit semaphore closed")
            }),
        }
    }
}
