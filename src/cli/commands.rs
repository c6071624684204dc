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

// CLI command definitions

use crate::cli::display::TableRenderer;
use crate::domain::config::{apply_overrides, parse_properties, EngineConfig};
use crate::domain::model::{Stage, Task};
use crate::domain::pipeline::{Pipeline, StageContext};
use crate::infrastructure::command::{CommandRunner, SpawnLimit};
use crate::infrastructure::constants::{DEFAULT_PING_COUNT, DEFAULT_PROBE_WORKERS};
use crate::infrastructure::kubernetes::{KubeadmEndpointEditor, KubectlProvider};
use crate::infrastructure::reachability::Prober;
use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run a task through a list of pipeline stages and print the result
    Run(RunCommand),
    /// Probe addresses with ICMP echo and report which are unreachable
    Probe(ProbeCommand),
}

#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Task document (JSON): create, update or delete with its cluster state
    #[arg(long, value_name = "PATH")]
    pub task: PathBuf,

    /// Ordered stage list (JSON)
    #[arg(long, value_name = "PATH")]
    pub stages: PathBuf,

    /// Engine configuration file (TOML). Without it, FLEET_* environment
    /// variables and built-in defaults are used.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dynamic configuration properties overriding any setting (-D key=value)
    ///
    /// Keys: prober-workers, workers-limit, spawn-limit, command-timeout,
    /// cluster-timeout, kubectl-retries, ping-count, work-dir, kubectl
    ///
    /// Example: -Dspawn-limit=10 -Dping-count=5
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Addresses to probe
    #[arg(required = true, num_args = 1..)]
    pub addresses: Vec<String>,

    /// Concurrent probe workers
    #[arg(long, short = 'w', default_value_t = DEFAULT_PROBE_WORKERS)]
    pub workers: usize,

    /// Echo requests sent per address
    #[arg(long, short = 'n', default_value_t = DEFAULT_PING_COUNT)]
    pub count: usize,
}

impl RunCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        let task: Task = read_json(&self.task)?;
        let stages: Vec<Stage> = read_json(&self.stages)?;

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling after the current step");
                    cancel.cancel();
                }
            });
        }

        let runner = CommandRunner::new(SpawnLimit::new(config.spawn_limit))
            .with_cancellation(cancel.clone());
        let ctx = StageContext {
            provider: Arc::new(KubectlProvider::new(runner.clone(), config.clone())),
            editor: Arc::new(KubeadmEndpointEditor::new(runner, config.clone())),
            prober: Prober::icmp(config.ping_count),
            config,
        };

        info!(
            task = task.kind_name(),
            cluster = %task.cluster_id(),
            stages = stages.len(),
            "starting pipeline"
        );
        let run = Pipeline::standard(ctx)
            .execute(&task, &stages, &cancel)
            .await;

        println!("{}", serde_json::to_string_pretty(&run.result)?);
        if !run.diagnostics.is_empty() {
            eprintln!("{}", TableRenderer::new().render_diagnostics(&run.diagnostics));
        }

        if run.result.is_partial() {
            anyhow::bail!(
                "task finished with {} diagnostic(s)",
                run.diagnostics.len()
            );
        }
        Ok(())
    }

    /// Priority: -D properties > config file (or environment) > defaults
    fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::from_env(),
        };

        if !self.properties.is_empty() {
            let overrides = parse_properties(&self.properties)
                .map_err(|e| anyhow::anyhow!("Failed to parse dynamic configs: {}", e))?;
            apply_overrides(&overrides, &mut config);
        }

        config.validate()?;
        Ok(config)
    }
}

impl ProbeCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            println!("Probing disabled (--workers 0)");
            return Ok(());
        }

        let prober = Prober::icmp(self.count);
        let outcome = prober.probe_all(&self.addresses, self.workers).await;
        println!(
            "{}",
            TableRenderer::new().render_probe(&self.addresses, &outcome)
        );

        if !outcome.is_clean() {
            anyhow::bail!("{} address(es) unreachable", outcome.unreachable.len());
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
