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

use crate::infrastructure::command::limit::SpawnLimit;
use crate::infrastructure::command::sink::PrefixedWriter;
use crate::infrastructure::constants::{RETRY_BASE_DELAY, RETRY_MAX_DELAY};
use crate::shared::error::{FleetError, Result};
use backon::{BackoffBuilder, ExponentialBuilder};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An external process invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Prefix for streamed output lines. Output is only echoed when set.
    pub label: Option<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Delays between attempts: `base * 2^attempt`, capped at `max`.
pub fn backoff_schedule(
    base: Duration,
    max: Duration,
    retries: u32,
) -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(base)
        .with_max_delay(max)
        .with_factor(2.0)
        .with_max_times(retries as usize)
        .build()
}

/// Runs external processes with a hard per-attempt deadline and bounded
/// retries. Every attempt holds one slot of the shared [`SpawnLimit`].
#[derive(Clone)]
pub struct CommandRunner {
    spawn_limit: SpawnLimit,
    cancel: CancellationToken,
    base_delay: Duration,
    max_delay: Duration,
}

impl CommandRunner {
    pub fn new(spawn_limit: SpawnLimit) -> Self {
        Self {
            spawn_limit,
            cancel: CancellationToken::new(),
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn spawn_limit(&self) -> &SpawnLimit {
        &self.spawn_limit
    }

    /// Runs `spec` up to `retries + 1` times and returns its stdout.
    pub async fn run(&self, spec: &CommandSpec, retries: u32, timeout: Duration) -> Result<String> {
        let command = spec.display();
        let attempts = retries + 1;
        let mut delays = backoff_schedule(self.base_delay, self.max_delay, retries);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self.run_once(spec, timeout).await {
                Ok(output) => return Ok(output),
                Err(err @ FleetError::Cancelled { .. }) => return Err(err),
                Err(err) => err,
            };

            if attempt >= attempts {
                return Err(match err {
                    FleetError::Timeout { timeout, .. } => FleetError::Timeout {
                        operation: format!("'{}' (attempt {}/{})", command, attempt, attempts),
                        timeout,
                    },
                    FleetError::CommandFailed { last_error, .. } => FleetError::CommandFailed {
                        command,
                        attempts: attempt,
                        last_error,
                    },
                    other => FleetError::CommandFailed {
                        command,
                        attempts: attempt,
                        last_error: other.to_string(),
                    },
                });
            }

            let delay = delays.next().unwrap_or(self.max_delay);
            warn!(
                command = %command,
                attempt,
                attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "command failed, retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(FleetError::Cancelled { operation: command });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_once(&self, spec: &CommandSpec, timeout: Duration) -> Result<String> {
        let command = spec.display();
        let _permit = self.spawn_limit.acquire(&self.cancel, &command).await?;
        debug!(command = %command, "spawning");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label = spec.label.clone();

        // Feeding stdin counts against the deadline like the rest of the run.
        let work = async {
            let (fed, out, err) = tokio::join!(
                feed(stdin, spec.stdin.as_deref()),
                pump(stdout, label.clone(), false),
                pump(stderr, label.clone(), true)
            );
            fed?;
            let status = child.wait().await?;
            Ok::<_, FleetError>((status, out?, err?))
        };
        let outcome = tokio::time::timeout(timeout, work).await;

        match outcome {
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(command = %command, error = %e, "failed to kill timed out process");
                }
                Err(FleetError::Timeout {
                    operation: command,
                    timeout,
                })
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok((status, stdout, stderr))) => {
                if status.success() {
                    Ok(stdout)
                } else {
                    Err(FleetError::CommandFailed {
                        command,
                        attempts: 1,
                        last_error: format!("{}: {}", status, stderr.trim()),
                    })
                }
            }
        }
    }
}

/// Writes `input` to the child's stdin and closes it. A child that exits
/// without reading its input is not an error here.
async fn feed<W>(writer: Option<W>, input: Option<&str>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (Some(mut writer), Some(input)) = (writer, input) else {
        return Ok(());
    };
    match writer.write_all(input.as_bytes()).await {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading all input");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Drains one output stream, echoing complete prefixed lines when a label is
/// present, and returns everything that was read.
async fn pump<R>(reader: Option<R>, label: Option<String>, to_stderr: bool) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut sink = label.map(|label| {
        let inner: Box<dyn Write + Send> = if to_stderr {
            Box::new(std::io::stderr())
        } else {
            Box::new(std::io::stdout())
        };
        PrefixedWriter::new(label, inner)
    });

    let mut captured = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&buf[..n]);
        if let Some(sink) = sink.as_mut() {
            sink.write_all(&buf[..n])?;
        }
    }

    if let Some(sink) = sink {
        sink.finish()?;
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new(SpawnLimit::new(2))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_backoff_schedule_is_exponential_and_capped() {
        let delays: Vec<u64> = backoff_schedule(RETRY_BASE_DELAY, RETRY_MAX_DELAY, 8)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn test_command_display() {
        let spec = CommandSpec::new("kubectl").args(["get", "nodes"]).arg("-o=json");
        assert_eq!(spec.display(), "kubectl get nodes -o=json");
    }

    #[tokio::test]
    async fn test_run_returns_stdout() {
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);
        let output = runner().run(&spec, 0, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_passes_stdin() {
        let spec = CommandSpec::new("cat").stdin("from stdin");
        let output = runner().run(&spec, 0, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output, "from stdin");
    }

    #[tokio::test]
    async fn test_run_exhausts_retries() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = runner()
            .run(&spec, 2, Duration::from_secs(10))
            .await
            .unwrap_err();

        match err {
            FleetError::CommandFailed {
                attempts,
                last_error,
                command,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("boom"));
                assert!(command.starts_with("sh -c"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_succeeds_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args([
                "-c",
                "if [ -f marker ]; then echo ok; else touch marker; exit 1; fi",
            ])
            .work_dir(dir.path());

        let output = runner().run(&spec, 1, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.trim(), "ok");
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let spec = CommandSpec::new("sleep").arg("5");
        let err = runner()
            .run(&spec, 0, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unread_stdin_does_not_outlive_timeout() {
        // Larger than any pipe buffer, and the child never reads it.
        let input = "x".repeat(4 * 1024 * 1024);
        let spec = CommandSpec::new("sleep").arg("5").stdin(input);

        let started = std::time::Instant::now();
        let err = runner()
            .run(&spec, 0, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_releases_permits_on_failure() {
        let runner = runner();
        let spec = CommandSpec::new("sh").args(["-c", "exit 1"]);
        let _ = runner.run(&spec, 1, Duration::from_secs(10)).await;
        assert_eq!(runner.spawn_limit().available(), 2);
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = runner().with_cancellation(cancel);

        let spec = CommandSpec::new("sh").args(["-c", "echo never"]);
        let err = runner
            .run(&spec, 3, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled { .. }));
    }
}
