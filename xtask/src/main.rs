//! Developer automation for fleet-kube, run as `cargo xtask <task>`.
//!
//! - test: unit and integration tests, optionally the ICMP socket tests
//! - lint: clippy with warnings denied
//! - fmt: rustfmt, or a formatting check with `--check`
//! - smoke: probe loopback through the release binary
//! - ci: fmt check, lint and tests, in that order

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Cmd, Shell};

const BINARY: &str = "fleet-kube";

#[derive(Parser)]
#[command(name = "xtask", about = "Developer automation for fleet-kube")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Run tests
    Test {
        /// Only the tests under tests/
        #[arg(long)]
        integration: bool,
        /// Include tests that open ICMP sockets (needs net.ipv4.ping_group_range)
        #[arg(long)]
        icmp: bool,
    },
    /// Run clippy with warnings denied
    Lint,
    /// Format the workspace
    Fmt {
        #[arg(long)]
        check: bool,
    },
    /// Probe 127.0.0.1 with the release binary
    Smoke,
    /// Formatting check, lint and tests
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root());

    match cli.task {
        Task::Test { integration, icmp } => test(&sh, integration, icmp),
        Task::Lint => step("lint", cmd!(sh, "cargo clippy --all-targets -- -D warnings")),
        Task::Fmt { check } => fmt(&sh, check),
        Task::Smoke => smoke(&sh),
        Task::Ci => {
            fmt(&sh, true)?;
            step("lint", cmd!(sh, "cargo clippy --all-targets -- -D warnings"))?;
            test(&sh, false, false)
        }
    }
}

/// Runs one command, reporting its outcome under `name`.
fn step(name: &str, command: Cmd<'_>) -> Result<()> {
    println!("▶ {}: {}", name, command);
    command.run().with_context(|| format!("{} failed", name))?;
    println!("✅ {} ok", name);
    Ok(())
}

fn test(sh: &Shell, integration: bool, icmp: bool) -> Result<()> {
    let selection: &[&str] = if integration {
        &["--test", "*"]
    } else {
        &["--workspace"]
    };
    let extra: &[&str] = if icmp { &["--", "--include-ignored"] } else { &[] };
    step("test", cmd!(sh, "cargo test {selection...} {extra...}"))
}

fn fmt(sh: &Shell, check: bool) -> Result<()> {
    let flags: &[&str] = if check { &["--", "--check"] } else { &[] };
    step("fmt", cmd!(sh, "cargo fmt --all {flags...}"))
}

fn smoke(sh: &Shell) -> Result<()> {
    let binary = workspace_root().join("target/release").join(BINARY);
    if !binary.exists() {
        step("build", cmd!(sh, "cargo build --release"))?;
    }
    step("smoke", cmd!(sh, "{binary} probe 127.0.0.1 --count 1"))
        .context("loopback probe failed; check net.ipv4.ping_group_range")
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
