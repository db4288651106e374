//! Cluster CPU via the `kubectl` CLI.
//!
//! `kubectl top nodes` reports usage but not capacity, so capacity is a
//! configured per-node constant.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use burnrate_core::config::{KubectlConfig, SourceKind};
use burnrate_core::{SourceError, SourceResult, UtilizationReport, parse_cpu_millicores};

use crate::source::{BoxFuture, UtilizationSource};

pub struct KubectlTop {
    binary: PathBuf,
    node_capacity_millicores: f64,
    namespace: String,
    pod_selector: String,
}

impl KubectlTop {
    pub fn from_config(config: &KubectlConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            node_capacity_millicores: config.node_capacity_millicores,
            namespace: config.namespace.clone(),
            pod_selector: config.pod_selector.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> SourceResult<String> {
        debug!(binary = %self.binary.display(), ?args, "running kubectl");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| SourceError::Command(format!("{}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Command(format!(
                "{} {} exited with {}: {}",
                self.binary.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl UtilizationSource for KubectlTop {
    fn kind(&self) -> SourceKind {
        SourceKind::Kubectl
    }

    fn report(&self) -> BoxFuture<'_, SourceResult<UtilizationReport>> {
        Box::pin(async move {
            let stdout = self.run(&["top", "nodes", "--no-headers"]).await?;
            let cpu_pct = top_nodes_percent(&stdout, self.node_capacity_millicores)?;
            Ok(UtilizationReport::Aggregate { cpu_pct })
        })
    }

    fn pod_count(&self) -> BoxFuture<'_, SourceResult<u64>> {
        Box::pin(async move {
            let stdout = self
                .run(&[
                    "get",
                    "pods",
                    "-n",
                    self.namespace.as_str(),
                    "-l",
                    self.pod_selector.as_str(),
                    "--no-headers",
                ])
                .await?;
            Ok(count_rows(&stdout))
        })
    }
}

/// Sum the CPU column of `kubectl top nodes --no-headers` against
/// `nodes × capacity`.
///
/// ```text
/// node-a   250m   12%   1024Mi   30%
/// node-b   1      50%   2048Mi   60%
/// ```
pub fn top_nodes_percent(stdout: &str, node_capacity_millicores: f64) -> SourceResult<f64> {
    let mut nodes = 0usize;
    let mut usage = 0.0;

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let cpu = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| SourceError::Parse(format!("no cpu column in {line:?}")))?;
        // Nodes without metrics yet show `<unknown>`.
        if cpu.starts_with('<') {
            nodes += 1;
            continue;
        }
        usage += parse_cpu_millicores(cpu)?;
        nodes += 1;
    }

    let capacity = nodes as f64 * node_capacity_millicores;
    Ok(if capacity > 0.0 {
        usage / capacity * 100.0
    } else {
        0.0
    })
}

fn count_rows(stdout: &str) -> u64 {
    stdout.lines().filter(|l| !l.trim().is_empty()).count() as u64
}
