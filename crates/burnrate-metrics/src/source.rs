//! The pluggable utilization source.

use std::sync::Arc;

use tracing::{info, warn};

use burnrate_core::config::{SourceKind, UtilizationConfig};
use burnrate_core::{SourceError, SourceResult, UtilizationReport};

use crate::agent::NodeAgent;
use crate::cluster::ClusterMetrics;
use crate::kubectl::KubectlTop;
use crate::procfs::ProcfsCounters;
use crate::sampler::LocalSampler;

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Produces a CPU utilization reading on demand.
///
/// Implementations are shared across request handlers, so they take
/// `&self` and do their own locking where they hold state.
pub trait UtilizationSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Produce the body for `/metrics`.
    fn report(&self) -> BoxFuture<'_, SourceResult<UtilizationReport>>;

    /// Number of workload pods the source can see. Sources without a
    /// cluster view report `SourceError::Unsupported`.
    fn pod_count(&self) -> BoxFuture<'_, SourceResult<u64>> {
        let kind = self.kind().as_str();
        Box::pin(async move { Err(SourceError::Unsupported(kind)) })
    }
}

/// Build the source selected by `[utilization] source`.
pub fn build_source(config: &UtilizationConfig) -> anyhow::Result<Arc<dyn UtilizationSource>> {
    let source: Arc<dyn UtilizationSource> = match config.source {
        SourceKind::Local => {
            Arc::new(LocalSampler::new(ProcfsCounters::from_config(&config.local)))
        }
        SourceKind::ClusterApi => Arc::new(ClusterMetrics::from_config(&config.cluster)?),
        SourceKind::Kubectl => Arc::new(KubectlTop::from_config(&config.kubectl)),
        SourceKind::NodeAgent => {
            if config.node_agent.insecure_skip_verify {
                warn!("node-agent TLS certificate verification is disabled");
            }
            Arc::new(NodeAgent::from_config(&config.node_agent)?)
        }
    };
    info!(source = %source.kind(), "utilization source initialized");
    Ok(source)
}
