//! Cluster-wide CPU from the Kubernetes metrics API.
//!
//! ```text
//! usage       = Σ node.usage.cpu                 (metrics.k8s.io nodes)
//! allocatable = Σ node.status.allocatable.cpu    (core v1 nodes)
//! cpu_pct     = usage / allocatable × 100        (0 when allocatable is 0)
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use burnrate_core::config::{ClusterConfig, SourceKind};
use burnrate_core::{SourceResult, UtilizationReport, parse_cpu_millicores};

use crate::client::{ApiClient, Trust};
use crate::source::{BoxFuture, UtilizationSource};

const NODE_METRICS_PATH: &str = "/apis/metrics.k8s.io/v1beta1/nodes";
const NODES_PATH: &str = "/api/v1/nodes";

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NodeMetrics {
    #[serde(default)]
    usage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    allocatable: HashMap<String, String>,
}

/// Pod entries are only counted, so their shape is irrelevant.
type PodMetricsList = List<serde::de::IgnoredAny>;

pub struct ClusterMetrics {
    client: ApiClient,
    namespace: String,
    pod_selector: String,
}

impl ClusterMetrics {
    pub fn new(client: ApiClient, namespace: &str, pod_selector: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            pod_selector: pod_selector.to_string(),
        }
    }

    pub fn from_config(config: &ClusterConfig) -> anyhow::Result<Self> {
        let server = config.resolve_server().ok_or_else(|| {
            anyhow::anyhow!(
                "no cluster API server: set utilization.cluster.server or KUBERNETES_SERVICE_HOST"
            )
        })?;

        let trust = match &config.ca_path {
            Some(path) => Trust::CaFile(path.clone()),
            None => Trust::WebPkiRoots,
        };

        let client = ApiClient::new(&server, trust)?
            .with_token_file(config.token_path.clone())
            .with_timeout(config.timeout_secs.map(Duration::from_secs));

        Ok(Self::new(client, &config.namespace, &config.pod_selector))
    }

    async fn cluster_percent(&self) -> SourceResult<f64> {
        let usage = self.client.get(NODE_METRICS_PATH).await?;
        let nodes = self.client.get(NODES_PATH).await?;
        cluster_cpu_percent(&usage, &nodes)
    }

    fn pods_path(&self) -> String {
        format!(
            "/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods?labelSelector={}",
            urlencoding::encode(&self.namespace),
            urlencoding::encode(&self.pod_selector),
        )
    }
}

impl UtilizationSource for ClusterMetrics {
    fn kind(&self) -> SourceKind {
        SourceKind::ClusterApi
    }

    fn report(&self) -> BoxFuture<'_, SourceResult<UtilizationReport>> {
        Box::pin(async move {
            let cpu_pct = self.cluster_percent().await?;
            Ok(UtilizationReport::Aggregate { cpu_pct })
        })
    }

    fn pod_count(&self) -> BoxFuture<'_, SourceResult<u64>> {
        Box::pin(async move {
            let body = self.client.get(&self.pods_path()).await?;
            let pods: PodMetricsList = serde_json::from_slice(&body)?;
            Ok(pods.items.len() as u64)
        })
    }
}

/// Aggregate node usage against node allocatable capacity.
///
/// Nodes that do not report a `cpu` entry contribute nothing; a malformed
/// quantity fails the whole reading.
pub fn cluster_cpu_percent(node_metrics: &[u8], nodes: &[u8]) -> SourceResult<f64> {
    let usage: List<NodeMetrics> = serde_json::from_slice(node_metrics)?;
    let nodes: List<Node> = serde_json::from_slice(nodes)?;

    let mut total_usage = 0.0;
    for item in &usage.items {
        if let Some(cpu) = item.usage.get("cpu") {
            total_usage += parse_cpu_millicores(cpu)?;
        }
    }

    let mut total_alloc = 0.0;
    for node in &nodes.items {
        if let Some(cpu) = node.status.allocatable.get("cpu") {
            total_alloc += parse_cpu_millicores(cpu)?;
        }
    }

    debug!(
        nodes = nodes.items.len(),
        usage_millicores = total_usage,
        allocatable_millicores = total_alloc,
        "aggregated cluster cpu"
    );

    Ok(if total_alloc > 0.0 {
        total_usage / total_alloc * 100.0
    } else {
        0.0
    })
}
