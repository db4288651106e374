//! Per-node kubelet summary, forwarded as-is.

use std::time::Duration;

use serde::Deserialize;

use burnrate_core::config::{NodeAgentConfig, SourceKind};
use burnrate_core::{PassthroughBody, SourceResult, UtilizationReport};

use crate::client::{ApiClient, Trust};
use crate::source::{BoxFuture, UtilizationSource};

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    pods: Vec<PodStats>,
}

#[derive(Debug, Deserialize)]
struct PodStats {
    #[serde(rename = "podRef")]
    pod_ref: Option<PodRef>,
}

#[derive(Debug, Deserialize)]
struct PodRef {
    #[serde(default)]
    name: String,
}

pub struct NodeAgent {
    client: ApiClient,
    pod_name_filter: String,
}

impl NodeAgent {
    pub fn new(client: ApiClient, pod_name_filter: &str) -> Self {
        Self {
            client,
            pod_name_filter: pod_name_filter.to_string(),
        }
    }

    pub fn from_config(config: &NodeAgentConfig) -> anyhow::Result<Self> {
        let trust = if config.insecure_skip_verify {
            Trust::InsecureSkipVerify
        } else if let Some(path) = &config.ca_path {
            Trust::CaFile(path.clone())
        } else {
            Trust::WebPkiRoots
        };

        let client = ApiClient::new(&config.resolve_url(), trust)?
            .with_token_file(config.token_path.clone())
            .with_timeout(config.timeout_secs.map(Duration::from_secs));

        Ok(Self::new(client, &config.pod_name_filter))
    }
}

impl UtilizationSource for NodeAgent {
    fn kind(&self) -> SourceKind {
        SourceKind::NodeAgent
    }

    fn report(&self) -> BoxFuture<'_, SourceResult<UtilizationReport>> {
        Box::pin(async move {
            let body = self.client.get("").await?;
            Ok(UtilizationReport::Passthrough(PassthroughBody::parse(&body)?))
        })
    }

    fn pod_count(&self) -> BoxFuture<'_, SourceResult<u64>> {
        Box::pin(async move {
            let body = self.client.get("").await?;
            count_matching_pods(&body, &self.pod_name_filter)
        })
    }
}

/// Count summary pods whose `podRef.name` contains `filter`.
pub fn count_matching_pods(summary: &[u8], filter: &str) -> SourceResult<u64> {
    let summary: Summary = serde_json::from_slice(summary)?;
    let count = summary
        .pods
        .iter()
        .filter_map(|p| p.pod_ref.as_ref())
        .filter(|r| r.name.contains(filter))
        .count();
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{dead_url, serve};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use burnrate_core::SourceError;

    const SUMMARY: &str = r#"{
        "node": {"nodeName": "node-a", "cpu": {"usageNanoCores": 250000000}},
        "pods": [
            {"podRef": {"name": "backend-7d9f-abc", "namespace": "default"},
             "containers": [{"name": "backend", "cpu": {"usageNanoCores": 120000000}}]},
            {"podRef": {"name": "backend-7d9f-def", "namespace": "default"},
             "containers": [{"name": "backend", "cpu": {"usageNanoCores": 80000000}}]},
            {"podRef": {"name": "frontend-55c-xyz", "namespace": "default"}, "containers": []},
            {"containers": []}
        ]
    }"#;

    #[test]
    fn counts_pods_by_name_filter() {
        assert_eq!(count_matching_pods(SUMMARY.as_bytes(), "backend").unwrap(), 2);
        assert_eq!(count_matching_pods(SUMMARY.as_bytes(), "frontend").unwrap(), 1);
        assert_eq!(count_matching_pods(SUMMARY.as_bytes(), "").unwrap(), 3);
    }

    #[test]
    fn summary_without_pods_counts_zero() {
        assert_eq!(count_matching_pods(br#"{"node": {}}"#, "backend").unwrap(), 0);
    }

    #[test]
    fn insecure_config_selects_no_verify() {
        let config = NodeAgentConfig {
            url: Some("https://10.0.0.9:10250/stats/summary".to_string()),
            insecure_skip_verify: true,
            ..Default::default()
        };
        assert!(NodeAgent::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn forwards_body_verbatim() {
        let router = Router::new().route("/stats/summary", get(|| async { SUMMARY }));
        let base = serve(router).await;

        let client = ApiClient::new(&format!("{base}/stats/summary"), Trust::WebPkiRoots).unwrap();
        let agent = NodeAgent::new(client, "backend");

        match agent.report().await.unwrap() {
            UtilizationReport::Passthrough(body) => assert_eq!(body.as_str(), SUMMARY),
            other => panic!("unexpected report {other:?}"),
        }
        assert_eq!(agent.pod_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_not_forwarded() {
        let router = Router::new().route("/stats/summary", get(|| async { "{\"pods\": [" }));
        let base = serve(router).await;

        let client = ApiClient::new(&format!("{base}/stats/summary"), Trust::WebPkiRoots).unwrap();
        let agent = NodeAgent::new(client, "backend");
        assert!(matches!(agent.report().await, Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn upstream_errors_propagate() {
        let router = Router::new().route(
            "/stats/summary",
            get(|| async { (StatusCode::UNAUTHORIZED, "Unauthorized") }),
        );
        let base = serve(router).await;
        let client = ApiClient::new(&format!("{base}/stats/summary"), Trust::WebPkiRoots).unwrap();
        let agent = NodeAgent::new(client, "backend");
        assert!(matches!(
            agent.report().await,
            Err(SourceError::Status { status: 401, .. })
        ));

        let client = ApiClient::new(&dead_url().await, Trust::WebPkiRoots).unwrap();
        let agent = NodeAgent::new(client, "backend");
        assert!(agent.report().await.is_err());
    }
}
