//! burnrate.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local-sampler service on port 8080.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest burn a configuration may allow: one day.
pub const MAX_BURN_MS: u64 = 24 * 60 * 60 * 1000;

/// Where Kubernetes mounts the service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnrateConfig {
    pub server: ServerConfig,
    pub compute: ComputeConfig,
    pub utilization: UtilizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory served at `/`. `None` disables static files.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: Some(PathBuf::from("/app/public")),
        }
    }
}

/// Bounds for the `/compute` busy loop, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub default_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            default_ms: 2000,
            min_ms: 1,
            max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// This process against the whole host, from procfs.
    #[default]
    Local,
    /// Node usage vs. allocatable from the cluster metrics API.
    ClusterApi,
    /// `kubectl top nodes` against a fixed per-node capacity.
    Kubectl,
    /// The kubelet's `/stats/summary`, forwarded verbatim.
    NodeAgent,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::ClusterApi => "cluster-api",
            SourceKind::Kubectl => "kubectl",
            SourceKind::NodeAgent => "node-agent",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(SourceKind::Local),
            "cluster-api" => Ok(SourceKind::ClusterApi),
            "kubectl" => Ok(SourceKind::Kubectl),
            "node-agent" => Ok(SourceKind::NodeAgent),
            other => Err(format!(
                "unknown utilization source {other:?} (expected local, cluster-api, kubectl, node-agent)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilizationConfig {
    pub source: SourceKind,
    pub local: LocalConfig,
    pub cluster: ClusterConfig,
    pub kubectl: KubectlConfig,
    pub node_agent: NodeAgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub proc_stat: PathBuf,
    pub self_stat: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            proc_stat: PathBuf::from("/proc/stat"),
            self_stat: PathBuf::from("/proc/self/stat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// API server base URL. Falls back to `KUBERNETES_SERVICE_HOST` and
    /// `KUBERNETES_SERVICE_PORT` when unset.
    pub server: Option<String>,
    pub token_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    /// Namespace and label selector for `/pods`.
    pub namespace: String,
    pub pod_selector: String,
    pub timeout_secs: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            server: None,
            token_path: Some(Path::new(SERVICE_ACCOUNT_DIR).join("token")),
            ca_path: Some(Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt")),
            namespace: "default".to_string(),
            pod_selector: "app=backend".to_string(),
            timeout_secs: None,
        }
    }
}

impl ClusterConfig {
    /// Resolve the API server URL from config or the in-cluster environment.
    pub fn resolve_server(&self) -> Option<String> {
        if let Some(server) = &self.server {
            return Some(server.clone());
        }
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        Some(format_https_url(&host, &port))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    pub binary: PathBuf,
    /// Capacity assumed per node; the CLI does not report allocatable.
    pub node_capacity_millicores: f64,
    pub namespace: String,
    pub pod_selector: String,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            node_capacity_millicores: 2000.0,
            namespace: "default".to_string(),
            pod_selector: "app=backend".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAgentConfig {
    /// Kubelet URL. Falls back to `https://$NODE_IP:10250/stats/summary`.
    pub url: Option<String>,
    pub token_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    /// Skip server certificate verification. Kubelets usually serve a
    /// self-signed certificate; prefer `ca_path` when one is available.
    pub insecure_skip_verify: bool,
    /// Substring of `podRef.name` counted by `/pods`.
    pub pod_name_filter: String,
    pub timeout_secs: Option<u64>,
}

impl Default for NodeAgentConfig {
    fn default() -> Self {
        Self {
            url: None,
            token_path: Some(Path::new(SERVICE_ACCOUNT_DIR).join("token")),
            ca_path: None,
            insecure_skip_verify: false,
            pod_name_filter: "backend".to_string(),
            timeout_secs: None,
        }
    }
}

impl NodeAgentConfig {
    pub fn resolve_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let host = std::env::var("NODE_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        format!("{}/stats/summary", format_https_url(&host, "10250"))
    }
}

/// IPv6 literals need brackets in a URL authority.
fn format_https_url(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

impl BurnrateConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BurnrateConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let c = &self.compute;
        if c.min_ms == 0 {
            anyhow::bail!("compute.min_ms must be at least 1");
        }
        if c.min_ms > c.max_ms {
            anyhow::bail!(
                "compute.min_ms ({}) exceeds compute.max_ms ({})",
                c.min_ms,
                c.max_ms
            );
        }
        if c.max_ms > MAX_BURN_MS {
            anyhow::bail!(
                "compute.max_ms ({}) exceeds the limit of {MAX_BURN_MS}",
                c.max_ms
            );
        }
        if self.utilization.kubectl.node_capacity_millicores <= 0.0 {
            anyhow::bail!("utilization.kubectl.node_capacity_millicores must be positive");
        }
        Ok(())
    }
}
