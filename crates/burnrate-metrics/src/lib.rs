//! burnrate-metrics — CPU utilization for the `/metrics` and `/pods`
//! endpoints.
//!
//! # Architecture
//!
//! ```text
//! UtilizationSource (trait, chosen by [utilization] source)
//!   ├── LocalSampler        procfs delta since the previous report
//!   ├── ClusterMetrics      metrics.k8s.io usage / node allocatable
//!   ├── KubectlTop          `kubectl top nodes` / fixed node capacity
//!   └── NodeAgent           kubelet /stats/summary, forwarded verbatim
//!
//! ApiClient (hyper http1 + rustls) ← ClusterMetrics, NodeAgent
//! ```
//!
//! The local sampler is the only stateful source: it keeps the last
//! `CpuSample` behind a mutex and swaps it on every report. The remote
//! sources are stateless fetch-and-compute.

pub mod agent;
pub mod client;
pub mod cluster;
pub mod kubectl;
pub mod procfs;
pub mod sampler;
pub mod source;

pub use client::{ApiClient, Trust};
pub use procfs::{CpuCounters, ProcfsCounters};
pub use sampler::LocalSampler;
pub use source::{UtilizationSource, build_source};
