//! burnrate-driver — generates load against a running burnrate service.
//!
//! Simulated users share a pool of in-flight slots capped at the target
//! user count. Each tick tops the pool up, then reports throughput, latency
//! and the service's own view of CPU and replica count.

pub mod driver;
pub mod stats;

pub use driver::{DriverConfig, DriverSummary, LoadDriver, ScaleDirection, scale_direction};
pub use stats::{DriverStats, TickSnapshot};
