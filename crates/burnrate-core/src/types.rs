//! Shared types used across burnrate crates.

use serde::{Deserialize, Serialize};

/// A pair of cumulative CPU counters captured at one instant.
///
/// Both counters are in jiffies and only ever grow while the host is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSample {
    /// Sum of every category on the aggregate `cpu` line of `/proc/stat`.
    pub total_jiffies: u64,
    /// `utime + stime` of this process.
    pub proc_jiffies: u64,
}

impl CpuSample {
    pub fn new(total_jiffies: u64, proc_jiffies: u64) -> Self {
        Self {
            total_jiffies,
            proc_jiffies,
        }
    }
}

/// Percentage of total CPU time spent in this process between two samples.
///
/// Returns `0.0` when the time base has not advanced. Deltas saturate at
/// zero, so a counter reset never yields a negative reading. The only
/// upper bound is `100 × logical cores`; counters that disagree (process
/// time outrunning system time) can read above 100.
pub fn compute_percent(prev: CpuSample, now: CpuSample) -> f64 {
    let total_diff = now.total_jiffies.saturating_sub(prev.total_jiffies);
    let proc_diff = now.proc_jiffies.saturating_sub(prev.proc_jiffies);
    if total_diff == 0 {
        return 0.0;
    }
    100.0 * (proc_diff as f64 / total_diff as f64)
}

/// Body of a `/metrics` response.
#[derive(Debug, Clone, PartialEq)]
pub enum UtilizationReport {
    /// Process-vs-system delta from local counters.
    Local {
        cpu_pct: f64,
        /// Whole seconds since the previous sample.
        uptime: u64,
        /// Epoch milliseconds when this report was produced.
        timestamp: u64,
    },
    /// Aggregate over every node the source can see.
    Aggregate { cpu_pct: f64 },
    /// An upstream JSON body forwarded verbatim.
    Passthrough(PassthroughBody),
}

impl UtilizationReport {
    /// The CPU percentage, if this report carries one.
    pub fn cpu_pct(&self) -> Option<f64> {
        match self {
            UtilizationReport::Local { cpu_pct, .. } | UtilizationReport::Aggregate { cpu_pct } => {
                Some(*cpu_pct)
            }
            UtilizationReport::Passthrough(_) => None,
        }
    }

    /// Serialize to the bytes sent on the wire.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        match self {
            UtilizationReport::Local {
                cpu_pct,
                uptime,
                timestamp,
            } => serde_json::json!({
                "cpu_pct": finite(*cpu_pct),
                "uptime": uptime,
                "timestamp": timestamp,
            })
            .to_string()
            .into_bytes(),
            UtilizationReport::Aggregate { cpu_pct } => {
                serde_json::json!({ "cpu_pct": finite(*cpu_pct) })
                    .to_string()
                    .into_bytes()
            }
            UtilizationReport::Passthrough(raw) => raw.as_bytes().to_vec(),
        }
    }
}

/// JSON has no NaN or infinity.
fn finite(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Body of a `/pods` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodCount {
    pub count: u64,
}

/// A JSON document kept as its original text.
///
/// Only constructible from bytes that parse as JSON, so forwarding it can
/// never emit a malformed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughBody(String);

impl PassthroughBody {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<serde::de::IgnoredAny>(body)?;
        // from_slice already rejected invalid UTF-8.
        Ok(Self(String::from_utf8_lossy(body).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}
