//! Local sampler — this process's share of host CPU since the last report.
//!
//! Holds the only mutable shared state in the service: the previous
//! `CpuSample` and when it was taken. Each report reads fresh counters,
//! computes the delta and swaps the stored sample under one mutex, so two
//! concurrent reports can never interleave their read-modify-write.

use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use burnrate_core::config::SourceKind;
use burnrate_core::{CpuSample, SourceResult, UtilizationReport, compute_percent};

use crate::procfs::CpuCounters;
use crate::source::{BoxFuture, UtilizationSource};

struct LastSample {
    sample: CpuSample,
    taken_at: Instant,
}

pub struct LocalSampler {
    counters: Box<dyn CpuCounters>,
    last: Mutex<LastSample>,
}

impl LocalSampler {
    /// Create a sampler, taking the baseline sample immediately.
    pub fn new(counters: impl CpuCounters + 'static) -> Self {
        let sample = counters.read();
        debug!(
            total_jiffies = sample.total_jiffies,
            proc_jiffies = sample.proc_jiffies,
            "baseline cpu sample taken"
        );
        Self {
            counters: Box::new(counters),
            last: Mutex::new(LastSample {
                sample,
                taken_at: Instant::now(),
            }),
        }
    }

    /// Measure since the previous call (or construction) and replace the
    /// stored sample.
    pub fn sample(&self) -> UtilizationReport {
        let (cpu_pct, uptime) = {
            // A panic elsewhere cannot leave a torn sample; keep going.
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let now = self.counters.read();
            let taken_at = Instant::now();

            let cpu_pct = compute_percent(last.sample, now);
            let uptime = taken_at.duration_since(last.taken_at).as_secs();
            *last = LastSample {
                sample: now,
                taken_at,
            };
            (cpu_pct, uptime)
        };

        UtilizationReport::Local {
            cpu_pct,
            uptime,
            timestamp: epoch_millis(),
        }
    }

    /// The currently stored sample.
    pub fn last_sample(&self) -> CpuSample {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample
    }
}

impl UtilizationSource for LocalSampler {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn report(&self) -> BoxFuture<'_, SourceResult<UtilizationReport>> {
        Box::pin(async move { Ok(self.sample()) })
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
