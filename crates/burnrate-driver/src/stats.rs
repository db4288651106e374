//! Lock-free counters shared by the driver loop and its users.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one driver run. `completed` and the latency sum are per
/// tick; everything else accumulates.
#[derive(Debug, Default)]
pub struct DriverStats {
    in_flight: AtomicU64,
    completed: AtomicU64,
    latency_us: AtomicU64,
    completed_total: AtomicU64,
    errors_total: AtomicU64,
}

/// What one tick saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSnapshot {
    pub in_flight: u64,
    pub completed: u64,
    pub errors_total: u64,
    /// Mean latency of requests completed in this tick, 0 if none.
    pub mean_ms: f64,
}

impl DriverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an in-flight slot if fewer than `target` are taken.
    pub fn try_acquire(&self, target: u64) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < target).then_some(cur + 1)
            })
            .is_ok()
    }

    pub fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| cur.checked_sub(1));
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn record_success(&self, latency: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.completed_total.fetch_add(1, Ordering::Relaxed);
        self.latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Read the tick counters and reset them for the next window.
    pub fn take_tick(&self) -> TickSnapshot {
        let completed = self.completed.swap(0, Ordering::Relaxed);
        let latency_us = self.latency_us.swap(0, Ordering::Relaxed);
        let mean_ms = if completed > 0 {
            latency_us as f64 / completed as f64 / 1000.0
        } else {
            0.0
        };

        TickSnapshot {
            in_flight: self.in_flight(),
            completed,
            errors_total: self.errors_total(),
            mean_ms,
        }
    }
}
