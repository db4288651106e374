//! The driver loop and simulated users.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use burnrate_metrics::{ApiClient, Trust};

use crate::stats::DriverStats;

/// Time limit for the `/metrics` and `/pods` polls. Compute requests have
/// none since they are expected to take as long as they ask for.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base URL of the service, e.g. `http://127.0.0.1:8080`.
    pub target: String,
    /// Upper bound on concurrent `/compute` requests.
    pub users: u64,
    /// `ms` passed to `/compute`.
    pub work_ms: u64,
    /// Stop after this long; run until shutdown when `None`.
    pub duration: Option<Duration>,
    pub interval: Duration,
    pub think_min_ms: u64,
    pub think_max_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target: "http://127.0.0.1:8080".to_string(),
            users: 10,
            work_ms: 2000,
            duration: None,
            interval: Duration::from_millis(500),
            think_min_ms: 200,
            think_max_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

/// Compare consecutive pod counts. The first observation is not an event.
pub fn scale_direction(previous: Option<u64>, current: u64) -> Option<ScaleDirection> {
    match previous {
        Some(prev) if current > prev => Some(ScaleDirection::Up),
        Some(prev) if current < prev => Some(ScaleDirection::Down),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSummary {
    pub ticks: u64,
    pub completed: u64,
    pub errors: u64,
}

pub struct LoadDriver {
    config: DriverConfig,
    compute: Arc<ApiClient>,
    probe: ApiClient,
    stats: Arc<DriverStats>,
}

impl LoadDriver {
    pub fn new(config: DriverConfig) -> anyhow::Result<Self> {
        if config.interval.is_zero() {
            anyhow::bail!("tick interval must be non-zero");
        }
        if config.think_min_ms > config.think_max_ms {
            anyhow::bail!(
                "think time min ({}ms) exceeds max ({}ms)",
                config.think_min_ms,
                config.think_max_ms
            );
        }

        let compute = ApiClient::new(&config.target, Trust::WebPkiRoots)?;
        let probe =
            ApiClient::new(&config.target, Trust::WebPkiRoots)?.with_timeout(Some(POLL_TIMEOUT));

        Ok(Self {
            config,
            compute: Arc::new(compute),
            probe,
            stats: Arc::new(DriverStats::new()),
        })
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Run until the configured duration elapses or `shutdown` fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DriverSummary {
        info!(
            url = %self.config.target,
            users = self.config.users,
            work_ms = self.config.work_ms,
            interval_ms = self.config.interval.as_millis() as u64,
            "load driver started"
        );

        let duration = self.config.duration;
        let expiry = async move {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut users = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.interval);
        let mut last_pods = None;
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while users.try_join_next().is_some() {}
                    self.top_up(&mut users);
                    last_pods = self.tick(last_pods).await;
                    ticks += 1;
                }
                _ = &mut expiry => {
                    info!("load duration elapsed");
                    break;
                }
                _ = shutdown.changed() => {
                    info!("load driver shutting down");
                    break;
                }
            }
        }

        users.abort_all();

        let summary = DriverSummary {
            ticks,
            completed: self.stats.completed_total(),
            errors: self.stats.errors_total(),
        };
        info!(
            ticks = summary.ticks,
            completed = summary.completed,
            errors = summary.errors,
            "load driver stopped"
        );
        summary
    }

    /// Start a user for every free slot.
    fn top_up(&self, users: &mut JoinSet<()>) {
        let path = format!("/compute?ms={}", self.config.work_ms);
        while self.stats.try_acquire(self.config.users) {
            users.spawn(user(
                Arc::clone(&self.compute),
                Arc::clone(&self.stats),
                path.clone(),
                self.config.users,
                (self.config.think_min_ms, self.config.think_max_ms),
            ));
        }
    }

    async fn tick(&self, last_pods: Option<u64>) -> Option<u64> {
        let snapshot = self.stats.take_tick();
        let cpu_pct = self.poll_cpu().await;
        let pods = self.poll_pods().await;

        info!(
            in_flight = snapshot.in_flight,
            completed = snapshot.completed,
            errors = snapshot.errors_total,
            mean_ms = snapshot.mean_ms,
            cpu_pct = ?cpu_pct,
            pods = ?pods,
            "tick"
        );

        let Some(current) = pods else {
            return last_pods;
        };
        match scale_direction(last_pods, current) {
            Some(ScaleDirection::Up) => info!(from = ?last_pods, to = current, "scale up"),
            Some(ScaleDirection::Down) => info!(from = ?last_pods, to = current, "scale down"),
            None => {}
        }
        Some(current)
    }

    async fn poll_cpu(&self) -> Option<f64> {
        match self.probe.get("/metrics").await {
            Ok(body) => parse_cpu_pct(&body),
            Err(e) => {
                warn!(error = %e, "metrics poll failed");
                None
            }
        }
    }

    async fn poll_pods(&self) -> Option<u64> {
        match self.probe.get("/pods").await {
            Ok(body) => parse_pod_count(&body),
            Err(e) => {
                debug!(error = %e, "pods poll failed");
                None
            }
        }
    }
}

/// One simulated user. Enters holding a slot; gives it up after each
/// response and only goes again if a slot is still free after thinking.
async fn user(
    client: Arc<ApiClient>,
    stats: Arc<DriverStats>,
    path: String,
    target: u64,
    (think_min_ms, think_max_ms): (u64, u64),
) {
    loop {
        let started = Instant::now();
        match client.get(&path).await {
            Ok(_) => stats.record_success(started.elapsed()),
            Err(e) => {
                debug!(error = %e, "compute request failed");
                stats.record_error();
            }
        }
        stats.release();

        let think_ms = rand::thread_rng().gen_range(think_min_ms..=think_max_ms);
        tokio::time::sleep(Duration::from_millis(think_ms)).await;

        if !stats.try_acquire(target) {
            break;
        }
    }
}

/// `cpu_pct` from a `/metrics` body. Absent for forwarded node summaries.
fn parse_cpu_pct(body: &[u8]) -> Option<f64> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("cpu_pct")?.as_f64()
}

fn parse_pod_count(body: &[u8]) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("count")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use axum::Router;
    use axum::routing::get;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[derive(Default)]
    struct Observed {
        active: AtomicU64,
        peak: AtomicU64,
        pods_polls: AtomicU64,
    }

    fn fake_service(observed: Arc<Observed>) -> Router {
        let compute = Arc::clone(&observed);
        let pods = Arc::clone(&observed);
        Router::new()
            .route(
                "/compute",
                get(move || {
                    let observed = Arc::clone(&compute);
                    async move {
                        let now = observed.active.fetch_add(1, Ordering::SeqCst) + 1;
                        observed.peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        observed.active.fetch_sub(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .route("/metrics", get(|| async { r#"{"cpu_pct": 42.5}"# }))
            .route(
                "/pods",
                get(move || {
                    let observed = Arc::clone(&pods);
                    async move {
                        let n = observed.pods_polls.fetch_add(1, Ordering::SeqCst);
                        format!(r#"{{"count": {}}}"#, 1 + n / 2)
                    }
                }),
            )
    }

    fn config(target: String) -> DriverConfig {
        DriverConfig {
            target,
            users: 3,
            work_ms: 20,
            duration: Some(Duration::from_millis(600)),
            interval: Duration::from_millis(50),
            think_min_ms: 0,
            think_max_ms: 5,
        }
    }

    #[test]
    fn scale_direction_compares_counts() {
        assert_eq!(scale_direction(None, 3), None);
        assert_eq!(scale_direction(Some(3), 3), None);
        assert_eq!(scale_direction(Some(3), 5), Some(ScaleDirection::Up));
        assert_eq!(scale_direction(Some(5), 1), Some(ScaleDirection::Down));
    }

    #[test]
    fn parses_poll_bodies() {
        assert_eq!(parse_cpu_pct(br#"{"cpu_pct": 12.5, "uptime": 3}"#), Some(12.5));
        assert_eq!(parse_cpu_pct(br#"{"node": {}}"#), None);
        assert_eq!(parse_cpu_pct(b"not json"), None);
        assert_eq!(parse_pod_count(br#"{"count": 4}"#), Some(4));
        assert_eq!(parse_pod_count(br#"{"error": "no pod view"}"#), None);
    }

    #[test]
    fn rejects_bad_config() {
        let mut c = config("http://127.0.0.1:1".to_string());
        c.think_min_ms = 10;
        c.think_max_ms = 1;
        assert!(LoadDriver::new(c).is_err());

        let mut c = config("http://127.0.0.1:1".to_string());
        c.interval = Duration::ZERO;
        assert!(LoadDriver::new(c).is_err());

        assert!(LoadDriver::new(config("ftp://example".to_string())).is_err());
    }

    #[tokio::test]
    async fn never_exceeds_target_users() {
        let observed = Arc::new(Observed::default());
        let base = serve(fake_service(Arc::clone(&observed))).await;

        let driver = LoadDriver::new(config(base)).unwrap();
        let (_tx, rx) = watch::channel(false);
        let summary = driver.run(rx).await;

        assert!(summary.ticks >= 2, "ticks: {}", summary.ticks);
        assert!(summary.completed > 0);
        assert_eq!(summary.errors, 0);
        assert!(observed.peak.load(Ordering::SeqCst) <= 3);
        assert!(observed.pods_polls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let observed = Arc::new(Observed::default());
        let base = serve(fake_service(observed)).await;

        let mut c = config(base);
        c.duration = None;
        let driver = LoadDriver::new(c).unwrap();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), driver.run(rx))
            .await
            .unwrap();
        assert!(summary.ticks >= 1);
    }

    #[tokio::test]
    async fn unreachable_target_counts_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut c = config(format!("http://{addr}"));
        c.duration = Some(Duration::from_millis(300));
        let driver = LoadDriver::new(c).unwrap();
        let (_tx, rx) = watch::channel(false);
        let summary = driver.run(rx).await;

        assert_eq!(summary.completed, 0);
        assert!(summary.errors > 0);
    }
}
