//! burnrate-api — HTTP surface of the burnrate service.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/compute?ms=N` | Burn one core for ~N ms, then `ok` |
//! | GET | `/healthz` | Liveness, always `ok` |
//! | GET | `/metrics` | CPU utilization JSON from the configured source |
//! | GET | `/pods` | `{"count": n}` of workload pods, cluster sources only |
//! | GET | `/*` | Static files from `static_dir` |

pub mod handlers;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::services::ServeDir;

use burnrate_core::config::ComputeConfig;
use burnrate_metrics::UtilizationSource;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub source: Arc<dyn UtilizationSource>,
    pub compute: ComputeConfig,
}

impl ApiState {
    pub fn new(source: Arc<dyn UtilizationSource>, compute: ComputeConfig) -> Self {
        Self { source, compute }
    }
}

/// Build the complete router. Unmatched paths fall through to
/// `static_dir` when one is given.
pub fn build_router(state: ApiState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/compute", get(handlers::compute))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/pods", get(handlers::pods))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
