//! Liveness and readiness checks.
//!
//! Readiness flips once the store is reachable and the server is bound. A
//! cold snapshot cache does not make the service unready because queries
//! fall back to the store; the check body reports the cache state instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{HttpResponse, get, http::header, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SnapshotCache;

/// Health state shared with the server lifecycle.
pub struct HealthState {
    ready: AtomicBool,
    live: AtomicBool,
    cache: Option<Arc<SnapshotCache>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(false),
            live: AtomicBool::new(true),
            cache: None,
        }
    }
}

/// Body of the readiness check.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub ready: bool,
    pub snapshot_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_generated_at: Option<DateTime<Utc>>,
}

impl HealthState {
    /// Not ready, alive, without snapshot reporting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the given cache in readiness responses.
    pub fn with_snapshot_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Fail liveness so orchestrators stop routing while draining.
    pub fn mark_unhealthy(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn readiness(&self) -> ReadinessReport {
        let snapshot = self.cache.as_ref().and_then(|cache| cache.read());
        ReadinessReport {
            ready: self.is_ready(),
            snapshot_loaded: snapshot.is_some(),
            snapshot_generated_at: snapshot.map(|s| s.generated_at()),
        }
    }
}

fn status_for(ok: bool) -> actix_web::HttpResponseBuilder {
    let mut response = if ok {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    response.insert_header((header::CACHE_CONTROL, "no-store"));
    response
}

/// Readiness check. 200 once dependencies are initialised, 503 before.
#[utoipa::path(
    get,
    path = "/health/ready",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Server is ready to handle traffic", body = ReadinessReport),
        (status = 503, description = "Server is not ready", body = ReadinessReport)
    )
)]
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    let report = state.readiness();
    status_for(report.ready).json(report)
}

/// Liveness check. 200 while alive, 503 once draining.
#[utoipa::path(
    get,
    path = "/health/live",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Server is alive"),
        (status = 503, description = "Server is shutting down")
    )
)]
#[get("/health/live")]
pub async fn live(state: web::Data<HealthState>) -> HttpResponse {
    status_for(state.is_alive()).finish()
}
