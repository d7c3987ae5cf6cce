use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::state::AppState;

/// Process-local Prometheus registry and the series this service records.
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_latency: HistogramVec,
    searches: IntCounterVec,
    auth_events: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status"),
            &["method", "path", "status"],
        )?;
        let http_latency = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency by route",
            ),
            &["method", "path"],
        )?;
        let searches = IntCounterVec::new(
            Opts::new("search_requests_total", "Provider lookups by kind and outcome"),
            &["kind", "outcome"],
        )?;
        let auth_events = IntCounterVec::new(
            Opts::new("auth_events_total", "Registrations, logins and rejected tokens"),
            &["event"],
        )?;

        registry
            .register(Box::new(http_requests.clone()))
            .context("register http_requests_total")?;
        registry
            .register(Box::new(http_latency.clone()))
            .context("register http_request_duration_seconds")?;
        registry
            .register(Box::new(searches.clone()))
            .context("register search_requests_total")?;
        registry
            .register(Box::new(auth_events.clone()))
            .context("register auth_events_total")?;

        Ok(Self {
            registry,
            http_requests,
            http_latency,
            searches,
            auth_events,
        })
    }

    pub fn search(&self, kind: &str, outcome: &str) {
        self.searches.with_label_values(&[kind, outcome]).inc();
    }

    pub fn auth_event(&self, event: &str) {
        self.auth_events.with_label_values(&[event]).inc();
    }

    fn observe(&self, method: &str, path: &str, status: u16, secs: f64) {
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_latency
            .with_label_values(&[method, path])
            .observe(secs);
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("encode metrics")?;
        String::from_utf8(buf).context("metrics are not utf-8")
    }
}

/// Records count and latency per matched route; unmatched paths share one label.
pub async fn track(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();

    let started = Instant::now();
    let response = next.run(req).await;
    state.metrics.observe(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, "render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
