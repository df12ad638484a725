//! Prometheus metrics for the ferry server.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Metrics carry no user, channel or upload identifiers, only aggregate
//! counts, but the endpoint should still be network-restricted to the
//! scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Registry holding every ferry metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_parts_uploaded_total",
        "Total number of parts transmitted, verified and recorded",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_bytes_uploaded_total",
        "Total bytes transmitted for recorded parts, after encryption",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_upload_failures_total",
            "Total failed part uploads by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static COMPENSATING_DELETES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_compensating_deletes_total",
            "Remote messages deleted after a failed upload, by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static TRANSPORT_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_transport_errors_total",
            "Transport errors that reached the orchestrator, by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static LEDGER_ROWS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_ledger_rows_swept_total",
        "Total ledger rows removed by the retention sweep",
    )
    .expect("metric creation failed")
});

pub static PART_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "ferry_part_upload_duration_seconds",
            "Time taken to upload, verify and record one part",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the registry.
///
/// Idempotent, so several routers can be built in one process.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PARTS_UPLOADED.clone()),
            Box::new(BYTES_UPLOADED.clone()),
            Box::new(UPLOAD_FAILURES.clone()),
            Box::new(COMPENSATING_DELETES.clone()),
            Box::new(TRANSPORT_ERRORS.clone()),
            Box::new(LEDGER_ROWS_SWEPT.clone()),
            Box::new(PART_UPLOAD_DURATION.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "metric registration failed");
            }
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_upload_failure(reason: &str) {
    UPLOAD_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_compensating_delete(outcome: &str) {
    COMPENSATING_DELETES.with_label_values(&[outcome]).inc();
}

pub fn record_transport_error(kind: &str) {
    TRANSPORT_ERRORS.with_label_values(&[kind]).inc();
}
