//! HTTP metrics middleware and the Prometheus exporter endpoint.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder};
use std::time::Instant;

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("sublarr_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap();
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .ok();
    counter
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "sublarr_http_request_duration_seconds",
            "HTTP request duration",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
        &["method", "path"],
    )
    .unwrap();
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .ok();
    histogram
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "sublarr_http_requests_in_flight",
        "HTTP requests currently in flight",
    )
    .unwrap();
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .ok();
    gauge
});

/// Collapse dynamic path segments so label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                segment.to_string()
            } else if segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}".to_string()
            } else if segment.len() >= 32 && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
                "{id}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware tracking duration, count and in-flight gauge.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let status = response.status().as_u16().to_string();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// `/metrics` exporter.
pub async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/v1/wanted/42"), "/api/v1/wanted/{id}");
        assert_eq!(
            normalize_path("/api/v1/jobs/0b8f8a6e-5b76-4c6e-9a39-2f1f6a3f8e21"),
            "/api/v1/jobs/{id}"
        );
        assert_eq!(normalize_path("/api/v1/wanted"), "/api/v1/wanted");
    }
}
