//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Provider searches and downloads
//! - Translation chain calls and quality
//! - The acquisition pipeline
//! - Event dispatch

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Provider metrics
// =============================================================================

/// Provider searches by provider and result.
pub static PROVIDER_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_provider_searches_total",
            "Total provider search attempts",
        ),
        &["provider", "result"], // "hit", "empty", "error", "cached"
    )
    .unwrap()
});

/// Provider search duration.
pub static PROVIDER_SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sublarr_provider_search_duration_seconds",
            "Duration of provider searches",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
        &["provider"],
    )
    .unwrap()
});

/// Subtitle downloads by provider and result.
pub static SUBTITLE_DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_subtitle_downloads_total",
            "Total subtitle downloads",
        ),
        &["provider", "result"],
    )
    .unwrap()
});

// =============================================================================
// Translation metrics
// =============================================================================

/// Backend translation calls by backend and result.
pub static TRANSLATION_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_translation_calls_total",
            "Total translation backend calls",
        ),
        &["backend", "result"],
    )
    .unwrap()
});

/// Lines translated, by source of the text (backend vs memory).
pub static LINES_TRANSLATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sublarr_lines_translated_total", "Total lines translated"),
        &["source"], // "backend", "memory"
    )
    .unwrap()
});

/// Quality scores of translated batches.
pub static TRANSLATION_QUALITY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sublarr_translation_quality",
            "Average self-evaluated quality per batch",
        )
        .buckets(vec![10.0, 25.0, 50.0, 70.0, 85.0, 95.0, 100.0]),
        &["backend"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline metrics
// =============================================================================

/// Processed wanted items by case and outcome.
pub static WANTED_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_wanted_processed_total",
            "Wanted items processed to a terminal state",
        ),
        &["case", "outcome"],
    )
    .unwrap()
});

/// Current circuit breaker state per identity (0 closed, 1 half-open, 2 open).
pub static BREAKER_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("sublarr_breaker_state", "Circuit breaker state"),
        &["kind", "identity"],
    )
    .unwrap()
});

// =============================================================================
// Event metrics
// =============================================================================

/// Events dispatched to subscribers.
pub static EVENTS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sublarr_events_dispatched_total", "Events dispatched"),
        &["event", "subscriber"],
    )
    .unwrap()
});

/// Register all core metrics with a registry.
pub fn register_core_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(PROVIDER_SEARCHES.clone()))?;
    registry.register(Box::new(PROVIDER_SEARCH_DURATION.clone()))?;
    registry.register(Box::new(SUBTITLE_DOWNLOADS.clone()))?;
    registry.register(Box::new(TRANSLATION_CALLS.clone()))?;
    registry.register(Box::new(LINES_TRANSLATED.clone()))?;
    registry.register(Box::new(TRANSLATION_QUALITY.clone()))?;
    registry.register(Box::new(WANTED_PROCESSED.clone()))?;
    registry.register(Box::new(BREAKER_STATE.clone()))?;
    registry.register(Box::new(EVENTS_DISPATCHED.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_core_metrics() {
        let registry = prometheus::Registry::new();
        register_core_metrics(&registry).unwrap();

        PROVIDER_SEARCHES.with_label_values(&["os", "hit"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "sublarr_provider_searches_total"));
    }
}
