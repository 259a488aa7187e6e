//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Acquisition attempts and their outcomes
//! - Retrievals (started, completed, failed, cancelled)
//! - Deal proposals and commits
//! - Candidate cache refreshes

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Acquisition Metrics
// =============================================================================

/// Acquisition attempts total by outcome.
pub static ACQUISITION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dealbot_acquisition_attempts_total",
            "Total acquisition attempts",
        ),
        &["outcome"], // "acquired", "declined", "sourcing_failed", "idle", "error"
    )
    .unwrap()
});

/// Acquisition attempt duration in seconds.
pub static ACQUISITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dealbot_acquisition_duration_seconds",
            "Duration of one acquisition attempt",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Worker tasks currently running an attempt.
pub static WORKERS_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dealbot_workers_busy",
        "Number of worker tasks currently running an attempt",
    )
    .unwrap()
});

// =============================================================================
// Retrieval Metrics
// =============================================================================

/// Retrievals started.
pub static RETRIEVALS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dealbot_retrievals_started_total", "Retrievals started").unwrap()
});

/// Retrievals finished by result.
pub static RETRIEVALS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dealbot_retrievals_finished_total",
            "Retrievals finished by result",
        ),
        &["result"], // "completed", "rejected", "timeout", "failed"
    )
    .unwrap()
});

// =============================================================================
// Deal Metrics
// =============================================================================

/// Deal requests sent to the coordinator by response.
pub static DEAL_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dealbot_deal_requests_total",
            "Deal requests sent to the coordinator",
        ),
        &["response"], // "accepted", "declined"
    )
    .unwrap()
});

/// Archives handed to deal execution.
pub static DEALS_COMMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dealbot_deals_committed_total",
        "Archives handed to deal execution",
    )
    .unwrap()
});

// =============================================================================
// Candidate Cache Metrics
// =============================================================================

/// Candidate list refreshes by result.
pub static CACHE_REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dealbot_candidate_refreshes_total",
            "Candidate list refreshes",
        ),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ACQUISITION_ATTEMPTS.clone()),
        Box::new(ACQUISITION_DURATION.clone()),
        Box::new(WORKERS_BUSY.clone()),
        Box::new(RETRIEVALS_STARTED.clone()),
        Box::new(RETRIEVALS_FINISHED.clone()),
        Box::new(DEAL_REQUESTS.clone()),
        Box::new(DEALS_COMMITTED.clone()),
        Box::new(CACHE_REFRESHES.clone()),
    ]
}
