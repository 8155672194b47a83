//! Prometheus metrics for the edutrack server
//!
//! This module provides metrics tracking for:
//! - API: requests by route and status, request duration
//! - Sync: runs by outcome, records created/skipped by kind, run duration
//! - Progress: reconciliations and completion flag changes
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

/// Container for sync and progress metrics
struct DomainMetrics {
    sync_runs: CounterVec,
    sync_records: CounterVec,
    sync_duration: Histogram,
    reconciliations: Counter,
    completion_changes: Counter,
    section_updates: CounterVec,
}

/// Global storage for API metrics
static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Global storage for domain metrics
static DOMAIN_METRICS: OnceLock<DomainMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = edutrack::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "edutrack_api_requests_total",
            "Total API requests by route and status",
            &["route", "status"]
        )?,
        duration: register_histogram_vec!(
            "edutrack_api_request_duration_seconds",
            "API request duration in seconds",
            &["route"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
    };

    let domain = DomainMetrics {
        sync_runs: register_counter_vec!(
            "edutrack_sync_runs_total",
            "Total CRM sync runs by outcome",
            &["outcome"]
        )?,
        sync_records: register_counter_vec!(
            "edutrack_sync_records_total",
            "CRM records processed by kind and result",
            &["kind", "result"]
        )?,
        sync_duration: register_histogram!(
            "edutrack_sync_duration_seconds",
            "Duration of completed CRM sync runs in seconds",
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
        )?,
        reconciliations: register_counter!(
            "edutrack_reconciliations_total",
            "Total course completion reconciliations"
        )?,
        completion_changes: register_counter!(
            "edutrack_completion_changes_total",
            "Enrollment completion flags changed by reconciliation"
        )?,
        section_updates: register_counter_vec!(
            "edutrack_section_updates_total",
            "Section completion updates by new state",
            &["completed"]
        )?,
    };

    API_METRICS.set(api).map_err(|_| "API metrics already initialized")?;
    DOMAIN_METRICS
        .set(domain)
        .map_err(|_| "Domain metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    API_METRICS.get().is_some() && DOMAIN_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record API request
pub fn record_api_request(route: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests.with_label_values(&[route, &status_str]).inc();
    m.duration.with_label_values(&[route]).observe(duration_secs);
}

/// Record the outcome of a sync run (`completed`, `skipped`, `failed`)
pub fn record_sync_run(outcome: &str, duration_secs: Option<f64>) {
    let Some(m) = DOMAIN_METRICS.get() else {
        return;
    };

    m.sync_runs.with_label_values(&[outcome]).inc();
    if let Some(secs) = duration_secs {
        m.sync_duration.observe(secs);
    }
}

/// Record created and skipped CRM records of one kind
pub fn record_sync_records(kind: &str, created: usize, skipped: usize) {
    let Some(m) = DOMAIN_METRICS.get() else {
        return;
    };

    if created > 0 {
        m.sync_records
            .with_label_values(&[kind, "created"])
            .inc_by(created as f64);
    }
    if skipped > 0 {
        m.sync_records
            .with_label_values(&[kind, "skipped"])
            .inc_by(skipped as f64);
    }
}

/// Record a reconciliation and how many completion flags it flipped
pub fn record_reconciliation(changed: usize) {
    let Some(m) = DOMAIN_METRICS.get() else {
        return;
    };

    m.reconciliations.inc();
    if changed > 0 {
        m.completion_changes.inc_by(changed as f64);
    }
}

/// Record a section completion update
pub fn record_section_update(is_completed: bool) {
    if let Some(m) = DOMAIN_METRICS.get() {
        m.section_updates
            .with_label_values(&[if is_completed { "true" } else { "false" }])
            .inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
