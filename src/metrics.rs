// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the service, scraped from GET /metrics.
//
// - HTTP traffic is recorded once per request by the `track_http` middleware,
//   labelled with the matched route template (not the raw path, so product ids
//   don't explode the label cardinality)
// - Domain events (counts submitted, emails sent) and stock levels are
//   recorded by the handlers through the helpers below
// =============================================================================

use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================
// snake_case, unit suffix (_seconds), _total for counters.

/// HTTP request counter
/// Labels: method, endpoint (route template), status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram
/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Units on hand per product key
/// Labels: sku
pub const PRODUCT_STOCK_LEVEL: &str = "citapp_product_stock_level";

/// Physical counts submitted by employees
/// Labels: outcome (match/discrepancy)
pub const VERIFICATIONS_TOTAL: &str = "citapp_verifications_total";

/// Transactional emails dispatched
/// Labels: template (recovery/discrepancy), outcome (sent/failed/skipped)
pub const EMAILS_TOTAL: &str = "citapp_emails_total";

/// Database query duration histogram
/// Labels: operation (select/insert/update)
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Redis operation duration histogram
/// Labels: operation (get/set/delete/exists)
pub const REDIS_OPERATION_DURATION_SECONDS: &str = "redis_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the global Prometheus recorder
///
/// # Returns
/// * `PrometheusHandle` - renders the exposition text for /metrics
pub fn setup_metrics() -> Result<PrometheusHandle> {
    // 1ms .. 10s
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(REDIS_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );

    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request latency in seconds"
    );

    describe_gauge!(
        PRODUCT_STOCK_LEVEL,
        "Units on hand for each product key"
    );

    describe_counter!(
        VERIFICATIONS_TOTAL,
        "Physical inventory counts submitted, by outcome"
    );

    describe_counter!(EMAILS_TOTAL, "Transactional emails, by template and outcome");

    describe_histogram!(
        DB_QUERY_DURATION_SECONDS,
        "Database query latency in seconds"
    );

    describe_histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "Redis operation latency in seconds"
    );

    Ok(handle)
}

// =============================================================================
// HTTP MIDDLEWARE
// =============================================================================
/// Records count and latency of every routed request
///
/// Installed with `route_layer` so `MatchedPath` is available; unmatched
/// requests (404 from the fallback) are not recorded.
pub async fn track_http(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );

    response
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Record an HTTP request
///
/// # Arguments
/// * `method` - HTTP method (GET, POST, etc.)
/// * `endpoint` - Route template (/api/v1/products/:id)
/// * `status` - Response status code (200, 404, 500)
/// * `duration_secs` - Request duration in seconds
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn set_stock_level(sku: &str, quantity: i32) {
    gauge!(PRODUCT_STOCK_LEVEL, "sku" => sku.to_string()).set(quantity as f64);
}

/// Record a submitted count
pub fn record_verification(matches: bool) {
    counter!(VERIFICATIONS_TOTAL, "outcome" => verification_outcome(matches)).increment(1);
}

fn verification_outcome(matches: bool) -> &'static str {
    if matches {
        "match"
    } else {
        "discrepancy"
    }
}

/// Record an email dispatch attempt
///
/// # Arguments
/// * `template` - "recovery" or "discrepancy"
/// * `outcome` - "sent", "failed" or "skipped" (email disabled / no recipients)
pub fn record_email(template: &'static str, outcome: &'static str) {
    counter!(EMAILS_TOTAL, "template" => template, "outcome" => outcome).increment(1);
}

/// Record database query duration
pub fn record_db_query(operation: &str, duration_secs: f64) {
    histogram!(
        DB_QUERY_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record Redis operation duration
pub fn record_redis_operation(operation: &str, duration_secs: f64) {
    histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
