use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "baycheck_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "baycheck_query_duration_seconds";

/// Counter: availability checks. Labels: outcome (available, booking, block, closure, unknown).
pub const CHECKS_TOTAL: &str = "baycheck_checks_total";

/// Histogram: fetch-and-check latency in seconds.
pub const CHECK_DURATION_SECONDS: &str = "baycheck_check_duration_seconds";

/// Counter: probe outcomes discarded because a newer check had started.
pub const STALE_CHECKS_TOTAL: &str = "baycheck_stale_checks_total";

/// Counter: failed backend requests. Labels: endpoint.
pub const FEED_FAILURES_TOTAL: &str = "baycheck_feed_failures_total";

/// Counter: pending-request sweeps. Labels: status.
pub const SWEEPS_TOTAL: &str = "baycheck_sweeps_total";

/// Gauge: pending requests that conflicted in the last sweep.
pub const PENDING_CONFLICTS: &str = "baycheck_pending_conflicts";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "baycheck_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "baycheck_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "baycheck_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectFreeWindows { .. } => "select_free_windows",
        Command::SelectClosures { .. } => "select_closures",
        Command::SelectResources => "select_resources",
        Command::SelectAffectedAreas { .. } => "select_affected_areas",
        Command::SelectPendingReviews => "select_pending_reviews",
    }
}
