use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── Conflict detection ──────────────────────────────────────────

/// Counter: conflict checks run. Labels: outcome (conflict, clear, error).
pub const CONFLICT_CHECKS_TOTAL: &str = "slotguard_conflict_checks_total";

/// Counter: conflicting records reported across all checks.
pub const CONFLICTS_FOUND_TOTAL: &str = "slotguard_conflicts_found_total";

/// Histogram: conflict check latency in seconds.
pub const CONFLICT_CHECK_DURATION_SECONDS: &str = "slotguard_conflict_check_duration_seconds";

/// Counter: failed store fetches. Labels: kind.
pub const STORE_FETCH_FAILURES_TOTAL: &str = "slotguard_store_fetch_failures_total";

// ── SQL front end ───────────────────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotguard_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotguard_query_duration_seconds";

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotguard_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotguard_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotguard_connections_rejected_total";

/// Install the Prometheus exporter on `port`. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertAppointments(_) => "insert_appointments",
        Command::InsertBlocks(_) => "insert_blocks",
        Command::InsertBookingItems(_) => "insert_booking_items",
        Command::SetStatus { .. } => "set_status",
        Command::Delete { .. } => "delete",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::SelectBlocks { .. } => "select_blocks",
        Command::SelectBookingItems(_) => "select_booking_items",
        Command::SelectConflicts(_) => "select_conflicts",
    }
}
