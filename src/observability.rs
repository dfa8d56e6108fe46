use std::net::SocketAddr;

use crate::engine::ErrorKind;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: core operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "salon_operations_total";

/// Histogram: core operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "salon_operation_duration_seconds";

/// Counter: booking status transitions. Labels: status.
pub const BOOKINGS_TOTAL: &str = "salon_bookings_total";

/// Counter: reservations lost at flip time.
pub const SLOT_CONFLICTS_TOTAL: &str = "salon_slot_conflicts_total";

/// Counter: schedules created.
pub const SCHEDULES_CREATED_TOTAL: &str = "salon_schedules_created_total";

/// Counter: time slots created, in bulk or singly.
pub const TIME_SLOTS_CREATED_TOTAL: &str = "salon_time_slots_created_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "salon_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (transactions per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "salon_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map an error kind to a short label for metrics.
pub fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::PermissionDenied => "permission_denied",
        ErrorKind::System => "system",
    }
}
