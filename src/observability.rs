// Metric names. The host application installs the recorder/exporter.

// ── Engine ──────────────────────────────────────────────────────

/// Counter: bulk and toggle plans. Labels: op, status.
pub const PLANS_TOTAL: &str = "slotgrid_plans_total";

/// Histogram: fetch + resolve latency for one day view, in seconds.
pub const RESOLVE_DURATION_SECONDS: &str = "slotgrid_resolve_duration_seconds";

/// Counter: toggles rejected because the same slot already had one in flight.
pub const TOGGLE_REJECTED_TOTAL: &str = "slotgrid_toggle_rejected_total";

// ── Store ───────────────────────────────────────────────────────

/// Counter: intents durably applied.
pub const INTENTS_APPLIED_TOTAL: &str = "slotgrid_intents_applied_total";

/// Counter: bookings recorded.
pub const BOOKINGS_TOTAL: &str = "slotgrid_bookings_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotgrid_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotgrid_wal_flush_batch_size";

/// Caller-facing operations, used as the `op` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Toggle,
    Replicate,
    WeekendsOff,
    ClearAll,
}

impl Op {
    pub fn label(self) -> &'static str {
        match self {
            Op::Toggle => "toggle",
            Op::Replicate => "replicate",
            Op::WeekendsOff => "weekends_off",
            Op::ClearAll => "clear_all",
        }
    }
}

/// Count one plan outcome. Informational no-ops are not failures.
pub fn record_plan<T>(op: Op, result: &Result<T, crate::engine::EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) if e.is_informational() => "noop",
        Err(e) => e.label(),
    };
    metrics::counter!(PLANS_TOTAL, "op" => op.label(), "status" => status).increment(1);
}
