use chrono::{NaiveDate, NaiveTime};

use crate::model::{SlotKey, format_time24};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Replicate was asked to copy a day that has no explicit records.
    NoSourceData,
    /// Clear-all was asked to clear a day that has no explicit records.
    NothingToClear,
    InvalidDateRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    MalformedDate(String),
    MalformedTime(String),
    MalformedId(String),
    OffCatalog(NaiveTime),
    SlotBooked(NaiveTime),
    Conflict(NaiveTime),
    ToggleInFlight(SlotKey),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Precondition no-ops: the caller shows an informational message, not an error.
    pub fn is_informational(&self) -> bool {
        matches!(self, EngineError::NoSourceData | EngineError::NothingToClear)
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::NoSourceData => "no_source_data",
            EngineError::NothingToClear => "nothing_to_clear",
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::MalformedDate(_) => "malformed_date",
            EngineError::MalformedTime(_) => "malformed_time",
            EngineError::MalformedId(_) => "malformed_id",
            EngineError::OffCatalog(_) => "off_catalog",
            EngineError::SlotBooked(_) => "slot_booked",
            EngineError::Conflict(_) => "conflict",
            EngineError::ToggleInFlight(_) => "toggle_in_flight",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoSourceData => write!(f, "nothing to replicate: source day has no availability set"),
            EngineError::NothingToClear => write!(f, "nothing to clear: day has no availability set"),
            EngineError::InvalidDateRange { start, end } => {
                write!(f, "invalid date range [{start}, {end}]")
            }
            EngineError::MalformedDate(s) => write!(f, "malformed date: {s:?}"),
            EngineError::MalformedTime(s) => write!(f, "malformed time: {s:?}"),
            EngineError::MalformedId(s) => write!(f, "malformed id: {s:?}"),
            EngineError::OffCatalog(t) => {
                write!(f, "{} is not a bookable slot", format_time24(*t))
            }
            EngineError::SlotBooked(t) => {
                write!(f, "slot {} is booked and cannot be changed", format_time24(*t))
            }
            EngineError::Conflict(t) => {
                write!(f, "slot {} is not open for booking", format_time24(*t))
            }
            EngineError::ToggleInFlight(key) => write!(f, "toggle already in flight: {key}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
