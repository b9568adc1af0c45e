use chrono::{NaiveTime, Timelike};

use crate::model::TimeSlot;

// ── Slot Catalog ──────────────────────────────────────────────────

/// First bookable slot of the day, in minutes after midnight (08:00).
pub const DAY_START_MIN: u32 = 8 * 60;
/// Last bookable slot of the day, in minutes after midnight (20:30).
pub const DAY_END_MIN: u32 = 20 * 60 + 30;
pub const SLOT_MINUTES: u32 = 30;
pub const SLOTS_PER_DAY: usize = ((DAY_END_MIN - DAY_START_MIN) / SLOT_MINUTES + 1) as usize;

/// The day's bookable slots in ascending time order.
///
/// Pure: every call yields an element-wise equal sequence. Callers that need
/// reference stability hold on to one copy themselves.
pub fn generate_catalog() -> Vec<TimeSlot> {
    (DAY_START_MIN..=DAY_END_MIN)
        .step_by(SLOT_MINUTES as usize)
        .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
        .map(TimeSlot::new)
        .collect()
}

/// True if `time` is exactly one of the catalog's slot times.
pub fn catalog_contains(time: NaiveTime) -> bool {
    let minutes = time.hour() * 60 + time.minute();
    time.second() == 0
        && time.nanosecond() == 0
        && (DAY_START_MIN..=DAY_END_MIN).contains(&minutes)
        && (minutes - DAY_START_MIN) % SLOT_MINUTES == 0
}
