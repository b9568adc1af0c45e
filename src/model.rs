use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Canonical `time24` rendering, the join key against persisted records.
pub const TIME24_FORMAT: &str = "%H:%M:%S";

/// Inclusive calendar range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn format_time24(time: NaiveTime) -> String {
    time.format(TIME24_FORMAT).to_string()
}

/// Band of the day a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Afternoon,
    Evening,
}

impl Period {
    /// Morning: before 12:00. Afternoon: 12:00–16:59. Evening: 17:00 onwards.
    pub fn of(time: NaiveTime) -> Self {
        match time.hour() {
            0..=11 => Period::Morning,
            12..=16 => Period::Afternoon,
            _ => Period::Evening,
        }
    }
}

/// One bookable granule of the day's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// `HHMM` of `time24`, e.g. `830` for 08:30.
    pub id: u16,
    pub time24: NaiveTime,
    pub display_label: String,
    pub period: Period,
}

impl TimeSlot {
    pub fn new(time24: NaiveTime) -> Self {
        Self {
            id: (time24.hour() * 100 + time24.minute()) as u16,
            time24,
            display_label: time24.format("%-I:%M %p").to_string(),
            period: Period::of(time24),
        }
    }

    pub fn time24_str(&self) -> String {
        format_time24(self.time24)
    }
}

/// A provider's stored decision for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time24: NaiveTime,
    pub available: bool,
}

impl AvailabilityRecord {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id,
            service_id: self.service_id,
            date: self.date,
            time24: self.time24,
        }
    }
}

/// A confirmed booking. Metadata is carried along but never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedRecord {
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time24: NaiveTime,
    pub client_name: Option<String>,
    pub service_title: Option<String>,
}

impl BookedRecord {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id,
            service_id: self.service_id,
            date: self.date,
            time24: self.time24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    Available,
    Unavailable,
    Booked,
}

impl SlotState {
    pub fn from_available(available: bool) -> Self {
        if available {
            SlotState::Available
        } else {
            SlotState::Unavailable
        }
    }
}

/// A catalog slot after merging bookings, explicit records and default policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSlot {
    #[serde(flatten)]
    pub slot: TimeSlot,
    pub state: SlotState,
    pub is_explicit: bool,
}

/// One provider's calendar for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarKey {
    pub provider_id: Ulid,
    pub service_id: Ulid,
}

/// The composite key an explicit record is unique on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time24: NaiveTime,
}

impl SlotKey {
    pub fn calendar(&self) -> CalendarKey {
        CalendarKey {
            provider_id: self.provider_id,
            service_id: self.service_id,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.provider_id,
            self.service_id,
            self.date,
            format_time24(self.time24)
        )
    }
}

/// A planned, not yet applied, write against the explicit-availability store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Upsert {
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time24: NaiveTime,
        available: bool,
    },
    /// `time24: None` clears every time on `date`.
    Delete {
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time24: Option<NaiveTime>,
    },
}

impl Intent {
    pub fn calendar(&self) -> CalendarKey {
        match self {
            Intent::Upsert {
                provider_id,
                service_id,
                ..
            }
            | Intent::Delete {
                provider_id,
                service_id,
                ..
            } => CalendarKey {
                provider_id: *provider_id,
                service_id: *service_id,
            },
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Intent::Upsert { date, .. } | Intent::Delete { date, .. } => *date,
        }
    }

    /// The single time this intent touches, `None` for a whole-day delete.
    pub fn time24(&self) -> Option<NaiveTime> {
        match self {
            Intent::Upsert { time24, .. } => Some(*time24),
            Intent::Delete { time24, .. } => *time24,
        }
    }
}

/// Output of a bulk planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    pub intents: Vec<Intent>,
    /// Dates the plan writes to, ascending; used for confirmation messaging.
    pub target_dates: Vec<NaiveDate>,
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    IntentsApplied {
        batch_id: Ulid,
        intents: Vec<Intent>,
    },
    BookingRecorded {
        booking: BookedRecord,
    },
    BookingCancelled {
        key: SlotKey,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_boundaries() {
        assert_eq!(Period::of(t(8, 0)), Period::Morning);
        assert_eq!(Period::of(t(11, 30)), Period::Morning);
        assert_eq!(Period::of(t(12, 0)), Period::Afternoon);
        assert_eq!(Period::of(t(16, 30)), Period::Afternoon);
        assert_eq!(Period::of(t(17, 0)), Period::Evening);
        assert_eq!(Period::of(t(20, 30)), Period::Evening);
    }

    #[test]
    fn time_slot_fields() {
        let slot = TimeSlot::new(t(8, 30));
        assert_eq!(slot.id, 830);
        assert_eq!(slot.time24_str(), "08:30:00");
        assert_eq!(slot.display_label, "8:30 AM");

        let evening = TimeSlot::new(t(20, 0));
        assert_eq!(evening.id, 2000);
        assert_eq!(evening.display_label, "8:00 PM");

        let noon = TimeSlot::new(t(12, 0));
        assert_eq!(noon.display_label, "12:00 PM");
    }

    #[test]
    fn weekend_detection() {
        assert!(is_weekend(d(2025, 3, 15))); // Saturday
        assert!(is_weekend(d(2025, 3, 16))); // Sunday
        assert!(!is_weekend(d(2025, 3, 17))); // Monday
    }

    #[test]
    fn date_range_days_inclusive() {
        let r = DateRange::new(d(2025, 2, 27), d(2025, 3, 2));
        let days: Vec<_> = r.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(r.len_days(), 4);
        assert_eq!(days[0], d(2025, 2, 27));
        assert_eq!(days[3], d(2025, 3, 2));
        assert!(r.contains(d(2025, 3, 1)));
        assert!(!r.contains(d(2025, 3, 3)));
    }

    #[test]
    fn single_day_range() {
        let r = DateRange::day(d(2025, 3, 17));
        assert_eq!(r.days().count(), 1);
    }

    #[test]
    fn intent_accessors() {
        let p = Ulid::new();
        let s = Ulid::new();
        let up = Intent::Upsert {
            provider_id: p,
            service_id: s,
            date: d(2025, 3, 17),
            time24: t(9, 0),
            available: false,
        };
        assert_eq!(up.calendar(), CalendarKey { provider_id: p, service_id: s });
        assert_eq!(up.date(), d(2025, 3, 17));
        assert_eq!(up.time24(), Some(t(9, 0)));

        let del = Intent::Delete {
            provider_id: p,
            service_id: s,
            date: d(2025, 3, 18),
            time24: None,
        };
        assert_eq!(del.time24(), None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::IntentsApplied {
            batch_id: Ulid::new(),
            intents: vec![Intent::Delete {
                provider_id: Ulid::new(),
                service_id: Ulid::new(),
                date: d(2025, 3, 15),
                time24: None,
            }],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn intent_json_shape() {
        let intent = Intent::Upsert {
            provider_id: Ulid::nil(),
            service_id: Ulid::nil(),
            date: d(2025, 3, 17),
            time24: t(9, 0),
            available: true,
        };
        let json = serde_json::to_value(&intent).unwrap();
        let row = &json["upsert"];
        assert_eq!(row["date"], "2025-03-17");
        assert_eq!(row["time24"], "09:00:00");
        assert_eq!(row["available"], true);
    }

    #[test]
    fn resolved_slot_json_is_flat() {
        let slot = ResolvedSlot {
            slot: TimeSlot::new(t(10, 0)),
            state: SlotState::Booked,
            is_explicit: false,
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["time24"], "10:00:00");
        assert_eq!(json["state"], "BOOKED");
        assert_eq!(json["period"], "morning");
    }
}
