use chrono::{Months, NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::DateRange;

use super::EngineError;

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::MalformedDate(s.to_string()))
}

/// Parse a slot time. Accepts `HH:MM:SS` (canonical) and `HH:MM`.
pub fn parse_time24(s: &str) -> Result<NaiveTime, EngineError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| EngineError::MalformedTime(s.to_string()))
}

pub fn parse_id(s: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(s.trim()).map_err(|_| EngineError::MalformedId(s.to_string()))
}

pub fn check_occurrences(occurrences: u32) -> Result<(), EngineError> {
    if occurrences == 0 {
        return Err(EngineError::LimitExceeded("occurrences must be at least 1"));
    }
    if occurrences > MAX_REPLICATE_OCCURRENCES {
        return Err(EngineError::LimitExceeded("too many occurrences"));
    }
    Ok(())
}

/// `[start, start + months]`, rejecting an empty or out-of-range horizon.
pub fn horizon_range(start: NaiveDate, months: u32) -> Result<DateRange, EngineError> {
    if months > MAX_WEEKEND_HORIZON_MONTHS {
        return Err(EngineError::LimitExceeded("horizon too far"));
    }
    let end = start
        .checked_add_months(Months::new(months))
        .ok_or(EngineError::InvalidDateRange { start, end: start })?;
    if months == 0 {
        return Err(EngineError::InvalidDateRange { start, end });
    }
    Ok(DateRange::new(start, end))
}

/// Validate a fetch window.
pub fn fetch_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    if end < start {
        return Err(EngineError::InvalidDateRange { start, end });
    }
    let range = DateRange::new(start, end);
    if range.len_days() > MAX_FETCH_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("fetch window too wide"));
    }
    Ok(range)
}

pub fn check_label(label: Option<&str>) -> Result<(), EngineError> {
    match label {
        Some(l) if l.len() > MAX_LABEL_LEN => Err(EngineError::LimitExceeded("label too long")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_date_accepts_iso() {
        assert_eq!(parse_date("2025-03-15").unwrap(), d(2025, 3, 15));
        assert_eq!(parse_date(" 2025-03-15 ").unwrap(), d(2025, 3, 15));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(
            parse_date("2025-02-30"),
            Err(EngineError::MalformedDate("2025-02-30".into()))
        );
        assert!(parse_date("15/03/2025").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn parse_time_both_forms() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(parse_time24("09:00:00").unwrap(), nine);
        assert_eq!(parse_time24("09:00").unwrap(), nine);
        assert!(matches!(parse_time24("9am"), Err(EngineError::MalformedTime(_))));
        assert!(parse_time24("25:00:00").is_err());
    }

    #[test]
    fn parse_id_roundtrip() {
        let id = Ulid::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_id("not-an-id"), Err(EngineError::MalformedId(_))));
    }

    #[test]
    fn occurrences_bounds() {
        assert!(check_occurrences(1).is_ok());
        assert!(check_occurrences(MAX_REPLICATE_OCCURRENCES).is_ok());
        assert!(check_occurrences(0).is_err());
        assert!(check_occurrences(MAX_REPLICATE_OCCURRENCES + 1).is_err());
    }

    #[test]
    fn horizon_adds_calendar_months() {
        let r = horizon_range(d(2025, 3, 1), 1).unwrap();
        assert_eq!(r.end, d(2025, 4, 1));
        // Month-end clamps rather than overflowing into the next month.
        let r = horizon_range(d(2025, 1, 31), 1).unwrap();
        assert_eq!(r.end, d(2025, 2, 28));
    }

    #[test]
    fn horizon_zero_is_invalid_range() {
        assert!(matches!(
            horizon_range(d(2025, 3, 1), 0),
            Err(EngineError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            horizon_range(d(2025, 3, 1), MAX_WEEKEND_HORIZON_MONTHS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn fetch_range_validation() {
        assert!(fetch_range(d(2025, 3, 1), d(2025, 3, 31)).is_ok());
        assert!(matches!(
            fetch_range(d(2025, 3, 2), d(2025, 3, 1)),
            Err(EngineError::InvalidDateRange { .. })
        ));
        assert!(fetch_range(d(2025, 1, 1), d(2026, 6, 1)).is_err());
    }

    #[test]
    fn label_length() {
        assert!(check_label(None).is_ok());
        assert!(check_label(Some("Jordan")).is_ok());
        assert!(check_label(Some(&"x".repeat(MAX_LABEL_LEN + 1))).is_err());
    }
}
