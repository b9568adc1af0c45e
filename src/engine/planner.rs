use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::catalog::{catalog_contains, generate_catalog};
use super::validate::{check_occurrences, horizon_range};

// ── Bulk Mutation Planner ─────────────────────────────────────────
//
// Planners only produce intents. Applying them is the caller's job and must
// be all-or-nothing against the store.

/// Copy `source_date`'s explicit pattern onto the same weekday for the next
/// `occurrences` weeks.
///
/// Only records for this provider, service and date on catalog times are
/// copied. Every emitted intent is an upsert, so re-applying the plan leaves
/// the store unchanged.
pub fn plan_replicate(
    provider_id: Ulid,
    service_id: Ulid,
    source_date: NaiveDate,
    source: &[AvailabilityRecord],
    occurrences: u32,
) -> Result<PlanResult, EngineError> {
    check_occurrences(occurrences)?;

    // Sorted by time; a later duplicate overwrites an earlier one.
    let pattern: BTreeMap<NaiveTime, bool> = source
        .iter()
        .filter(|r| {
            r.provider_id == provider_id
                && r.service_id == service_id
                && r.date == source_date
                && catalog_contains(r.time24)
        })
        .map(|r| (r.time24, r.available))
        .collect();

    if pattern.is_empty() {
        return Err(EngineError::NoSourceData);
    }

    let mut target_dates = Vec::with_capacity(occurrences as usize);
    for week in 1..=u64::from(occurrences) {
        let date = source_date
            .checked_add_days(Days::new(7 * week))
            .ok_or(EngineError::InvalidDateRange {
                start: source_date,
                end: NaiveDate::MAX,
            })?;
        target_dates.push(date);
    }

    let mut intents = Vec::with_capacity(target_dates.len() * pattern.len());
    for &date in &target_dates {
        for (&time24, &available) in &pattern {
            intents.push(Intent::Upsert {
                provider_id,
                service_id,
                date,
                time24,
                available,
            });
        }
    }

    tracing::debug!(
        %source_date,
        slots = pattern.len(),
        weeks = target_dates.len(),
        "planned replicate"
    );
    Ok(PlanResult {
        intents,
        target_dates,
    })
}

/// Pin every Saturday and Sunday in `[start_date, start_date + horizon_months]`
/// explicitly unavailable.
///
/// Each weekend date gets a whole-day delete followed by an `available = false`
/// upsert for every catalog slot, so the pin does not depend on the default
/// policy staying weekend-closed.
pub fn plan_weekends_off(
    provider_id: Ulid,
    service_id: Ulid,
    start_date: NaiveDate,
    horizon_months: u32,
) -> Result<PlanResult, EngineError> {
    let range = horizon_range(start_date, horizon_months)?;
    let catalog = generate_catalog();

    let target_dates: Vec<NaiveDate> = range.days().filter(|d| is_weekend(*d)).collect();

    let mut intents = Vec::with_capacity(target_dates.len() * (catalog.len() + 1));
    for &date in &target_dates {
        intents.push(Intent::Delete {
            provider_id,
            service_id,
            date,
            time24: None,
        });
        intents.extend(catalog.iter().map(|slot| Intent::Upsert {
            provider_id,
            service_id,
            date,
            time24: slot.time24,
            available: false,
        }));
    }

    tracing::debug!(
        start = %range.start,
        end = %range.end,
        weekend_days = target_dates.len(),
        "planned weekends off"
    );
    Ok(PlanResult {
        intents,
        target_dates,
    })
}

/// Drop every explicit record on `date`; the day falls back to the default policy.
pub fn plan_clear_all(provider_id: Ulid, service_id: Ulid, date: NaiveDate) -> PlanResult {
    PlanResult {
        intents: vec![Intent::Delete {
            provider_id,
            service_id,
            date,
            time24: None,
        }],
        target_dates: vec![date],
    }
}

/// The single toggle entry point: flip one resolved slot.
///
/// Turning a slot off upserts `available = false` rather than deleting, so the
/// slot stays explicit. Booked slots are not the provider's to toggle.
pub fn plan_toggle(
    provider_id: Ulid,
    service_id: Ulid,
    date: NaiveDate,
    slot: &ResolvedSlot,
) -> Result<Intent, EngineError> {
    let available = match slot.state {
        SlotState::Booked => return Err(EngineError::SlotBooked(slot.slot.time24)),
        SlotState::Available => false,
        SlotState::Unavailable => true,
    };
    Ok(Intent::Upsert {
        provider_id,
        service_id,
        date,
        time24: slot.slot.time24,
        available,
    })
}
