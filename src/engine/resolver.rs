use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::catalog::generate_catalog;
use super::validate::{parse_date, parse_id};

// ── Availability Resolver ─────────────────────────────────────────

/// Fallback for slots with neither a booking nor an explicit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub weekdays_open: bool,
    pub weekends_open: bool,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            weekdays_open: true,
            weekends_open: false,
        }
    }
}

impl DefaultPolicy {
    pub fn state_for(&self, date: NaiveDate) -> SlotState {
        let open = if is_weekend(date) {
            self.weekends_open
        } else {
            self.weekdays_open
        };
        SlotState::from_available(open)
    }
}

/// Resolve every catalog slot for `date` under the default policy.
///
/// Precedence per slot: a matching booking wins, then a matching explicit
/// record, then the weekday/weekend default. Records for other dates or
/// services are ignored, so callers may pass broader cached sets.
pub fn resolve(
    date: NaiveDate,
    service_id: Ulid,
    explicit: &[AvailabilityRecord],
    booked: &[BookedRecord],
) -> Vec<ResolvedSlot> {
    resolve_with_policy(date, service_id, explicit, booked, DefaultPolicy::default())
}

pub fn resolve_with_policy(
    date: NaiveDate,
    service_id: Ulid,
    explicit: &[AvailabilityRecord],
    booked: &[BookedRecord],
    policy: DefaultPolicy,
) -> Vec<ResolvedSlot> {
    let booked_times: HashSet<NaiveTime> = booked
        .iter()
        .filter(|b| b.service_id == service_id && b.date == date)
        .map(|b| b.time24)
        .collect();

    // Later records overwrite earlier ones for the same time.
    let explicit_times: HashMap<NaiveTime, bool> = explicit
        .iter()
        .filter(|r| r.service_id == service_id && r.date == date)
        .map(|r| (r.time24, r.available))
        .collect();

    let default_state = policy.state_for(date);

    generate_catalog()
        .into_iter()
        .map(|slot| {
            let (state, is_explicit) = if booked_times.contains(&slot.time24) {
                (SlotState::Booked, false)
            } else if let Some(&available) = explicit_times.get(&slot.time24) {
                (SlotState::from_available(available), true)
            } else {
                (default_state, false)
            };
            ResolvedSlot {
                slot,
                state,
                is_explicit,
            }
        })
        .collect()
}

/// Every catalog slot at its default for `date`, ignoring all records.
pub fn resolve_defaults(date: NaiveDate, policy: DefaultPolicy) -> Vec<ResolvedSlot> {
    uniform(policy.state_for(date))
}

fn uniform(state: SlotState) -> Vec<ResolvedSlot> {
    generate_catalog()
        .into_iter()
        .map(|slot| ResolvedSlot {
            slot,
            state,
            is_explicit: false,
        })
        .collect()
}

/// String-input resolve for display paths that must never go blank.
///
/// A malformed date or a missing/malformed service id is treated as "no data
/// yet": the catalog comes back with every slot defaulted. An unparsable date
/// gets the weekday default since there is no weekday to consult.
pub fn resolve_lenient(
    date: &str,
    service_id: Option<&str>,
    explicit: &[AvailabilityRecord],
    booked: &[BookedRecord],
) -> Vec<ResolvedSlot> {
    let policy = DefaultPolicy::default();
    let Ok(date) = parse_date(date) else {
        tracing::debug!("resolve: malformed date, defaulting all slots");
        return uniform(SlotState::from_available(policy.weekdays_open));
    };
    match service_id.map(parse_id) {
        Some(Ok(service_id)) => resolve_with_policy(date, service_id, explicit, booked, policy),
        _ => {
            tracing::debug!(%date, "resolve: no usable service id, defaulting all slots");
            resolve_defaults(date, policy)
        }
    }
}
