use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use crate::engine::EngineError;
use crate::model::{ResolvedSlot, SlotState};

/// One displayed day: the last server-confirmed slots plus local toggles not
/// yet confirmed.
///
/// Server state always wins. `reconcile` replaces everything and drops the
/// pending toggles; `rollback` drops them after a failed write.
#[derive(Debug, Clone)]
pub struct DayView {
    date: NaiveDate,
    confirmed: Vec<ResolvedSlot>,
    pending: BTreeMap<NaiveTime, SlotState>,
}

impl DayView {
    pub fn new(date: NaiveDate, confirmed: Vec<ResolvedSlot>) -> Self {
        Self {
            date,
            confirmed,
            pending: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flip a slot locally. Returns the state now shown.
    pub fn optimistic_toggle(&mut self, time24: NaiveTime) -> Result<SlotState, EngineError> {
        let confirmed = self
            .confirmed
            .iter()
            .find(|s| s.slot.time24 == time24)
            .ok_or(EngineError::OffCatalog(time24))?
            .state;
        let shown = self.pending.get(&time24).copied().unwrap_or(confirmed);
        let next = match shown {
            SlotState::Booked => return Err(EngineError::SlotBooked(time24)),
            SlotState::Available => SlotState::Unavailable,
            SlotState::Unavailable => SlotState::Available,
        };
        if next == confirmed {
            self.pending.remove(&time24);
        } else {
            self.pending.insert(time24, next);
        }
        Ok(next)
    }

    /// Replace with a fresh server resolve.
    pub fn reconcile(&mut self, date: NaiveDate, confirmed: Vec<ResolvedSlot>) {
        self.date = date;
        self.confirmed = confirmed;
        self.pending.clear();
    }

    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    /// Confirmed slots with pending toggles laid over them.
    pub fn slots(&self) -> Vec<ResolvedSlot> {
        self.confirmed
            .iter()
            .map(|s| match self.pending.get(&s.slot.time24) {
                Some(&state) => ResolvedSlot {
                    slot: s.slot.clone(),
                    state,
                    is_explicit: true,
                },
                None => s.clone(),
            })
            .collect()
    }
}
