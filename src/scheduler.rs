use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{
    EngineError, catalog_contains, generate_catalog, plan_clear_all, plan_replicate, plan_toggle,
    plan_weekends_off, resolve_with_policy,
};
use crate::model::*;
use crate::observability::{self, Op};
use crate::store::AvailabilityStore;

/// Result of a bulk operation, after the batch is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub target_dates: Vec<NaiveDate>,
    pub intents_applied: usize,
    /// Server-confirmed view of the displayed date.
    pub view: Vec<ResolvedSlot>,
}

/// Drives the engine against a store: fetch, resolve, plan, apply, re-resolve.
///
/// Every write is applied as one batch and followed by a fresh resolve, so the
/// returned view always reflects persisted state.
pub struct Scheduler<S> {
    store: Arc<S>,
    catalog: Vec<TimeSlot>,
    in_flight: DashMap<SlotKey, ()>,
    replicate_weeks: u32,
    weekend_horizon_months: u32,
}

/// Marks one slot as having a toggle in flight; released on drop.
struct InFlight<'a> {
    map: &'a DashMap<SlotKey, ()>,
    key: SlotKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

impl<S: AvailabilityStore> Scheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, &Config::default())
    }

    pub fn with_config(store: Arc<S>, config: &Config) -> Self {
        Self {
            store,
            catalog: generate_catalog(),
            in_flight: DashMap::new(),
            replicate_weeks: config.replicate_weeks,
            weekend_horizon_months: config.weekend_horizon_months,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The slot catalog, generated once per scheduler.
    pub fn catalog(&self) -> &[TimeSlot] {
        &self.catalog
    }

    pub fn toggles_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Fetch one day's records and resolve them.
    pub async fn day_view(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<ResolvedSlot>, EngineError> {
        let started = Instant::now();
        let range = DateRange::day(date);
        let (explicit, booked) = futures::future::try_join(
            self.store.fetch_explicit(provider_id, service_id, range),
            self.store.fetch_booked(provider_id, service_id, range),
        )
        .await?;
        let slots = resolve_with_policy(date, service_id, &explicit, &booked, self.store.policy());

        metrics::histogram!(observability::RESOLVE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            %date,
            explicit = explicit.len(),
            booked = booked.len(),
            "resolved day"
        );
        Ok(slots)
    }

    fn begin_toggle(&self, key: SlotKey) -> Result<InFlight<'_>, EngineError> {
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => {
                metrics::counter!(observability::TOGGLE_REJECTED_TOTAL).increment(1);
                warn!(%key, "toggle rejected, one already in flight");
                Err(EngineError::ToggleInFlight(key))
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    map: &self.in_flight,
                    key,
                })
            }
        }
    }

    /// Flip one slot and return the server-confirmed day.
    ///
    /// A second toggle on the same slot while the first is still running gets
    /// `ToggleInFlight`.
    pub async fn toggle(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time24: NaiveTime,
    ) -> Result<Vec<ResolvedSlot>, EngineError> {
        let result = self.toggle_inner(provider_id, service_id, date, time24).await;
        observability::record_plan(Op::Toggle, &result);
        result
    }

    async fn toggle_inner(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time24: NaiveTime,
    ) -> Result<Vec<ResolvedSlot>, EngineError> {
        if !catalog_contains(time24) {
            return Err(EngineError::OffCatalog(time24));
        }
        let _in_flight = self.begin_toggle(SlotKey {
            provider_id,
            service_id,
            date,
            time24,
        })?;

        let current = self.day_view(provider_id, service_id, date).await?;
        let slot = current
            .iter()
            .find(|s| s.slot.time24 == time24)
            .ok_or(EngineError::OffCatalog(time24))?;
        let intent = plan_toggle(provider_id, service_id, date, slot)?;
        self.store.apply_intents(std::slice::from_ref(&intent)).await?;

        self.day_view(provider_id, service_id, date).await
    }

    /// Copy `source_date`'s explicit pattern forward week by week.
    /// `occurrences` defaults to the configured number of weeks.
    pub async fn replicate(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        source_date: NaiveDate,
        occurrences: Option<u32>,
    ) -> Result<BulkOutcome, EngineError> {
        let occurrences = occurrences.unwrap_or(self.replicate_weeks);
        let result = async {
            let source = self
                .store
                .fetch_explicit(provider_id, service_id, DateRange::day(source_date))
                .await?;
            let plan = plan_replicate(provider_id, service_id, source_date, &source, occurrences)?;
            self.apply_plan(provider_id, service_id, source_date, plan).await
        }
        .await;
        observability::record_plan(Op::Replicate, &result);
        result
    }

    /// Pin every weekend day from `start` over the horizon unavailable.
    /// `horizon_months` defaults to the configured horizon.
    pub async fn weekends_off(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        start: NaiveDate,
        horizon_months: Option<u32>,
    ) -> Result<BulkOutcome, EngineError> {
        let horizon_months = horizon_months.unwrap_or(self.weekend_horizon_months);
        let result = async {
            let plan = plan_weekends_off(provider_id, service_id, start, horizon_months)?;
            self.apply_plan(provider_id, service_id, start, plan).await
        }
        .await;
        observability::record_plan(Op::WeekendsOff, &result);
        result
    }

    /// Drop every explicit record on `date`. `NothingToClear` if there are none.
    pub async fn clear_all(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
    ) -> Result<BulkOutcome, EngineError> {
        let result = async {
            let existing = self
                .store
                .fetch_explicit(provider_id, service_id, DateRange::day(date))
                .await?;
            if existing.is_empty() {
                return Err(EngineError::NothingToClear);
            }
            let plan = plan_clear_all(provider_id, service_id, date);
            self.apply_plan(provider_id, service_id, date, plan).await
        }
        .await;
        observability::record_plan(Op::ClearAll, &result);
        result
    }

    async fn apply_plan(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        displayed: NaiveDate,
        plan: PlanResult,
    ) -> Result<BulkOutcome, EngineError> {
        self.store.apply_intents(&plan.intents).await?;
        info!(
            intents = plan.intents.len(),
            dates = plan.target_dates.len(),
            "bulk plan applied"
        );
        let view = self.day_view(provider_id, service_id, displayed).await?;
        Ok(BulkOutcome {
            target_dates: plan.target_dates,
            intents_applied: plan.intents.len(),
            view,
        })
    }
}
