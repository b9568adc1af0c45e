use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{DefaultPolicy, EngineError, catalog_contains, check_label, fetch_range};
use crate::limits::*;
use crate::model::*;
use crate::notify::{CalendarChange, NotifyHub};
use crate::observability;
use crate::wal::Wal;

/// The persistence collaborator the scheduler reads from and writes intents to.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn fetch_explicit(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        range: DateRange,
    ) -> Result<Vec<AvailabilityRecord>, EngineError>;

    async fn fetch_booked(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        range: DateRange,
    ) -> Result<Vec<BookedRecord>, EngineError>;

    /// All-or-nothing: either every intent is durably applied or none is.
    async fn apply_intents(&self, intents: &[Intent]) -> Result<(), EngineError>;

    /// Fallback for slots with no explicit record. Resolvers and booking
    /// checks must both use this one.
    fn policy(&self) -> DefaultPolicy {
        DefaultPolicy::default()
    }
}

// ── Calendar state ───────────────────────────────────────────────

/// Persisted state of one `(provider, service)` calendar.
///
/// Keyed by date then time, so a record is unique on the full composite key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CalendarState {
    explicit: BTreeMap<NaiveDate, BTreeMap<NaiveTime, bool>>,
    booked: BTreeMap<NaiveDate, BTreeMap<NaiveTime, BookedRecord>>,
}

impl CalendarState {
    fn apply_intent(&mut self, intent: &Intent) {
        match *intent {
            Intent::Upsert {
                date,
                time24,
                available,
                ..
            } => {
                self.explicit.entry(date).or_default().insert(time24, available);
            }
            Intent::Delete {
                date, time24: None, ..
            } => {
                self.explicit.remove(&date);
            }
            Intent::Delete {
                date,
                time24: Some(time24),
                ..
            } => {
                if let Some(day) = self.explicit.get_mut(&date) {
                    day.remove(&time24);
                    if day.is_empty() {
                        self.explicit.remove(&date);
                    }
                }
            }
        }
    }

    /// Apply the part of `event` that belongs to calendar `key`.
    fn apply_event(&mut self, key: CalendarKey, event: &Event) {
        match event {
            Event::IntentsApplied { intents, .. } => {
                for intent in intents.iter().filter(|i| i.calendar() == key) {
                    self.apply_intent(intent);
                }
            }
            Event::BookingRecorded { booking } => {
                self.booked
                    .entry(booking.date)
                    .or_default()
                    .insert(booking.time24, booking.clone());
            }
            Event::BookingCancelled { key: slot } => {
                if let Some(day) = self.booked.get_mut(&slot.date) {
                    day.remove(&slot.time24);
                    if day.is_empty() {
                        self.booked.remove(&slot.date);
                    }
                }
            }
        }
    }

    pub fn explicit_in(&self, key: CalendarKey, range: DateRange) -> Vec<AvailabilityRecord> {
        self.explicit
            .range(range.start..=range.end)
            .flat_map(|(&date, day)| {
                day.iter().map(move |(&time24, &available)| AvailabilityRecord {
                    provider_id: key.provider_id,
                    service_id: key.service_id,
                    date,
                    time24,
                    available,
                })
            })
            .collect()
    }

    pub fn booked_in(&self, range: DateRange) -> Vec<BookedRecord> {
        self.booked
            .range(range.start..=range.end)
            .flat_map(|(_, day)| day.values().cloned())
            .collect()
    }

    pub fn explicit_count(&self) -> usize {
        self.explicit.values().map(BTreeMap::len).sum()
    }

    /// Minimal event list that rebuilds this calendar.
    fn snapshot(&self, key: CalendarKey) -> Vec<Event> {
        let mut events = Vec::new();
        let intents: Vec<Intent> = self
            .explicit
            .iter()
            .flat_map(|(&date, day)| {
                day.iter().map(move |(&time24, &available)| Intent::Upsert {
                    provider_id: key.provider_id,
                    service_id: key.service_id,
                    date,
                    time24,
                    available,
                })
            })
            .collect();
        if !intents.is_empty() {
            events.push(Event::IntentsApplied {
                batch_id: Ulid::new(),
                intents,
            });
        }
        for day in self.booked.values() {
            for booking in day.values() {
                events.push(Event::BookingRecorded {
                    booking: booking.clone(),
                });
            }
        }
        events
    }
}

fn event_calendars(event: &Event) -> BTreeSet<CalendarKey> {
    match event {
        Event::IntentsApplied { intents, .. } => intents.iter().map(Intent::calendar).collect(),
        Event::BookingRecorded { booking } => BTreeSet::from([booking.key().calendar()]),
        Event::BookingCancelled { key } => BTreeSet::from([key.calendar()]),
    }
}

pub type SharedCalendar = Arc<RwLock<CalendarState>>;

// ── Group-commit WAL writer ──────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while one flush is in progress are
/// written together and share a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    // A failed batch is cut back to where it started, so nothing a caller
    // was told failed can come back on replay.
    let result = wal.mark().and_then(|mark| {
        let written = batch
            .iter()
            .try_for_each(|(event, _)| wal.append_buffered(event))
            .and_then(|()| wal.flush_sync());
        if written.is_err()
            && let Err(e) = wal.rollback(mark)
        {
            warn!("WAL rollback after failed batch also failed: {e}");
        }
        written
    });

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

// ── In-memory store ──────────────────────────────────────────────

/// Reference store: calendars in memory, optionally made durable by a WAL.
pub struct InMemoryStore {
    calendars: DashMap<CalendarKey, SharedCalendar>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Writers hold it shared; compaction holds it exclusively so no append
    /// can land between the snapshot and the log swap.
    gate: RwLock<()>,
    notify: Arc<NotifyHub>,
    policy: DefaultPolicy,
}

impl InMemoryStore {
    /// Replay the WAL at `path` and start its writer task. Must be called
    /// from within a tokio runtime.
    pub fn open(path: &Path, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;

        let mut replayed: HashMap<CalendarKey, CalendarState> = HashMap::new();
        for event in &events {
            for key in event_calendars(event) {
                replayed.entry(key).or_default().apply_event(key, event);
            }
        }
        info!(
            path = %path.display(),
            events = events.len(),
            calendars = replayed.len(),
            "replayed WAL"
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let calendars = DashMap::new();
        for (key, state) in replayed {
            calendars.insert(key, Arc::new(RwLock::new(state)));
        }
        Ok(Self {
            calendars,
            wal_tx: Some(wal_tx),
            gate: RwLock::new(()),
            notify,
            policy: DefaultPolicy::default(),
        })
    }

    /// A store with no durability, for previews and tests.
    pub fn ephemeral(notify: Arc<NotifyHub>) -> Self {
        Self {
            calendars: DashMap::new(),
            wal_tx: None,
            gate: RwLock::new(()),
            notify,
            policy: DefaultPolicy::default(),
        }
    }

    /// Default policy used to decide whether a slot is open for booking.
    pub fn with_policy(mut self, policy: DefaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub fn get_calendar(&self, key: &CalendarKey) -> Option<SharedCalendar> {
        self.calendars.get(key).map(|e| e.value().clone())
    }

    fn calendar_or_default(&self, key: CalendarKey) -> SharedCalendar {
        self.calendars.entry(key).or_default().value().clone()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Record a confirmed booking. The slot must be on the catalog, not
    /// already booked, and currently open (explicitly or by default).
    pub async fn record_booking(&self, booking: BookedRecord) -> Result<(), EngineError> {
        if !catalog_contains(booking.time24) {
            return Err(EngineError::OffCatalog(booking.time24));
        }
        check_label(booking.client_name.as_deref())?;
        check_label(booking.service_title.as_deref())?;

        let _gate = self.gate.read().await;
        let key = booking.key();
        let calendar = self.calendar_or_default(key.calendar());
        let mut guard = calendar.write().await;

        let already_booked = guard
            .booked
            .get(&key.date)
            .is_some_and(|day| day.contains_key(&key.time24));
        let open = guard
            .explicit
            .get(&key.date)
            .and_then(|day| day.get(&key.time24).copied())
            .unwrap_or_else(|| self.policy.state_for(key.date) == SlotState::Available);
        if already_booked || !open {
            return Err(EngineError::Conflict(key.time24));
        }

        let event = Event::BookingRecorded { booking };
        self.wal_append(&event).await?;
        guard.apply_event(key.calendar(), &event);
        drop(guard);

        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
        self.notify.send(CalendarChange {
            key: key.calendar(),
            dates: vec![key.date],
        });
        Ok(())
    }

    /// Remove a booking. `Ok(false)` if there was none at `key`.
    pub async fn cancel_booking(&self, key: SlotKey) -> Result<bool, EngineError> {
        let _gate = self.gate.read().await;
        let Some(calendar) = self.get_calendar(&key.calendar()) else {
            return Ok(false);
        };
        let mut guard = calendar.write().await;
        let exists = guard
            .booked
            .get(&key.date)
            .is_some_and(|day| day.contains_key(&key.time24));
        if !exists {
            return Ok(false);
        }

        let event = Event::BookingCancelled { key };
        self.wal_append(&event).await?;
        guard.apply_event(key.calendar(), &event);
        drop(guard);

        self.notify.send(CalendarChange {
            key: key.calendar(),
            dates: vec![key.date],
        });
        Ok(true)
    }

    /// Rewrite the WAL as a snapshot of current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.gate.write().await;

        let mut keys: Vec<CalendarKey> = self.calendars.iter().map(|e| *e.key()).collect();
        keys.sort();
        let mut events = Vec::new();
        for key in keys {
            if let Some(calendar) = self.get_calendar(&key) {
                events.extend(calendar.read().await.snapshot(key));
            }
        }

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn validate_intents(intents: &[Intent]) -> Result<(), EngineError> {
    if intents.len() > MAX_BATCH_INTENTS {
        return Err(EngineError::LimitExceeded("batch too large"));
    }
    for intent in intents {
        if let Some(time24) = intent.time24()
            && !catalog_contains(time24)
        {
            return Err(EngineError::OffCatalog(time24));
        }
    }
    Ok(())
}

#[async_trait]
impl AvailabilityStore for InMemoryStore {
    async fn fetch_explicit(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        range: DateRange,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        let range = fetch_range(range.start, range.end)?;
        let key = CalendarKey {
            provider_id,
            service_id,
        };
        let Some(calendar) = self.get_calendar(&key) else {
            return Ok(Vec::new());
        };
        let guard = calendar.read().await;
        Ok(guard.explicit_in(key, range))
    }

    async fn fetch_booked(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        range: DateRange,
    ) -> Result<Vec<BookedRecord>, EngineError> {
        let range = fetch_range(range.start, range.end)?;
        let key = CalendarKey {
            provider_id,
            service_id,
        };
        let Some(calendar) = self.get_calendar(&key) else {
            return Ok(Vec::new());
        };
        let guard = calendar.read().await;
        Ok(guard.booked_in(range))
    }

    fn policy(&self) -> DefaultPolicy {
        self.policy
    }

    async fn apply_intents(&self, intents: &[Intent]) -> Result<(), EngineError> {
        if intents.is_empty() {
            return Ok(());
        }
        validate_intents(intents)?;

        let _gate = self.gate.read().await;

        // Lock every touched calendar in key order so concurrent batches
        // can't deadlock.
        let keys: BTreeSet<CalendarKey> = intents.iter().map(Intent::calendar).collect();
        let mut guards: BTreeMap<CalendarKey, OwnedRwLockWriteGuard<CalendarState>> =
            BTreeMap::new();
        for key in &keys {
            let guard = self.calendar_or_default(*key).write_owned().await;
            guards.insert(*key, guard);
        }

        let event = Event::IntentsApplied {
            batch_id: Ulid::new(),
            intents: intents.to_vec(),
        };
        if let Err(e) = self.wal_append(&event).await {
            warn!(intents = intents.len(), "apply failed, nothing written: {e}");
            return Err(e);
        }

        let mut touched: BTreeMap<CalendarKey, BTreeSet<NaiveDate>> = BTreeMap::new();
        for intent in intents {
            let key = intent.calendar();
            if let Some(guard) = guards.get_mut(&key) {
                guard.apply_intent(intent);
            }
            touched.entry(key).or_default().insert(intent.date());
        }
        drop(guards);

        metrics::counter!(observability::INTENTS_APPLIED_TOTAL).increment(intents.len() as u64);
        info!(intents = intents.len(), calendars = touched.len(), "applied intents");
        for (key, dates) in touched {
            self.notify.send(CalendarChange {
                key,
                dates: dates.into_iter().collect(),
            });
        }
        Ok(())
    }
}
