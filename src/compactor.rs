use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::store::InMemoryStore;

/// Compact once the WAL has grown by `threshold` appends. Returns whether it did.
pub async fn compact_if_due(store: &InMemoryStore, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task: every `interval`, drop notification channels nobody
/// listens to any more and compact when due.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        store.notify().prune();
        compact_if_due(&store, threshold).await;
    }
}

/// Start `run_compactor` with the configured threshold and interval.
pub fn spawn_compactor(store: Arc<InMemoryStore>, config: &Config) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_compactor(
        store,
        config.compact_threshold,
        config.compact_interval,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Intent};
    use crate::notify::NotifyHub;
    use crate::store::AvailabilityStore;
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("slotgrid_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = InMemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
        let (p, s) = (Ulid::new(), Ulid::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();

        for i in 0..3u32 {
            store
                .apply_intents(&[Intent::Upsert {
                    provider_id: p,
                    service_id: s,
                    date,
                    time24: NaiveTime::from_hms_opt(9 + i, 0, 0).unwrap(),
                    available: false,
                }])
                .await
                .unwrap();
        }

        assert!(!compact_if_due(&store, 5).await);
        assert_eq!(store.wal_appends_since_compact().await, 3);

        assert!(compact_if_due(&store, 3).await);
        assert_eq!(store.wal_appends_since_compact().await, 0);

        let rows = store.fetch_explicit(p, s, DateRange::day(date)).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let notify = Arc::new(NotifyHub::new());
        let store = Arc::new(InMemoryStore::open(&path, notify.clone()).unwrap());
        let date = NaiveDate::from_ymd_opt(2025, 3, 18).unwrap();
        let abandoned = notify.subscribe(crate::model::CalendarKey {
            provider_id: Ulid::new(),
            service_id: Ulid::new(),
        });
        drop(abandoned);
        assert_eq!(notify.channel_count(), 1);
        store
            .apply_intents(&[Intent::Delete {
                provider_id: Ulid::new(),
                service_id: Ulid::new(),
                date,
                time24: None,
            }])
            .await
            .unwrap();

        let config = Config {
            compact_threshold: 1,
            compact_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let task = spawn_compactor(store.clone(), &config);
        for _ in 0..100 {
            if store.wal_appends_since_compact().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert_eq!(store.wal_appends_since_compact().await, 0);
        assert_eq!(notify.channel_count(), 0);
    }
}
