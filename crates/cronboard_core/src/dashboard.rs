use crate::classify::{BucketPolicy, Snapshot, build_snapshot};
use crate::fetch::ScheduleSource;
use crate::handle::TaskHandle;
use crate::model::TaskRecord;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
pub const RECLASSIFY_INTERVAL: Duration = Duration::from_secs(60);

pub struct Dashboard {
    policy: BucketPolicy,
    records: Mutex<Vec<TaskRecord>>,
    snapshots: watch::Sender<Arc<Snapshot>>,
}

impl Dashboard {
    pub fn new(policy: BucketPolicy) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Snapshot::empty(Local::now(), policy)));
        Self {
            policy,
            records: Mutex::new(Vec::new()),
            snapshots,
        }
    }

    pub fn policy(&self) -> BucketPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Replace the task records and publish a snapshot classified at `now`.
    pub fn apply_records(&self, records: Vec<TaskRecord>, now: DateTime<Local>) -> Arc<Snapshot> {
        let snapshot = Arc::new(build_snapshot(&records, now, self.policy));
        match self.records.lock() {
            Ok(mut guard) => *guard = records,
            Err(poisoned) => *poisoned.into_inner() = records,
        }
        self.publish(snapshot)
    }

    /// Re-evaluate the cached records against `now`.
    pub fn reclassify(&self, now: DateTime<Local>) -> Arc<Snapshot> {
        let records = match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        self.publish(Arc::new(build_snapshot(&records, now, self.policy)))
    }

    /// Fetch from `source` and publish the result.
    ///
    /// A failed fetch is logged and leaves the current snapshot in place.
    pub async fn refresh<S: ScheduleSource>(&self, source: &S) -> Option<Arc<Snapshot>> {
        match source.fetch().await {
            Ok(records) => Some(self.apply_records(records, Local::now())),
            Err(err) => {
                error!(source = %source.describe(), error = %err, "there was an issue loading event data");
                None
            }
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }
}

/// Spawn the loop that refetches every `refresh_every` and reclassifies
/// cached records every `reclassify_every`.
///
/// The first fetch happens immediately.
pub fn spawn_refresher<S>(
    dashboard: Arc<Dashboard>,
    source: S,
    refresh_every: Duration,
    reclassify_every: Duration,
) -> TaskHandle
where
    S: ScheduleSource + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        let mut refresh_ticker = interval(refresh_every);
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reclassify_ticker = interval(reclassify_every);
        reclassify_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reclassify_ticker.reset();
        info!(
            source = %source.describe(),
            refresh_secs = refresh_every.as_secs(),
            "schedule refresher started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("schedule refresher cancelled");
                    break;
                }
                _ = refresh_ticker.tick() => {
                    dashboard.refresh(&source).await;
                }
                _ = reclassify_ticker.tick() => {
                    dashboard.reclassify(Local::now());
                }
            }
        }
    });

    TaskHandle::new("schedule-refresher", cancel, join)
}

#[cfg(test)]
mod tests {
    use super::{Dashboard, spawn_refresher};
    use crate::classify::BucketPolicy;
    use crate::error::AppError;
    use crate::fetch::ScheduleSource;
    use crate::model::TaskRecord;
    use chrono::{DateTime, Local, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticSource {
        result: Result<Vec<TaskRecord>, AppError>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticSource {
        fn new(result: Result<Vec<TaskRecord>, AppError>) -> Self {
            Self {
                result,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ScheduleSource for StaticSource {
        async fn fetch(&self) -> Result<Vec<TaskRecord>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
    }

    fn records() -> Vec<TaskRecord> {
        vec![
            TaskRecord::new("0", "Repot Sunny the Succulent", "0 7 14 3 *"),
            TaskRecord::new("1", "every minute", "* * * * *"),
        ]
    }

    #[test]
    fn apply_records_publishes_snapshot() {
        let dashboard = Dashboard::new(BucketPolicy::Overlapping);
        let mut receiver = dashboard.subscribe();
        assert!(dashboard.current().is_empty());

        let snapshot = dashboard.apply_records(records(), now());

        assert!(receiver.has_changed().unwrap());
        let published = receiver.borrow_and_update().clone();
        assert!(Arc::ptr_eq(&published, &snapshot));
        assert_eq!(published.evaluated_at, now());
        assert_eq!(published.buckets.upcoming.len(), 1);
        assert_eq!(published.buckets.other.len(), 1);
    }

    #[test]
    fn reclassify_uses_cached_records() {
        let dashboard = Dashboard::new(BucketPolicy::Exclusive);
        dashboard.apply_records(records(), now());

        let later = now() + chrono::Duration::days(300);
        let snapshot = dashboard.reclassify(later);

        assert_eq!(snapshot.evaluated_at, later);
        assert_eq!(snapshot.policy, BucketPolicy::Exclusive);
        assert_eq!(
            snapshot.buckets.upcoming.len() + snapshot.buckets.other.len(),
            2
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let dashboard = Dashboard::new(BucketPolicy::Overlapping);
        let before = dashboard.apply_records(records(), now());

        let source = StaticSource::new(Err(AppError::fetch("connection refused")));
        assert!(dashboard.refresh(&source).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert!(Arc::ptr_eq(&dashboard.current(), &before));
    }

    #[tokio::test]
    async fn successful_refresh_replaces_snapshot() {
        let dashboard = Dashboard::new(BucketPolicy::Overlapping);
        dashboard.apply_records(records(), now());

        let source = StaticSource::new(Ok(Vec::new()));
        let snapshot = dashboard.refresh(&source).await.unwrap();

        assert!(snapshot.is_empty());
        assert!(dashboard.current().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_fetches_immediately_and_stops_on_drop() {
        let dashboard = Arc::new(Dashboard::new(BucketPolicy::Overlapping));
        let mut receiver = dashboard.subscribe();
        let source = StaticSource::new(Ok(records()));

        let handle = spawn_refresher(
            dashboard.clone(),
            source,
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        receiver.changed().await.unwrap();
        assert_eq!(dashboard.current().buckets.upcoming.len(), 1);

        let token = handle.cancellation_token();
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_reclassifies_every_minute_and_refetches_every_five() {
        let dashboard = Arc::new(Dashboard::new(BucketPolicy::Overlapping));
        let mut receiver = dashboard.subscribe();
        let source = StaticSource::new(Ok(records()));
        let calls = source.calls.clone();

        let handle = spawn_refresher(
            dashboard.clone(),
            source,
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        receiver.changed().await.unwrap();
        let fetched = receiver.borrow_and_update().clone();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(receiver.has_changed().unwrap());
        let reclassified = receiver.borrow_and_update().clone();
        assert!(!Arc::ptr_eq(&fetched, &reclassified));
        assert!(reclassified.evaluated_at >= fetched.evaluated_at);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(240)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }
}
