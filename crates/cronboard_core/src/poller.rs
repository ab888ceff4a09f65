use crate::classify::{Snapshot, seconds_between};
use crate::handle::TaskHandle;
use crate::model::{ClassifiedEvent, OccurrencePair};
use crate::notify::{Notifier, Permission, starting_now_body};
use crate::occurrence::CronSchedule;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DISPLAY_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S";

/// Occurrences the poller follows for one event between snapshots.
#[derive(Debug)]
struct Tracked {
    expression: String,
    schedule: Option<CronSchedule>,
    occurrences: OccurrencePair,
    last_notified: Option<DateTime<Local>>,
}

impl Tracked {
    fn new(event: &ClassifiedEvent) -> Self {
        let schedule = match CronSchedule::parse(&event.cron_expression) {
            Ok(schedule) => Some(schedule),
            Err(err) => {
                warn!(event = %event.name, error = %err, "cannot advance occurrences");
                None
            }
        };
        Self {
            expression: event.cron_expression.clone(),
            schedule,
            occurrences: event.occurrences,
            last_notified: None,
        }
    }

    /// Bring the pair up to date with `now`.
    ///
    /// Snapshots are only recomputed once a minute, so schedules firing more
    /// often than that are advanced here.
    fn advance(&mut self, event: &ClassifiedEvent, now: DateTime<Local>) {
        if event.occurrences.next > self.occurrences.next {
            self.occurrences = event.occurrences;
        }
        if seconds_between(self.occurrences.next, now) >= 0 {
            return;
        }
        let Some(schedule) = &self.schedule else {
            return;
        };
        // One second back keeps an occurrence at exactly `now` as `next`.
        match schedule.occurrences_around(&(now - chrono::Duration::seconds(1))) {
            Ok(occurrences) => self.occurrences = occurrences,
            Err(err) => debug!(error = %err, "no further occurrence"),
        }
    }
}

#[derive(Debug, Default)]
pub struct NotificationPoller {
    tracked: HashMap<String, Tracked>,
}

impl NotificationPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last instant notified for the event with this id.
    pub fn last_notified(&self, id: &str) -> Option<DateTime<Local>> {
        self.tracked.get(id).and_then(|tracked| tracked.last_notified)
    }

    /// Run one check over `upcoming`, returning the names that were notified.
    pub fn check(
        &mut self,
        upcoming: &[ClassifiedEvent],
        now: DateTime<Local>,
        notifier: &dyn Notifier,
    ) -> Vec<String> {
        let mut notified = Vec::new();

        for event in upcoming {
            let tracked = self
                .tracked
                .entry(event.id.clone())
                .or_insert_with(|| Tracked::new(event));
            if tracked.expression != event.cron_expression {
                *tracked = Tracked::new(event);
            }
            tracked.advance(event, now);

            let Some(starting) = starting_instant(&tracked.occurrences, now) else {
                continue;
            };

            if tracked.last_notified == Some(starting) {
                continue;
            }

            if notifier.request_permission() != Permission::Granted {
                debug!(event = %event.name, "notification permission denied");
                continue;
            }

            let body = starting_now_body(&starting.format(DISPLAY_FORMAT).to_string());
            match notifier.show(&event.name, &body) {
                Ok(()) => {
                    info!(event = %event.name, at = %starting, "sent starting-now notification");
                    tracked.last_notified = Some(starting);
                    notified.push(event.name.clone());
                }
                Err(err) => {
                    warn!(event = %event.name, error = %err, "failed to show notification");
                }
            }
        }

        self.tracked
            .retain(|id, _| upcoming.iter().any(|event| &event.id == id));

        notified
    }
}

/// The occurrence that is starting at `now`, if any.
///
/// `previous` is considered too: a pair computed during the firing second
/// has already moved `next` past it.
fn starting_instant(occurrences: &OccurrencePair, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if seconds_between(occurrences.next, now) == 0 {
        Some(occurrences.next)
    } else if seconds_between(occurrences.previous, now) == 0 {
        Some(occurrences.previous)
    } else {
        None
    }
}

/// Spawn the polling loop over the snapshots published on `snapshots`.
pub fn spawn_poller(
    snapshots: watch::Receiver<Arc<Snapshot>>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> TaskHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        let mut poller = NotificationPoller::new();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "notification poller started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("notification poller cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = snapshots.borrow().clone();
                    poller.check(&snapshot.buckets.upcoming, Local::now(), notifier.as_ref());
                }
            }
        }
    });

    TaskHandle::new("notification-poller", cancel, join)
}
