use crate::error::AppError;
use crate::model::{ClassifiedEvent, OccurrencePair, TaskRecord};
use crate::occurrence::compute_occurrences;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

pub const RECENT_PAST_HOURS: i64 = 3;
pub const UPCOMING_HOURS: i64 = 24;

const DISPLAY_FORMAT: &str = "%a %Y-%m-%d %H:%M";

/// How `recent_past` relates to the `upcoming`/`other` split.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPolicy {
    /// `recent_past` is evaluated independently and may repeat events that
    /// are also `upcoming` or `other`.
    #[default]
    Overlapping,
    /// Every event lands in exactly one bucket: `upcoming` first, then
    /// `recent_past`, then `other`.
    Exclusive,
}

impl FromStr for BucketPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overlapping" | "overlap" => Ok(Self::Overlapping),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(AppError::invalid_input(format!(
                "unknown bucket policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub recent_past: Vec<ClassifiedEvent>,
    pub upcoming: Vec<ClassifiedEvent>,
    pub other: Vec<ClassifiedEvent>,
}

/// One line of a rendered section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayEntry {
    pub name: String,
    pub at: DateTime<Local>,
}

impl DisplayEntry {
    pub fn display_timestamp(&self) -> String {
        self.at.format(DISPLAY_FORMAT).to_string()
    }
}

/// The four collections consumed by the presentation layer.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Sections {
    pub upcoming: Vec<DisplayEntry>,
    pub recent_past: Vec<DisplayEntry>,
    pub other_upcoming: Vec<DisplayEntry>,
    pub other_past: Vec<DisplayEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRecord {
    pub record: TaskRecord,
    pub error: AppError,
}

/// Immutable result of one classification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub evaluated_at: DateTime<Local>,
    pub policy: BucketPolicy,
    pub buckets: Buckets,
    pub sections: Sections,
    pub excluded: Vec<ExcludedRecord>,
}

impl Snapshot {
    pub fn empty(evaluated_at: DateTime<Local>, policy: BucketPolicy) -> Self {
        Self {
            evaluated_at,
            policy,
            buckets: Buckets::default(),
            sections: Sections::default(),
            excluded: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.upcoming.is_empty()
            && self.buckets.recent_past.is_empty()
            && self.buckets.other.is_empty()
    }
}

/// Signed whole hours from `now` to `at`, truncated toward zero.
pub fn hours_between(at: DateTime<Local>, now: DateTime<Local>) -> i64 {
    (at - now).num_hours()
}

/// Signed whole seconds from `now` to `at`, truncated toward zero.
pub fn seconds_between(at: DateTime<Local>, now: DateTime<Local>) -> i64 {
    (at - now).num_seconds()
}

pub fn in_recent_past(occurrences: &OccurrencePair, now: DateTime<Local>) -> bool {
    let delta = hours_between(occurrences.previous, now);
    (-RECENT_PAST_HOURS..=RECENT_PAST_HOURS).contains(&delta)
}

pub fn in_upcoming(occurrences: &OccurrencePair, now: DateTime<Local>) -> bool {
    let delta = hours_between(occurrences.next, now);
    (-UPCOMING_HOURS..=UPCOMING_HOURS).contains(&delta)
}

pub fn classify(events: &[ClassifiedEvent], now: DateTime<Local>) -> Buckets {
    classify_with_policy(events, now, BucketPolicy::Overlapping)
}

pub fn classify_with_policy(
    events: &[ClassifiedEvent],
    now: DateTime<Local>,
    policy: BucketPolicy,
) -> Buckets {
    let mut buckets = Buckets::default();

    for event in events {
        let recent = in_recent_past(&event.occurrences, now);
        let upcoming = in_upcoming(&event.occurrences, now);

        match policy {
            BucketPolicy::Overlapping => {
                if recent {
                    buckets.recent_past.push(event.clone());
                }
                if upcoming {
                    buckets.upcoming.push(event.clone());
                } else {
                    buckets.other.push(event.clone());
                }
            }
            BucketPolicy::Exclusive => {
                if upcoming {
                    buckets.upcoming.push(event.clone());
                } else if recent {
                    buckets.recent_past.push(event.clone());
                } else {
                    buckets.other.push(event.clone());
                }
            }
        }
    }

    buckets
}

pub fn build_sections(buckets: &Buckets) -> Sections {
    Sections {
        upcoming: ordered_entries(&buckets.upcoming, |pair| pair.next),
        recent_past: ordered_entries(&buckets.recent_past, |pair| pair.previous),
        other_upcoming: ordered_entries(&buckets.other, |pair| pair.next),
        other_past: ordered_entries(&buckets.other, |pair| pair.previous),
    }
}

fn ordered_entries<F>(events: &[ClassifiedEvent], pick: F) -> Vec<DisplayEntry>
where
    F: Fn(&OccurrencePair) -> DateTime<Local>,
{
    let mut entries: Vec<DisplayEntry> = events
        .iter()
        .map(|event| DisplayEntry {
            name: event.name.clone(),
            at: pick(&event.occurrences),
        })
        .collect();
    entries.sort_by(|a, b| a.at.cmp(&b.at));
    entries
}

/// Compute occurrences for every record and classify the result.
///
/// Records whose cron expression cannot be evaluated are left out of every
/// bucket and listed in `Snapshot::excluded`.
pub fn build_snapshot(
    records: &[TaskRecord],
    now: DateTime<Local>,
    policy: BucketPolicy,
) -> Snapshot {
    let mut events = Vec::with_capacity(records.len());
    let mut excluded = Vec::new();

    for record in records {
        match compute_occurrences(&record.cron_expression, now) {
            Ok(occurrences) => events.push(ClassifiedEvent::from_record(record, occurrences)),
            Err(err) => {
                warn!(
                    task = %record.name,
                    cron = %record.cron_expression,
                    error = %err,
                    "excluding task with unusable cron expression"
                );
                excluded.push(ExcludedRecord {
                    record: record.clone(),
                    error: err,
                });
            }
        }
    }

    let buckets = classify_with_policy(&events, now, policy);
    let sections = build_sections(&buckets);
    debug!(
        upcoming = buckets.upcoming.len(),
        recent_past = buckets.recent_past.len(),
        other = buckets.other.len(),
        excluded = excluded.len(),
        "classified schedule"
    );

    Snapshot {
        evaluated_at: now,
        policy,
        buckets,
        sections,
        excluded,
    }
}
