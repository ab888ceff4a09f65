use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A task as delivered by the schedule API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrencePair {
    pub previous: DateTime<Local>,
    pub next: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
    pub occurrences: OccurrencePair,
}

impl TaskRecord {
    pub fn new<I, N, C>(id: I, name: N, cron_expression: C) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            cron_expression: cron_expression.into(),
        }
    }
}

impl ClassifiedEvent {
    pub fn from_record(record: &TaskRecord, occurrences: OccurrencePair) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            cron_expression: record.cron_expression.clone(),
            occurrences,
        }
    }
}
