use crate::error::AppError;
use crate::model::TaskRecord;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://scheduler-challenge.herokuapp.com/schedule";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// { "data": [ { "id": "0", "type": "task", "attributes": { "name": "...", "cron": "..." } } ] }
#[derive(Debug, Deserialize)]
struct ScheduleDocument {
    #[serde(default)]
    data: Vec<ScheduleResource>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResource {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    attributes: TaskAttributes,
}

#[derive(Debug, Deserialize)]
struct TaskAttributes {
    name: String,
    cron: String,
}

/// Where task records come from.
pub trait ScheduleSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<TaskRecord>, AppError>> + Send;

    fn describe(&self) -> String;
}

/// Prefix `endpoint` with an optional CORS relay.
pub fn schedule_url(endpoint: &str, cors_relay: Option<&str>) -> String {
    match cors_relay.map(str::trim).filter(|relay| !relay.is_empty()) {
        Some(relay) => format!("{relay}{endpoint}"),
        None => endpoint.to_string(),
    }
}

pub fn parse_schedule_document(body: &str) -> Result<Vec<TaskRecord>, AppError> {
    let document: ScheduleDocument = serde_json::from_str(body)
        .map_err(|err| AppError::fetch(format!("invalid schedule document: {err}")))?;

    let records = document
        .data
        .into_iter()
        .enumerate()
        .map(|(index, resource)| {
            if let Some(kind) = resource.kind.as_deref()
                && kind != "task"
            {
                debug!(kind, index, "schedule resource has unexpected type");
            }
            let id = match resource.id {
                Some(serde_json::Value::String(id)) => id,
                Some(serde_json::Value::Null) | None => index.to_string(),
                Some(other) => other.to_string(),
            };
            TaskRecord {
                id,
                name: resource.attributes.name,
                cron_expression: resource.attributes.cron,
            }
        })
        .collect();

    Ok(records)
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(endpoint: &str, cors_relay: Option<&str>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::fetch(err.to_string()))?;
        Ok(Self {
            client,
            url: schedule_url(endpoint, cors_relay),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ScheduleSource for HttpSource {
    async fn fetch(&self) -> Result<Vec<TaskRecord>, AppError> {
        debug!(url = %self.url, "fetching schedule");
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AppError::fetch(err.to_string()))?
            .error_for_status()
            .map_err(|err| AppError::fetch(err.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|err| AppError::fetch(err.to_string()))?;

        let records = parse_schedule_document(&body)?;
        info!(url = %self.url, tasks = records.len(), "fetched schedule");
        Ok(records)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Reads a schedule document from disk instead of the network.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ScheduleSource for FileSource {
    async fn fetch(&self) -> Result<Vec<TaskRecord>, AppError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| AppError::fetch(format!("{}: {}", self.path.display(), err)))?;
        let records = parse_schedule_document(&body)?;
        debug!(path = %self.path.display(), tasks = records.len(), "read schedule file");
        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
