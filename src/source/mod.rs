//! Loading subscription records.
//!
//! Records come either from the subscriptions API or from a JSON export of
//! its response. Both end up in [`parse_payload`], which accepts the shapes
//! the API has been seen to return.

use crate::models::SubscriptionRecord;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Keys under which a wrapped payload may carry the record array.
const WRAPPER_KEYS: &[&str] = &["subscriptions", "data"];

/// Errors that can occur while loading subscription records.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the export file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The endpoint did not answer in time.
    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    /// The endpoint could not be reached.
    #[error("Cannot connect to {0}")]
    Connect(String),

    /// Any other HTTP client failure.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Subscriptions API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The body is not a recognizable record list.
    #[error("Invalid subscriptions payload: {0}")]
    Payload(String),
}

/// Where to load records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    /// A JSON export on disk.
    File(PathBuf),
    /// A `GET` endpoint returning JSON.
    Http { url: String, timeout_seconds: u64 },
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::File(path) => write!(f, "{}", path.display()),
            RecordSource::Http { url, .. } => write!(f, "{}", url),
        }
    }
}

/// Load every record from `source`.
pub async fn load_records(
    source: &RecordSource,
    show_progress: bool,
) -> Result<Vec<SubscriptionRecord>, SourceError> {
    let body = match source {
        RecordSource::File(path) => {
            debug!("Reading records from {}", path.display());
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SourceError::Io {
                    path: path.clone(),
                    source: e,
                })?
        }
        RecordSource::Http {
            url,
            timeout_seconds,
        } => fetch_body(url, *timeout_seconds, show_progress).await?,
    };

    let records = parse_payload(&body)?;
    info!("Loaded {} subscription records from {}", records.len(), source);
    Ok(records)
}

/// `GET` the endpoint and return the response body.
async fn fetch_body(
    url: &str,
    timeout_seconds: u64,
    show_progress: bool,
) -> Result<String, SourceError> {
    info!("Fetching subscriptions from {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()?;

    let spinner = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Fetching {}", url));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = send(&client, url, timeout_seconds).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    result
}

async fn send(
    client: &reqwest::Client,
    url: &str,
    timeout_seconds: u64,
) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout {
                    url: url.to_string(),
                    seconds: timeout_seconds,
                }
            } else if e.is_connect() {
                SourceError::Connect(url.to_string())
            } else {
                SourceError::Http(e)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.text().await?)
}

/// Parse a subscriptions payload.
///
/// Accepts a bare array, `null` (no records), or an object carrying the
/// array under `subscriptions` or `data`. Array entries that are not
/// objects are skipped with a warning.
pub fn parse_payload(body: &str) -> Result<Vec<SubscriptionRecord>, SourceError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| SourceError::Payload(e.to_string()))?;

    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if !WRAPPER_KEYS.iter().any(|k| map.contains_key(*k)) {
                return Err(SourceError::Payload(format!(
                    "expected an array or an object with one of: {}",
                    WRAPPER_KEYS.join(", ")
                )));
            }

            // A null wrapper means "no records" only if no other wrapper has any.
            let key = WRAPPER_KEYS
                .iter()
                .find(|k| map.get(**k).is_some_and(|v| !v.is_null()));

            match key.and_then(|k| map.remove(*k).map(|v| (k, v))) {
                Some((_, Value::Array(items))) => items,
                Some((key, _)) => {
                    return Err(SourceError::Payload(format!("`{}` is not an array", key)));
                }
                None => return Ok(Vec::new()),
            }
        }
        other => {
            return Err(SourceError::Payload(format!(
                "expected an array, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match SubscriptionRecord::deserialize(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping entry {}: {}", position, e),
        }
    }

    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
