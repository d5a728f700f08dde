//! HTTP smoke checks against a deployed inference service.
//!
//! The checks mirror the three input adapters a packaged service usually
//! exposes: a JSON endpoint, a data-frame endpoint (JSON or CSV) and a file
//! endpoint (raw bytes or multipart). Each posts a fixed payload and compares
//! what comes back.

use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SmokeError;

/// Status a POST-only inference endpoint answers to a bare GET.
pub const DEFAULT_READY_STATUS: u16 = 400;

pub const JSON_BODY: &str = "[[1, 2, 3, 4]]";
pub const FILE_BODY: &[u8] = b"test";
pub const FILE_RESPONSE: &[u8] = b"\"test\"";

/// Upper bound on a single request, body included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            wait: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeCheck {
    Json,
    DataFrame,
    Files,
}

impl SmokeCheck {
    pub const ALL: [SmokeCheck; 3] = [SmokeCheck::Json, SmokeCheck::DataFrame, SmokeCheck::Files];

    pub fn endpoint(&self) -> &'static str {
        match self {
            SmokeCheck::Json => "jsonapi",
            SmokeCheck::DataFrame => "dfapi",
            SmokeCheck::Files => "fileapi",
        }
    }
}

impl fmt::Display for SmokeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.endpoint())
    }
}

pub struct SmokeClient {
    http: Client,
    base_url: String,
}

impl SmokeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SmokeError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SmokeError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SmokeError::Client)?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Poll `endpoint` until it answers with `ready_status`.
    ///
    /// Transport errors and other statuses both count as a failed attempt.
    /// Sleeps `policy.wait` between attempts, never after the last one.
    pub async fn wait_until_up(
        &self,
        endpoint: &str,
        ready_status: u16,
        policy: &RetryPolicy,
    ) -> bool {
        let url = self.url(endpoint);
        for attempt in 1..=policy.attempts {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().as_u16() == ready_status => {
                    info!(url = %url, attempt, "Service is up");
                    return true;
                }
                Ok(resp) => {
                    debug!(
                        url = %url,
                        attempt,
                        status = resp.status().as_u16(),
                        "Service not up yet"
                    );
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Service unreachable");
                }
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.wait).await;
            }
        }
        warn!(url = %url, attempts = policy.attempts, "Service never came up");
        false
    }

    pub async fn run(&self, check: SmokeCheck) -> Result<(), SmokeError> {
        match check {
            SmokeCheck::Json => self.check_json(check.endpoint()).await,
            SmokeCheck::DataFrame => self.check_dataframe(check.endpoint()).await,
            SmokeCheck::Files => self.check_files(check.endpoint()).await,
        }
    }

    /// A JSON body must come back byte for byte.
    pub async fn check_json(&self, endpoint: &str) -> Result<(), SmokeError> {
        let url = self.url(endpoint);
        let request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(JSON_BODY);
        let body = self.send(&url, request).await?;
        expect_bytes(&url, JSON_BODY.as_bytes(), &body)
    }

    /// A one-row frame, sent once as JSON and once as CSV, must come back
    /// describing the same frame.
    pub async fn check_dataframe(&self, endpoint: &str) -> Result<(), SmokeError> {
        let url = self.url(endpoint);
        let rows = sample_rows();

        let as_json = self.http.post(&url).json(&rows);
        let body = self.send(&url, as_json).await?;
        expect_frame(&url, &rows, &body)?;

        let as_csv = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/csv")
            .body(to_csv(&rows));
        let body = self.send(&url, as_csv).await?;
        expect_frame(&url, &rows, &body)
    }

    /// Raw bytes and a multipart upload must both echo as a JSON string.
    pub async fn check_files(&self, endpoint: &str) -> Result<(), SmokeError> {
        let url = self.url(endpoint);

        let raw = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(FILE_BODY);
        let body = self.send(&url, raw).await?;
        expect_bytes(&url, FILE_RESPONSE, &body)?;

        let form = Form::new().part("audio", Part::bytes(FILE_BODY).file_name("test"));
        let multipart = self.http.post(&url).multipart(form);
        let body = self.send(&url, multipart).await?;
        expect_bytes(&url, FILE_RESPONSE, &body)
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, SmokeError> {
        let http_err = |source| SmokeError::Http {
            url: url.to_owned(),
            source,
        };
        let resp: Response = request.send().await.map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SmokeError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await.map_err(http_err)?;
        Ok(bytes.to_vec())
    }
}

pub fn sample_rows() -> Vec<Vec<i64>> {
    vec![vec![1, 2, 3, 4]]
}

/// CSV with positional column headers and no index column.
pub fn to_csv(rows: &[Vec<i64>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = (0..width)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        let line = row.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Read a JSON frame as rows.
///
/// Accepts an array of rows, an array of records keyed by column, or a
/// column-oriented object (`{"col": {"row": value}}`).
pub fn frame_rows(value: &Value) -> Option<Vec<Vec<Value>>> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_array) => Some(
            items
                .iter()
                .filter_map(Value::as_array)
                .map(|row| row.to_vec())
                .collect(),
        ),
        Value::Array(items) if items.iter().all(Value::is_object) => items
            .iter()
            .map(|record| {
                let record = record.as_object()?;
                Some(values_in_order(record))
            })
            .collect(),
        Value::Object(columns) => {
            let columns: Vec<Vec<Value>> = sorted_by_key(columns.iter())
                .into_iter()
                .map(|(_, column)| {
                    let column = column.as_object()?;
                    Some(values_in_order(column))
                })
                .collect::<Option<Vec<Vec<Value>>>>()?;
            let height = columns.first().map(Vec::len).unwrap_or(0);
            if columns.iter().any(|c| c.len() != height) {
                return None;
            }
            Some(
                (0..height)
                    .map(|r| columns.iter().map(|c| c[r].clone()).collect())
                    .collect(),
            )
        }
        _ => None,
    }
}

fn values_in_order(map: &serde_json::Map<String, Value>) -> Vec<Value> {
    sorted_by_key(map.iter())
        .into_iter()
        .map(|(_, v)| v.clone())
        .collect()
}

/// Order keys numerically when they are positional indices, lexically otherwise.
fn sorted_by_key<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Vec<(&'a String, &'a Value)> {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    });
    entries
}

fn expect_bytes(url: &str, expected: &[u8], actual: &[u8]) -> Result<(), SmokeError> {
    if expected == actual {
        return Ok(());
    }
    Err(SmokeError::Mismatch {
        url: url.to_owned(),
        expected: String::from_utf8_lossy(expected).into_owned(),
        actual: String::from_utf8_lossy(actual).into_owned(),
    })
}

fn expect_frame(url: &str, expected: &[Vec<i64>], body: &[u8]) -> Result<(), SmokeError> {
    let mismatch = || SmokeError::FrameMismatch {
        url: url.to_owned(),
        body: String::from_utf8_lossy(body).into_owned(),
    };
    let value: Value = serde_json::from_slice(body).map_err(|_| mismatch())?;
    let rows = frame_rows(&value).ok_or_else(mismatch)?;

    let same = rows.len() == expected.len()
        && rows.iter().zip(expected).all(|(got, want)| {
            got.len() == want.len()
                && got
                    .iter()
                    .zip(want)
                    .all(|(g, w)| g.as_f64() == Some(*w as f64))
        });
    if same {
        Ok(())
    } else {
        Err(mismatch())
    }
}
