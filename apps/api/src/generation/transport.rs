//! Streaming delivery of a job to its caller.
//!
//! The job task is the only producer and the HTTP body the only consumer, joined by
//! a bounded mpsc channel. Model chunks are relayed as they arrive and exactly one
//! completion record follows them, after persistence has settled. A fatal job error
//! ends the body with an error instead, so no record is ever written for it.
//!
//! Two framings carry the same events:
//! - `Trailer` (default): chunks verbatim, then `\n\n` and the JSON record.
//! - `Envelope` (`Accept: application/x-ndjson`): one JSON object per line.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::llm_client::LlmError;

pub const NDJSON: &str = "application/x-ndjson";
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStatus {
    Complete,
    CourseGenerationComplete,
    Error,
}

/// Emitted once persistence attempts have settled. `persisted` and `failed`
/// count individual writes; a record is not a promise that every write succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub collection_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_partition: Option<usize>,
    pub status: CompletionStatus,
    pub persisted: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionRecord {
    pub fn new(collection_id: i64, status: CompletionStatus) -> Self {
        Self {
            collection_id,
            partition_index: None,
            last_partition: None,
            status,
            persisted: 0,
            failed: 0,
            skipped: false,
            error: None,
        }
    }
}

/// Fatal job failures. Each one ends the stream without a completion record.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("model stream failed: {0}")]
    Transport(#[from] LlmError),

    #[error("job exceeded its maximum duration of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("failed to encode stream event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Content(String),
    Completion(CompletionRecord),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeFrame {
    Content { data: String },
    Completion(CompletionRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Trailer,
    Envelope,
}

impl Framing {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_ndjson = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.split(',').any(|m| m.trim().starts_with(NDJSON)));
        if wants_ndjson {
            Framing::Envelope
        } else {
            Framing::Trailer
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Framing::Trailer => "text/plain; charset=utf-8",
            Framing::Envelope => NDJSON,
        }
    }

    pub fn encode(&self, event: &JobEvent) -> Result<Bytes, serde_json::Error> {
        match (self, event) {
            (Framing::Trailer, JobEvent::Content(text)) => Ok(Bytes::from(text.clone())),
            (Framing::Trailer, JobEvent::Completion(record)) => {
                let mut out = b"\n\n".to_vec();
                serde_json::to_writer(&mut out, record)?;
                Ok(Bytes::from(out))
            }
            (Framing::Envelope, event) => {
                let frame = match event {
                    JobEvent::Content(text) => EnvelopeFrame::Content { data: text.clone() },
                    JobEvent::Completion(record) => EnvelopeFrame::Completion(record.clone()),
                };
                let mut out = serde_json::to_vec(&frame)?;
                out.push(b'\n');
                Ok(Bytes::from(out))
            }
        }
    }
}

/// Opens the channel for one job.
pub fn channel(framing: Framing) -> (JobSink, JobStream) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        JobSink {
            tx,
            connected: true,
        },
        JobStream { rx, framing },
    )
}

/// Producer half, owned by the job task.
pub struct JobSink {
    tx: mpsc::Sender<Result<JobEvent, JobError>>,
    connected: bool,
}

impl JobSink {
    /// Forwards a chunk. Once the caller has gone away chunks are dropped, but the
    /// job itself carries on.
    pub async fn relay(&mut self, chunk: String) {
        if !self.connected {
            return;
        }
        if self.tx.send(Ok(JobEvent::Content(chunk))).await.is_err() {
            debug!("Caller disconnected; job continues without relaying");
            self.connected = false;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub async fn finish(self, record: CompletionRecord) {
        let _ = self.tx.send(Ok(JobEvent::Completion(record))).await;
    }

    pub async fn fail(self, error: JobError) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Consumer half, turned into the HTTP response body.
pub struct JobStream {
    rx: mpsc::Receiver<Result<JobEvent, JobError>>,
    framing: Framing,
}

impl JobStream {
    /// Encoded body chunks. The first error ends the stream.
    pub fn into_bytes(self) -> impl Stream<Item = Result<Bytes, JobError>> + Send + 'static {
        let JobStream { mut rx, framing } = self;
        async_stream::stream! {
            while let Some(message) = rx.recv().await {
                match message {
                    Ok(event) => match framing.encode(&event) {
                        Ok(bytes) => yield Ok(bytes),
                        Err(e) => {
                            yield Err(JobError::Encode(e));
                            break;
                        }
                    },
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }
}

impl IntoResponse for JobStream {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_static(self.framing.content_type());
        let mut response = Body::from_stream(self.into_bytes()).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }
}

/// Finds the completion record at the end of trailer-framed text.
///
/// Scans `{` positions from the end and returns the first suffix that parses as a
/// record, so braces inside model output or inside the record's error text do not
/// confuse it.
pub fn locate_trailing_record(text: &str) -> Option<CompletionRecord> {
    let text = text.trim_end();
    text.match_indices('{')
        .rev()
        .find_map(|(pos, _)| serde_json::from_str::<CompletionRecord>(&text[pos..]).ok())
}
