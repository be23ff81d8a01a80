//! Axum route handlers for the Jobs API.
//!
//! The three POST handlers stream their job back (see `transport`). The GET
//! handlers report completion: they wait on the in-process tracker and fall back
//! to polling the store when this process never saw the job.

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec;
use crate::errors::AppError;
use crate::generation::document::extract_text;
use crate::generation::orchestrator::GenerationJob;
use crate::generation::tracker::{JobKey, JobPhase};
use crate::generation::transport::{CompletionRecord, Framing};
use crate::generation::JobKind;
use crate::state::AppState;

pub const DEFAULT_AGE: i32 = 16;
pub const COLLECTION_ID_HEADER: &str = "x-collection-id";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QuizJobRequest {
    pub collection_id: i64,
    pub partition_index: i32,
}

#[derive(Debug, Deserialize)]
pub struct CourseJobRequest {
    pub collection_id: i64,
    #[serde(default)]
    pub weak_topics: Vec<String>,
    #[serde(default)]
    pub strong_topics: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Known to this process and still running when the wait budget ran out.
    Running,
    Settled { record: CompletionRecord },
    Aborted { error: String },
    /// Not tracked here, but the store already holds its output.
    Stored { items: usize },
    /// Not tracked here and nothing stored yet.
    Pending,
}

impl JobStatus {
    fn status_code(&self) -> StatusCode {
        match self {
            JobStatus::Running | JobStatus::Pending => StatusCode::ACCEPTED,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for JobStatus {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self)).into_response()
    }
}

struct TopicUpload {
    document: bytes::Bytes,
    age: i32,
    collection_id: Option<i64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/topics
///
/// Multipart upload: `file` (required), `age` (default 16), `collection_id`
/// (default: latest + 1). Streams the topic extraction job.
pub async fn handle_topic_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_topic_upload(multipart).await?;
    let document = extract_text(upload.document).await?;

    let collection_id = match upload.collection_id {
        Some(id) => id,
        None => state.store.latest_collection_id().await? + 1,
    };
    info!(collection_id, chars = document.len(), "Topic upload received");

    let stream = state
        .orchestrator
        .start(
            GenerationJob::Topics {
                collection_id,
                age: upload.age,
                document,
            },
            Framing::from_headers(&headers),
        )
        .await?;

    Ok(([(COLLECTION_ID_HEADER, collection_id.to_string())], stream))
}

/// POST /api/v1/jobs/quiz
pub async fn handle_quiz_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QuizJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let stream = state
        .orchestrator
        .start(
            GenerationJob::Quiz {
                collection_id: request.collection_id,
                partition_index: request.partition_index,
            },
            Framing::from_headers(&headers),
        )
        .await?;
    Ok(stream)
}

/// POST /api/v1/jobs/course
pub async fn handle_course_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CourseJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let stream = state
        .orchestrator
        .start(
            GenerationJob::Course {
                collection_id: request.collection_id,
                weak_topics: request.weak_topics,
                strong_topics: request.strong_topics,
                interests: request.interests,
            },
            Framing::from_headers(&headers),
        )
        .await?;
    Ok(stream)
}

/// GET /api/v1/jobs/topics/:collection_id
pub async fn handle_topic_status(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
) -> Result<JobStatus, AppError> {
    job_status(&state, JobKey::new(JobKind::Topics, collection_id, None)).await
}

/// GET /api/v1/jobs/quiz/:composite
pub async fn handle_quiz_status(
    State(state): State<AppState>,
    Path(composite): Path<i64>,
) -> Result<JobStatus, AppError> {
    let (collection_id, partition_index) = codec::decode(composite)?;
    job_status(
        &state,
        JobKey::new(JobKind::Quiz, collection_id, Some(partition_index)),
    )
    .await
}

/// GET /api/v1/jobs/course/:collection_id
pub async fn handle_course_status(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
) -> Result<JobStatus, AppError> {
    job_status(&state, JobKey::new(JobKind::Course, collection_id, None)).await
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn read_topic_upload(mut multipart: Multipart) -> Result<TopicUpload, AppError> {
    let mut document = None;
    let mut age = DEFAULT_AGE;
    let mut collection_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read multipart data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file bytes: {e}")))?;
                document = Some(data);
            }
            "age" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read age: {e}")))?;
                age = raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Validation(format!("age must be a number, got '{raw}'")))?;
            }
            "collection_id" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read collection_id: {e}"))
                })?;
                collection_id = Some(raw.trim().parse().map_err(|_| {
                    AppError::Validation(format!("collection_id must be a number, got '{raw}'"))
                })?);
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let document = document
        .ok_or_else(|| AppError::Validation("Multipart form must include a file".to_string()))?;
    Ok(TopicUpload {
        document,
        age,
        collection_id,
    })
}

async fn job_status(state: &AppState, key: JobKey) -> Result<JobStatus, AppError> {
    let budget = state.config.status_wait_budget();
    match state.orchestrator.tracker().wait(&key, budget).await {
        Some(JobPhase::Running) => Ok(JobStatus::Running),
        Some(JobPhase::Settled(record)) => Ok(JobStatus::Settled { record }),
        Some(JobPhase::Aborted(error)) => Ok(JobStatus::Aborted { error }),
        None => poll_store(state, &key).await,
    }
}

/// Bounded polling for jobs this process did not run.
async fn poll_store(state: &AppState, key: &JobKey) -> Result<JobStatus, AppError> {
    let attempts = state.config.status_poll_attempts.max(1);
    for attempt in 1..=attempts {
        let items = stored_items(state, key).await?;
        if items > 0 {
            return Ok(JobStatus::Stored { items });
        }
        if attempt < attempts {
            tokio::time::sleep(state.config.status_poll_interval).await;
        }
    }
    debug!(kind = %key.kind, collection_id = key.collection_id, "No job output found after polling");
    Ok(JobStatus::Pending)
}

async fn stored_items(state: &AppState, key: &JobKey) -> Result<usize, AppError> {
    let store = &state.store;
    let count = match key.kind {
        JobKind::Topics => store.list_topic_partitions(key.collection_id).await?.len(),
        JobKind::Quiz => store
            .list_quiz_questions(key.collection_id, key.partition_index)
            .await?
            .len(),
        JobKind::Course => store.list_course_modules(key.collection_id).await?.len(),
    };
    Ok(count)
}
