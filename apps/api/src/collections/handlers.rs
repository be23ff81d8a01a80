//! Axum route handlers for reading collections and recording answers.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec;
use crate::collections::submission::{is_locked, parse_choice, validate_batch};
use crate::errors::AppError;
use crate::models::course::CourseModuleRow;
use crate::models::quiz::QuizQuestionRow;
use crate::models::topic::{TopicLabel, TopicPartitionRow};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LatestCollectionResponse {
    pub latest_collection_id: i64,
}

#[derive(Debug, Serialize)]
pub struct TopicView {
    pub topic: String,
    pub label: String,
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct TopicPartitionView {
    pub partition_index: i32,
    /// Composite identifier addressing this partition's quiz.
    pub composite: i64,
    pub age: i32,
    pub topics: Vec<TopicView>,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub collection_id: i64,
    pub last_partition: i32,
    pub partitions: Vec<TopicPartitionView>,
}

#[derive(Debug, Deserialize)]
pub struct QuizQuery {
    pub partition_index: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub collection_id: i64,
    pub course_title: Option<String>,
    pub modules: Vec<CourseModuleRow>,
}

/// A question as the learner sees it: the correct answer only shows once the
/// quiz is locked.
#[derive(Debug, Serialize)]
pub struct QuizQuestionView {
    pub id: Uuid,
    pub partition_index: i32,
    pub topic: String,
    pub label: String,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub user_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub collection_id: i64,
    pub partition_index: i32,
    pub locked: bool,
    pub questions: Vec<QuizQuestionView>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswersRequest {
    pub answers: HashMap<Uuid, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswersResponse {
    pub collection_id: i64,
    pub partition_index: i32,
    pub recorded: usize,
    /// Answers that lost a race with a concurrent submission.
    pub already_answered: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub user_answer: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/collections/latest
pub async fn handle_latest_collection(
    State(state): State<AppState>,
) -> Result<Json<LatestCollectionResponse>, AppError> {
    let latest_collection_id = state.store.latest_collection_id().await?;
    Ok(Json(LatestCollectionResponse {
        latest_collection_id,
    }))
}

/// GET /api/v1/collections/:collection_id/topics
pub async fn handle_get_topics(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
) -> Result<Json<TopicsResponse>, AppError> {
    let rows = state.store.list_topic_partitions(collection_id).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(format!(
            "No topics for collection {collection_id}"
        )));
    }

    let partitions = rows
        .into_iter()
        .map(partition_view)
        .collect::<Result<Vec<_>, _>>()?;
    let last_partition = partitions
        .iter()
        .map(|p| p.partition_index)
        .max()
        .unwrap_or(0);

    Ok(Json(TopicsResponse {
        collection_id,
        last_partition,
        partitions,
    }))
}

/// GET /api/v1/collections/:collection_id/quiz?partition_index=
///
/// Spans several partitions when no index is given, so the lock is decided per
/// partition.
pub async fn handle_list_questions(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
    Query(query): Query<QuizQuery>,
) -> Result<Json<Vec<QuizQuestionView>>, AppError> {
    let questions = state
        .store
        .list_quiz_questions(collection_id, query.partition_index)
        .await?;
    let locked: HashSet<i32> = questions
        .iter()
        .filter(|q| q.is_answered())
        .map(|q| q.partition_index)
        .collect();
    Ok(Json(
        questions
            .into_iter()
            .map(|q| {
                let partition_locked = locked.contains(&q.partition_index);
                question_view(q, partition_locked)
            })
            .collect(),
    ))
}

/// GET /api/v1/collections/:collection_id/courses
pub async fn handle_get_courses(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
) -> Result<Json<CourseResponse>, AppError> {
    let modules = state.store.list_course_modules(collection_id).await?;
    if modules.is_empty() {
        return Err(AppError::NotFound(format!(
            "No course for collection {collection_id}"
        )));
    }
    Ok(Json(CourseResponse {
        collection_id,
        course_title: modules.first().map(|m| m.course_title.clone()),
        modules,
    }))
}

/// GET /api/v1/quizzes/:composite
pub async fn handle_get_quiz(
    State(state): State<AppState>,
    Path(composite): Path<i64>,
) -> Result<Json<QuizResponse>, AppError> {
    let (collection_id, partition_index) = codec::decode(composite)?;
    let questions = state
        .store
        .list_quiz_questions(collection_id, Some(partition_index))
        .await?;
    if questions.is_empty() {
        return Err(AppError::NotFound(format!(
            "No quiz for partition {partition_index} of collection {collection_id}"
        )));
    }

    let locked = is_locked(&questions);
    Ok(Json(QuizResponse {
        collection_id,
        partition_index,
        locked,
        questions: questions
            .into_iter()
            .map(|q| question_view(q, locked))
            .collect(),
    }))
}

/// POST /api/v1/quizzes/:composite/answers
///
/// Records a whole partition's answers at once. Refused with 409 once any
/// answer exists for the partition.
pub async fn handle_submit_answers(
    State(state): State<AppState>,
    Path(composite): Path<i64>,
    Json(request): Json<SubmitAnswersRequest>,
) -> Result<Json<SubmitAnswersResponse>, AppError> {
    let (collection_id, partition_index) = codec::decode(composite)?;
    let questions = state
        .store
        .list_quiz_questions(collection_id, Some(partition_index))
        .await?;
    if questions.is_empty() {
        return Err(AppError::NotFound(format!(
            "No quiz for partition {partition_index} of collection {collection_id}"
        )));
    }

    let accepted = validate_batch(&questions, &request.answers)?;
    let writes = accepted
        .iter()
        .map(|(id, choice)| state.store.record_answer(*id, *choice));
    let results = join_all(writes).await;

    let mut recorded = 0;
    let mut already_answered = 0;
    for result in results {
        match result? {
            Some(_) => recorded += 1,
            None => already_answered += 1,
        }
    }
    if recorded == 0 {
        return Err(AppError::Conflict(
            "This quiz has already been submitted".to_string(),
        ));
    }
    if already_answered > 0 {
        warn!(
            collection_id,
            partition_index, already_answered, "Concurrent submission overlapped this one"
        );
    }
    info!(collection_id, partition_index, recorded, "Quiz answers recorded");

    Ok(Json(SubmitAnswersResponse {
        collection_id,
        partition_index,
        recorded,
        already_answered,
    }))
}

/// PUT /api/v1/questions/:id/answer
///
/// Only the first answer of a partition goes through this way; after that the
/// partition is locked like a batch submission.
pub async fn handle_record_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<QuizQuestionRow>, AppError> {
    let choice = parse_choice(&request.user_answer)?;
    let question = state
        .store
        .get_quiz_question(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question {id}")))?;
    if question.is_answered() {
        return Err(AppError::Conflict(format!(
            "Question {id} has already been answered"
        )));
    }
    let partition = state
        .store
        .list_quiz_questions(question.collection_id, Some(question.partition_index))
        .await?;
    if is_locked(&partition) {
        return Err(AppError::Conflict(format!(
            "Partition {} of collection {} has already been submitted",
            question.partition_index, question.collection_id
        )));
    }

    let row = state
        .store
        .record_answer(id, choice)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("Question {id} has already been answered")))?;
    Ok(Json(row))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn partition_view(row: TopicPartitionRow) -> Result<TopicPartitionView, AppError> {
    Ok(TopicPartitionView {
        partition_index: row.partition_index,
        composite: codec::encode(row.collection_id, row.partition_index)?,
        age: row.age,
        topics: row
            .topics
            .into_iter()
            .map(|topic| {
                let TopicLabel { label, domain } = TopicLabel::parse(&topic);
                TopicView {
                    topic,
                    label,
                    domain,
                }
            })
            .collect(),
    })
}

fn question_view(q: QuizQuestionRow, locked: bool) -> QuizQuestionView {
    let label = TopicLabel::parse(&q.topic).label;
    let user_answer = q.is_answered().then(|| q.user_answer.clone());
    QuizQuestionView {
        id: q.id,
        partition_index: q.partition_index,
        label,
        topic: q.topic,
        question: q.question,
        option_a: q.option_a,
        option_b: q.option_b,
        option_c: q.option_c,
        option_d: q.option_d,
        user_answer,
        correct_answer: locked.then_some(q.correct_answer),
        created_at: q.created_at,
    }
}
