use axum::{
    extract::{Path, State},
    Json,
};

use crate::analysis::analyzer::{analyze, PerformanceReport};
use crate::analysis::progress::{check_progress, ProgressReport};
use crate::codec;
use crate::errors::AppError;
use crate::state::AppState;

/// GET /api/v1/collections/:collection_id/analysis
pub async fn handle_analysis(
    State(state): State<AppState>,
    Path(collection_id): Path<i64>,
) -> Result<Json<PerformanceReport>, AppError> {
    let questions = state.store.list_quiz_questions(collection_id, None).await?;
    if questions.is_empty() {
        return Err(AppError::NotFound(format!(
            "No quiz questions for collection {collection_id}"
        )));
    }
    Ok(Json(analyze(collection_id, &questions)))
}

/// GET /api/v1/progress/:composite
///
/// The composite names the collection and the last partition visited; badges
/// cover partitions 1 through that one.
pub async fn handle_progress(
    State(state): State<AppState>,
    Path(composite): Path<i64>,
) -> Result<Json<ProgressReport>, AppError> {
    let (collection_id, last_partition) = codec::decode(composite)?;
    Ok(Json(
        check_progress(state.store.as_ref(), collection_id, last_partition).await,
    ))
}
