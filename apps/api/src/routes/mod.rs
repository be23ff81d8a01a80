pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::collections::handlers as collections;
use crate::generation::handlers as jobs;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs API: streamed generation plus completion status
        .route(
            "/api/v1/jobs/topics",
            post(jobs::handle_topic_job).layer(upload_limit),
        )
        .route("/api/v1/jobs/quiz", post(jobs::handle_quiz_job))
        .route("/api/v1/jobs/course", post(jobs::handle_course_job))
        .route(
            "/api/v1/jobs/topics/:collection_id",
            get(jobs::handle_topic_status),
        )
        .route("/api/v1/jobs/quiz/:composite", get(jobs::handle_quiz_status))
        .route(
            "/api/v1/jobs/course/:collection_id",
            get(jobs::handle_course_status),
        )
        // Collections API
        .route(
            "/api/v1/collections/latest",
            get(collections::handle_latest_collection),
        )
        .route(
            "/api/v1/collections/:collection_id/topics",
            get(collections::handle_get_topics),
        )
        .route(
            "/api/v1/collections/:collection_id/quiz",
            get(collections::handle_list_questions),
        )
        .route(
            "/api/v1/collections/:collection_id/courses",
            get(collections::handle_get_courses),
        )
        .route(
            "/api/v1/collections/:collection_id/analysis",
            get(analysis::handle_analysis),
        )
        // Progress and answers
        .route("/api/v1/progress/:composite", get(analysis::handle_progress))
        .route("/api/v1/quizzes/:composite", get(collections::handle_get_quiz))
        .route(
            "/api/v1/quizzes/:composite/answers",
            post(collections::handle_submit_answers),
        )
        .route(
            "/api/v1/questions/:id/answer",
            put(collections::handle_record_answer),
        )
        .with_state(state)
}
