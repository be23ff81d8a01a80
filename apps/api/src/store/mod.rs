//! Persistence collaborator.
//!
//! Every query is an equality filter on collection id (and optionally partition
//! index). The pipeline holds no state of its own: each decision is made against a
//! snapshot fetched through this trait at call time.
//!
//! `AppState` carries an `Arc<dyn Store>`; production uses [`postgres::PgStore`].

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::course::{CourseModuleRow, NewCourseModule};
use crate::models::quiz::{AnswerChoice, NewQuizQuestion, QuizQuestionRow};
use crate::models::topic::{NewTopicPartition, TopicPartitionRow};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Database(other),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Highest collection id that has topic partitions, or 0 when there are none.
    async fn latest_collection_id(&self) -> Result<i64, StoreError>;

    async fn list_topic_partitions(
        &self,
        collection_id: i64,
    ) -> Result<Vec<TopicPartitionRow>, StoreError>;

    async fn get_topic_partition(
        &self,
        collection_id: i64,
        partition_index: i32,
    ) -> Result<Option<TopicPartitionRow>, StoreError>;

    async fn create_topic_partition(
        &self,
        partition: &NewTopicPartition,
    ) -> Result<TopicPartitionRow, StoreError>;

    /// Questions for a collection, optionally narrowed to one partition.
    async fn list_quiz_questions(
        &self,
        collection_id: i64,
        partition_index: Option<i32>,
    ) -> Result<Vec<QuizQuestionRow>, StoreError>;

    async fn get_quiz_question(&self, id: Uuid) -> Result<Option<QuizQuestionRow>, StoreError>;

    async fn create_quiz_question(
        &self,
        question: &NewQuizQuestion,
    ) -> Result<QuizQuestionRow, StoreError>;

    /// Records the learner's answer only if none is recorded yet.
    /// Returns `None` when the question is missing or already answered.
    async fn record_answer(
        &self,
        id: Uuid,
        answer: AnswerChoice,
    ) -> Result<Option<QuizQuestionRow>, StoreError>;

    async fn list_course_modules(
        &self,
        collection_id: i64,
    ) -> Result<Vec<CourseModuleRow>, StoreError>;

    async fn create_course_module(
        &self,
        module: &NewCourseModule,
    ) -> Result<CourseModuleRow, StoreError>;
}
