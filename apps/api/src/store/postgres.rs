use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::course::{CourseModuleRow, NewCourseModule};
use crate::models::quiz::{AnswerChoice, NewQuizQuestion, QuizQuestionRow};
use crate::models::topic::{NewTopicPartition, TopicPartitionRow};
use crate::store::{Store, StoreError};

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn latest_collection_id(&self) -> Result<i64, StoreError> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(collection_id) FROM topic_partitions")
                .fetch_one(&self.pool)
                .await?;
        Ok(latest.unwrap_or(0))
    }

    async fn list_topic_partitions(
        &self,
        collection_id: i64,
    ) -> Result<Vec<TopicPartitionRow>, StoreError> {
        let rows = sqlx::query_as::<_, TopicPartitionRow>(
            "SELECT * FROM topic_partitions WHERE collection_id = $1 ORDER BY partition_index",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_topic_partition(
        &self,
        collection_id: i64,
        partition_index: i32,
    ) -> Result<Option<TopicPartitionRow>, StoreError> {
        let row = sqlx::query_as::<_, TopicPartitionRow>(
            "SELECT * FROM topic_partitions WHERE collection_id = $1 AND partition_index = $2",
        )
        .bind(collection_id)
        .bind(partition_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_topic_partition(
        &self,
        partition: &NewTopicPartition,
    ) -> Result<TopicPartitionRow, StoreError> {
        let row = sqlx::query_as::<_, TopicPartitionRow>(
            r#"
            INSERT INTO topic_partitions (id, collection_id, partition_index, topics, age)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(partition.collection_id)
        .bind(partition.partition_index)
        .bind(&partition.topics[..])
        .bind(partition.age)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_quiz_questions(
        &self,
        collection_id: i64,
        partition_index: Option<i32>,
    ) -> Result<Vec<QuizQuestionRow>, StoreError> {
        let rows = sqlx::query_as::<_, QuizQuestionRow>(
            r#"
            SELECT * FROM quiz_questions
            WHERE collection_id = $1 AND ($2::INTEGER IS NULL OR partition_index = $2)
            ORDER BY partition_index, created_at, id
            "#,
        )
        .bind(collection_id)
        .bind(partition_index)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_quiz_question(&self, id: Uuid) -> Result<Option<QuizQuestionRow>, StoreError> {
        let row = sqlx::query_as::<_, QuizQuestionRow>("SELECT * FROM quiz_questions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_quiz_question(
        &self,
        question: &NewQuizQuestion,
    ) -> Result<QuizQuestionRow, StoreError> {
        let row = sqlx::query_as::<_, QuizQuestionRow>(
            r#"
            INSERT INTO quiz_questions
                (id, collection_id, partition_index, topic, question,
                 option_a, option_b, option_c, option_d, correct_answer, user_answer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, '')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(question.collection_id)
        .bind(question.partition_index)
        .bind(&question.topic)
        .bind(&question.question)
        .bind(&question.option_a)
        .bind(&question.option_b)
        .bind(&question.option_c)
        .bind(&question.option_d)
        .bind(question.correct_answer.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_answer(
        &self,
        id: Uuid,
        answer: AnswerChoice,
    ) -> Result<Option<QuizQuestionRow>, StoreError> {
        // The `user_answer = ''` predicate makes the answer write-once.
        let row = sqlx::query_as::<_, QuizQuestionRow>(
            "UPDATE quiz_questions SET user_answer = $2 WHERE id = $1 AND user_answer = '' RETURNING *",
        )
        .bind(id)
        .bind(answer.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_course_modules(
        &self,
        collection_id: i64,
    ) -> Result<Vec<CourseModuleRow>, StoreError> {
        let rows = sqlx::query_as::<_, CourseModuleRow>(
            "SELECT * FROM course_modules WHERE collection_id = $1 ORDER BY created_at, id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_course_module(
        &self,
        module: &NewCourseModule,
    ) -> Result<CourseModuleRow, StoreError> {
        let row = sqlx::query_as::<_, CourseModuleRow>(
            r#"
            INSERT INTO course_modules
                (id, collection_id, course_title, topic, description,
                 learning_objectives, recommended_resources)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module.collection_id)
        .bind(&module.course_title)
        .bind(&module.topic)
        .bind(&module.description)
        .bind(&module.learning_objectives)
        .bind(&module.recommended_resources)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
