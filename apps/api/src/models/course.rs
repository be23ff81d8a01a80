use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseModuleRow {
    pub id: Uuid,
    pub collection_id: i64,
    pub course_title: String,
    pub topic: String,
    pub description: String,
    pub learning_objectives: Vec<String>,
    /// First entry is conventionally a video link, second a book reference.
    pub recommended_resources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourseModule {
    pub collection_id: i64,
    pub course_title: String,
    pub topic: String,
    pub description: String,
    pub learning_objectives: Vec<String>,
    pub recommended_resources: Vec<String>,
}
