use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Separator the topic extractor embeds between a topic's label and its course domain.
pub const COURSE_MARKER: &str = "(course-name-is)";

/// Domain used when a topic carries no course marker.
pub const DEFAULT_DOMAIN: &str = "General";

/// Number of topics grouped into one partition.
pub const TOPICS_PER_PARTITION: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopicPartitionRow {
    pub id: Uuid,
    pub collection_id: i64,
    pub partition_index: i32,
    pub topics: Vec<String>,
    pub age: i32,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a topic partition. Exactly five topics by construction.
#[derive(Debug, Clone)]
pub struct NewTopicPartition {
    pub collection_id: i64,
    pub partition_index: i32,
    pub topics: [String; TOPICS_PER_PARTITION],
    pub age: i32,
}

/// A raw topic string split into its display label and course domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicLabel {
    pub label: String,
    pub domain: String,
}

impl TopicLabel {
    /// `"Fractions (course-name-is) Mathematics"` → label `Fractions`, domain `Mathematics`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(COURSE_MARKER) {
            Some((label, domain)) => {
                let domain = domain.trim();
                Self {
                    label: label.trim().to_string(),
                    domain: if domain.is_empty() {
                        DEFAULT_DOMAIN.to_string()
                    } else {
                        domain.to_string()
                    },
                }
            }
            None => Self {
                label: raw.trim().to_string(),
                domain: DEFAULT_DOMAIN.to_string(),
            },
        }
    }
}
