//! In-memory `Store` used by the test suite, with knobs for injecting failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::course::{CourseModuleRow, NewCourseModule};
use crate::models::quiz::{AnswerChoice, NewQuizQuestion, QuizQuestionRow};
use crate::models::topic::{NewTopicPartition, TopicPartitionRow};
use crate::store::{Store, StoreError};

#[derive(Default)]
struct Tables {
    partitions: Vec<TopicPartitionRow>,
    questions: Vec<QuizQuestionRow>,
    modules: Vec<CourseModuleRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    unavailable_partitions: Mutex<HashSet<i32>>,
    failing_topics: Mutex<HashSet<String>>,
    write_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Quiz queries narrowed to this partition fail.
    pub fn fail_partition_reads(&self, partition_index: i32) {
        self.unavailable_partitions
            .lock()
            .unwrap()
            .insert(partition_index);
    }

    /// Writes of quiz questions, course modules, or partitions carrying this topic fail.
    pub fn fail_writes_for_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn partitions(&self) -> Vec<TopicPartitionRow> {
        self.tables.lock().unwrap().partitions.clone()
    }

    pub fn questions(&self) -> Vec<QuizQuestionRow> {
        self.tables.lock().unwrap().questions.clone()
    }

    pub fn modules(&self) -> Vec<CourseModuleRow> {
        self.tables.lock().unwrap().modules.clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, topics: &[&str]) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let failing = self.failing_topics.lock().unwrap();
        if let Some(topic) = topics.iter().find(|t| failing.contains(**t)) {
            return Err(StoreError::Unavailable(format!("write rejected for '{topic}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn latest_collection_id(&self) -> Result<i64, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .partitions
            .iter()
            .map(|p| p.collection_id)
            .max()
            .unwrap_or(0))
    }

    async fn list_topic_partitions(
        &self,
        collection_id: i64,
    ) -> Result<Vec<TopicPartitionRow>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<_> = tables
            .partitions
            .iter()
            .filter(|p| p.collection_id == collection_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.partition_index);
        Ok(rows)
    }

    async fn get_topic_partition(
        &self,
        collection_id: i64,
        partition_index: i32,
    ) -> Result<Option<TopicPartitionRow>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .partitions
            .iter()
            .find(|p| p.collection_id == collection_id && p.partition_index == partition_index)
            .cloned())
    }

    async fn create_topic_partition(
        &self,
        partition: &NewTopicPartition,
    ) -> Result<TopicPartitionRow, StoreError> {
        let topics: Vec<&str> = partition.topics.iter().map(String::as_str).collect();
        self.check_write(&topics)?;
        let row = TopicPartitionRow {
            id: Uuid::new_v4(),
            collection_id: partition.collection_id,
            partition_index: partition.partition_index,
            topics: partition.topics.to_vec(),
            age: partition.age,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().partitions.push(row.clone());
        Ok(row)
    }

    async fn list_quiz_questions(
        &self,
        collection_id: i64,
        partition_index: Option<i32>,
    ) -> Result<Vec<QuizQuestionRow>, StoreError> {
        self.check_available()?;
        if let Some(index) = partition_index {
            if self.unavailable_partitions.lock().unwrap().contains(&index) {
                return Err(StoreError::Unavailable(format!(
                    "partition {index} unreachable"
                )));
            }
        }
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.collection_id == collection_id)
            .filter(|q| partition_index.map_or(true, |p| q.partition_index == p))
            .cloned()
            .collect())
    }

    async fn get_quiz_question(&self, id: Uuid) -> Result<Option<QuizQuestionRow>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn create_quiz_question(
        &self,
        question: &NewQuizQuestion,
    ) -> Result<QuizQuestionRow, StoreError> {
        self.check_write(&[question.topic.as_str()])?;
        let row = QuizQuestionRow {
            id: Uuid::new_v4(),
            collection_id: question.collection_id,
            partition_index: question.partition_index,
            topic: question.topic.clone(),
            question: question.question.clone(),
            option_a: question.option_a.clone(),
            option_b: question.option_b.clone(),
            option_c: question.option_c.clone(),
            option_d: question.option_d.clone(),
            correct_answer: question.correct_answer.as_str().to_string(),
            user_answer: String::new(),
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().questions.push(row.clone());
        Ok(row)
    }

    async fn record_answer(
        &self,
        id: Uuid,
        answer: AnswerChoice,
    ) -> Result<Option<QuizQuestionRow>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        match tables
            .questions
            .iter_mut()
            .find(|q| q.id == id && !q.is_answered())
        {
            Some(q) => {
                q.user_answer = answer.as_str().to_string();
                Ok(Some(q.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_course_modules(
        &self,
        collection_id: i64,
    ) -> Result<Vec<CourseModuleRow>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .modules
            .iter()
            .filter(|m| m.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn create_course_module(
        &self,
        module: &NewCourseModule,
    ) -> Result<CourseModuleRow, StoreError> {
        self.check_write(&[module.topic.as_str()])?;
        let row = CourseModuleRow {
            id: Uuid::new_v4(),
            collection_id: module.collection_id,
            course_title: module.course_title.clone(),
            topic: module.topic.clone(),
            description: module.description.clone(),
            learning_objectives: module.learning_objectives.clone(),
            recommended_resources: module.recommended_resources.clone(),
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().modules.push(row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(topics: [&str; 5]) -> NewTopicPartition {
        NewTopicPartition {
            collection_id: 3,
            partition_index: 1,
            topics: topics.map(str::to_string),
            age: 12,
        }
    }

    #[tokio::test]
    async fn test_failing_topic_rejects_any_write_naming_it() {
        let store = MemoryStore::new();
        store.fail_writes_for_topic("Fractions");

        let err = store
            .create_topic_partition(&partition(["Sets", "Fractions", "Ratios", "Angles", "Area"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Fractions"));
        assert!(store.partitions().is_empty());

        store
            .create_topic_partition(&partition(["Sets", "Primes", "Ratios", "Angles", "Area"]))
            .await
            .unwrap();
        assert_eq!(store.partitions().len(), 1);
        assert_eq!(store.write_attempts(), 2);
    }
}
