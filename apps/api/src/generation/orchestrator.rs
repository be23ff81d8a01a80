//! Drives one generation job from prompt to completion record.
//!
//! `start` does everything that can still fail with an HTTP status (preflight
//! reads, the model call itself) and then hands a spawned task the model stream.
//! From that point the caller only sees the stream: relayed chunks, then either
//! one completion record or an aborted body.
//!
//! Every job makes exactly one model call. Persistence happens only after the
//! stream has drained and the output has validated; items are written
//! concurrently and a failed write is counted, never fatal.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{future::join_all, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::codec::{self, MAX_PARTITION_INDEX};
use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{ContentModel, LlmError, ModelRequest, TextStream};
use crate::models::course::NewCourseModule;
use crate::models::quiz::NewQuizQuestion;
use crate::models::topic::{NewTopicPartition, TopicLabel, TOPICS_PER_PARTITION};
use crate::store::{Store, StoreError};

use super::guard::should_skip;
use super::prompts::{
    list_or_none, COURSE_PROMPT_TEMPLATE, COURSE_SYSTEM_TEMPLATE, QUIZ_PROMPT_TEMPLATE,
    QUIZ_SYSTEM, TOPIC_PROMPT_TEMPLATE, TOPIC_SYSTEM_TEMPLATE,
};
use super::schema::{parse_course, parse_quiz, parse_topics, ModuleDraft, ValidationError};
use super::tracker::{JobHandle, JobKey, JobTracker};
use super::transport::{
    self, CompletionRecord, CompletionStatus, Framing, JobError, JobSink, JobStream,
};
use super::JobKind;

pub const MIN_AGE: i32 = 1;
pub const MAX_AGE: i32 = 120;

#[derive(Debug, Clone)]
pub enum GenerationJob {
    Topics {
        collection_id: i64,
        age: i32,
        document: String,
    },
    Quiz {
        collection_id: i64,
        partition_index: i32,
    },
    Course {
        collection_id: i64,
        weak_topics: Vec<String>,
        strong_topics: Vec<String>,
        interests: Vec<String>,
    },
}

impl GenerationJob {
    pub fn kind(&self) -> JobKind {
        match self {
            GenerationJob::Topics { .. } => JobKind::Topics,
            GenerationJob::Quiz { .. } => JobKind::Quiz,
            GenerationJob::Course { .. } => JobKind::Course,
        }
    }

    pub fn collection_id(&self) -> i64 {
        match self {
            GenerationJob::Topics { collection_id, .. }
            | GenerationJob::Quiz { collection_id, .. }
            | GenerationJob::Course { collection_id, .. } => *collection_id,
        }
    }

    pub fn key(&self) -> JobKey {
        let partition_index = match self {
            GenerationJob::Quiz {
                partition_index, ..
            } => Some(*partition_index),
            _ => None,
        };
        JobKey::new(self.kind(), self.collection_id(), partition_index)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PersistSummary {
    persisted: usize,
    failed: usize,
}

impl PersistSummary {
    fn apply(self, mut record: CompletionRecord) -> CompletionRecord {
        record.persisted = self.persisted;
        record.failed = self.failed;
        record
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    model: Arc<dyn ContentModel>,
    tracker: JobTracker,
    max_duration: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn ContentModel>,
        tracker: JobTracker,
        max_duration: Duration,
    ) -> Self {
        Self {
            store,
            model,
            tracker,
            max_duration,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Runs preflight and opens the model stream; the rest of the job continues
    /// on a spawned task feeding the returned stream.
    pub async fn start(&self, job: GenerationJob, framing: Framing) -> Result<JobStream, AppError> {
        let request = self.prepare(&job).await?;
        let key = job.key();
        info!(
            kind = %key.kind,
            collection_id = key.collection_id,
            partition_index = ?key.partition_index,
            "Starting generation job"
        );

        if self.tracker.phase(&key).is_some_and(|p| p.is_running()) {
            warn!(
                kind = %key.kind,
                collection_id = key.collection_id,
                "Job re-issued while a previous run is in flight"
            );
        }
        let deadline = Instant::now() + self.max_duration;
        let handle = self.tracker.begin(key);

        let opened = timeout_at(deadline, self.model.stream(request))
            .await
            .unwrap_or_else(|_| Err(LlmError::Timeout(self.max_duration)));
        let text = match opened {
            Ok(text) => text,
            Err(e) => {
                handle.abort(e.to_string());
                return Err(e.into());
            }
        };

        let (sink, stream) = transport::channel(framing);
        let this = self.clone();
        tokio::spawn(async move { this.drive(job, text, sink, handle, deadline).await });
        Ok(stream)
    }

    /// Preflight checks plus prompt assembly. Nothing here calls the model.
    async fn prepare(&self, job: &GenerationJob) -> Result<ModelRequest, AppError> {
        match job {
            GenerationJob::Topics {
                collection_id,
                age,
                document,
            } => {
                // the whole partition range of this collection must be addressable
                codec::encode(*collection_id, MAX_PARTITION_INDEX)?;
                if !(MIN_AGE..=MAX_AGE).contains(age) {
                    return Err(AppError::Validation(format!(
                        "age must be between {MIN_AGE} and {MAX_AGE}"
                    )));
                }
                if document.trim().is_empty() {
                    return Err(AppError::Validation(
                        "document contains no readable text".to_string(),
                    ));
                }
                Ok(ModelRequest {
                    system: TOPIC_SYSTEM_TEMPLATE
                        .replace("{age}", &age.to_string())
                        .replace("{json_only}", JSON_ONLY_SYSTEM),
                    prompt: TOPIC_PROMPT_TEMPLATE.replace("{document}", document),
                })
            }
            GenerationJob::Quiz {
                collection_id,
                partition_index,
            } => {
                codec::encode(*collection_id, *partition_index)?;
                let partition = self
                    .store
                    .get_topic_partition(*collection_id, *partition_index)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Topic partition {partition_index} of collection {collection_id}"
                        ))
                    })?;
                let topics = partition
                    .topics
                    .iter()
                    .map(|t| format!("- {t}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ModelRequest {
                    system: QUIZ_SYSTEM.to_string(),
                    prompt: QUIZ_PROMPT_TEMPLATE.replace("{topics}", &topics),
                })
            }
            GenerationJob::Course {
                collection_id,
                weak_topics,
                strong_topics,
                interests,
            } => {
                codec::encode(*collection_id, 0)?;
                let domain = weak_topics
                    .first()
                    .or_else(|| strong_topics.first())
                    .map(|t| TopicLabel::parse(t).domain)
                    .ok_or_else(|| {
                        AppError::Validation(
                            "at least one weak or strong topic is required".to_string(),
                        )
                    })?;
                let labels = |topics: &[String]| {
                    topics
                        .iter()
                        .map(|t| TopicLabel::parse(t).label)
                        .collect::<Vec<_>>()
                };
                Ok(ModelRequest {
                    system: COURSE_SYSTEM_TEMPLATE
                        .replace("{domain}", &domain)
                        .replace("{json_only}", JSON_ONLY_SYSTEM),
                    prompt: COURSE_PROMPT_TEMPLATE
                        .replace("{weak}", &list_or_none(&labels(weak_topics)))
                        .replace("{strong}", &list_or_none(&labels(strong_topics)))
                        .replace("{interests}", &list_or_none(interests)),
                })
            }
        }
    }

    async fn drive(
        self,
        job: GenerationJob,
        mut text: TextStream,
        mut sink: JobSink,
        handle: JobHandle,
        deadline: Instant,
    ) {
        let run = async {
            let mut output = String::new();
            while let Some(chunk) = text.next().await {
                let chunk = chunk?;
                output.push_str(&chunk);
                sink.relay(chunk).await;
            }
            debug!(kind = %job.kind(), chars = output.len(), "Model stream drained");
            if !sink.is_connected() {
                info!(kind = %job.kind(), "Caller disconnected; persisting output anyway");
            }
            Ok::<_, JobError>(self.settle(&job, &output).await)
        };
        let outcome = timeout_at(deadline, run)
            .await
            .unwrap_or_else(|_| Err(JobError::DeadlineExceeded(self.max_duration)));

        match outcome {
            Ok(record) => {
                info!(
                    kind = %job.kind(),
                    collection_id = record.collection_id,
                    status = ?record.status,
                    persisted = record.persisted,
                    failed = record.failed,
                    skipped = record.skipped,
                    "Generation job settled"
                );
                handle.settle(record.clone());
                sink.finish(record).await;
            }
            Err(e) => {
                error!(
                    kind = %job.kind(),
                    collection_id = job.collection_id(),
                    "Generation job aborted: {e}"
                );
                handle.abort(e.to_string());
                sink.fail(e).await;
            }
        }
    }

    /// Validation, guard and persistence over the complete model output.
    async fn settle(&self, job: &GenerationJob, output: &str) -> CompletionRecord {
        match job {
            GenerationJob::Topics {
                collection_id,
                age,
                ..
            } => self.settle_topics(*collection_id, *age, output).await,
            GenerationJob::Quiz {
                collection_id,
                partition_index,
            } => {
                self.settle_quiz(*collection_id, *partition_index, output)
                    .await
            }
            GenerationJob::Course {
                collection_id,
                weak_topics,
                strong_topics,
                ..
            } => {
                self.settle_course(*collection_id, weak_topics, strong_topics, output)
                    .await
            }
        }
    }

    async fn settle_topics(&self, collection_id: i64, age: i32, output: &str) -> CompletionRecord {
        let record = CompletionRecord::new(collection_id, CompletionStatus::Complete);
        let topics = match parse_topics(output) {
            Ok(topics) => topics,
            Err(e) => return rejected(record, e),
        };

        let partitions = partition_topics(collection_id, age, topics);
        let record = CompletionRecord {
            last_partition: Some(partitions.len()),
            ..record
        };
        persist_each(
            JobKind::Topics,
            &partitions,
            |p| format!("partition {}", p.partition_index),
            |p| self.store.create_topic_partition(p),
        )
        .await
        .apply(record)
    }

    async fn settle_quiz(
        &self,
        collection_id: i64,
        partition_index: i32,
        output: &str,
    ) -> CompletionRecord {
        let record = CompletionRecord {
            partition_index: Some(partition_index),
            ..CompletionRecord::new(collection_id, CompletionStatus::Complete)
        };
        let items = match parse_quiz(output) {
            Ok(items) => items,
            Err(e) => return rejected(record, e),
        };

        let questions: Vec<NewQuizQuestion> = items
            .into_iter()
            .map(|item| NewQuizQuestion {
                collection_id,
                partition_index,
                topic: item.topic,
                question: item.question,
                option_a: item.option_a,
                option_b: item.option_b,
                option_c: item.option_c,
                option_d: item.option_d,
                correct_answer: item.correct_answer,
            })
            .collect();
        persist_each(
            JobKind::Quiz,
            &questions,
            |q| q.topic.clone(),
            |q| self.store.create_quiz_question(q),
        )
        .await
        .apply(record)
    }

    async fn settle_course(
        &self,
        collection_id: i64,
        weak_topics: &[String],
        strong_topics: &[String],
        output: &str,
    ) -> CompletionRecord {
        let mut record =
            CompletionRecord::new(collection_id, CompletionStatus::CourseGenerationComplete);
        let mut outline = match parse_course(output) {
            Ok(outline) => outline,
            Err(e) => return rejected(record, e),
        };

        retain_requested(&mut outline.weak_modules, weak_topics, "weak");
        retain_requested(&mut outline.strong_modules, strong_topics, "strong");

        match self.store.list_course_modules(collection_id).await {
            Err(e) => {
                error!(collection_id, "Course idempotency check failed, nothing written: {e}");
                record.status = CompletionStatus::Error;
                record.error = Some(format!("idempotency check failed: {e}"));
                return record;
            }
            Ok(existing) if should_skip(&existing) => {
                info!(
                    collection_id,
                    existing = existing.len(),
                    "Course already generated for collection; skipping persistence"
                );
                record.skipped = true;
                return record;
            }
            Ok(_) => {}
        }

        let course_title = outline.course_title;
        let modules: Vec<NewCourseModule> = outline
            .weak_modules
            .into_iter()
            .chain(outline.strong_modules)
            .map(|m: ModuleDraft| NewCourseModule {
                collection_id,
                course_title: course_title.clone(),
                topic: m.topic,
                description: m.description,
                learning_objectives: m.learning_objectives,
                recommended_resources: m.recommended_resources,
            })
            .collect();
        persist_each(
            JobKind::Course,
            &modules,
            |m| m.topic.clone(),
            |m| self.store.create_course_module(m),
        )
        .await
        .apply(record)
    }
}

fn rejected(mut record: CompletionRecord, e: ValidationError) -> CompletionRecord {
    warn!(
        kind = %e.kind,
        collection_id = record.collection_id,
        violations = ?e.violations,
        "Model output failed validation; nothing persisted"
    );
    record.status = CompletionStatus::Error;
    record.error = Some(e.to_string());
    record
}

/// Keeps the modules whose topic names one of the requested topics, compared by
/// label and ignoring case. An empty request drops the whole category.
fn retain_requested(modules: &mut Vec<ModuleDraft>, requested: &[String], category: &str) {
    let wanted: HashSet<String> = requested.iter().map(|t| label_key(t)).collect();
    let before = modules.len();
    modules.retain(|m| wanted.contains(&label_key(&m.topic)));
    let dropped = before - modules.len();
    if dropped > 0 {
        warn!(category, dropped, "Dropping modules for topics that were not requested");
    }
}

fn label_key(topic: &str) -> String {
    TopicLabel::parse(topic).label.to_lowercase()
}

/// Groups validated topics into partitions of five, numbered from 1.
///
/// An incomplete trailing group is dropped, and so is everything past the ninth
/// partition: a tenth index would not fit the composite identifier.
fn partition_topics(collection_id: i64, age: i32, topics: Vec<String>) -> Vec<NewTopicPartition> {
    let complete = topics.len() / TOPICS_PER_PARTITION;
    let kept = complete.min(MAX_PARTITION_INDEX as usize);

    let remainder = topics.len() % TOPICS_PER_PARTITION;
    if remainder > 0 {
        debug!(collection_id, dropped = remainder, "Dropping incomplete trailing topic group");
    }
    if complete > kept {
        warn!(
            collection_id,
            produced = complete,
            kept,
            dropped_topics = (complete - kept) * TOPICS_PER_PARTITION,
            "Topic partitions exceed the composite identifier range; extra topics dropped"
        );
    }

    topics
        .chunks_exact(TOPICS_PER_PARTITION)
        .take(kept)
        .zip(1_i32..)
        .filter_map(|(chunk, partition_index)| {
            Some(NewTopicPartition {
                collection_id,
                partition_index,
                topics: chunk.to_vec().try_into().ok()?,
                age,
            })
        })
        .collect()
}

/// Writes every item concurrently. A failed write is logged and counted; the
/// rest of the batch still runs.
async fn persist_each<'a, T, R, Fut>(
    kind: JobKind,
    items: &'a [T],
    label: impl Fn(&T) -> String,
    write: impl Fn(&'a T) -> Fut,
) -> PersistSummary
where
    Fut: Future<Output = Result<R, StoreError>>,
{
    let results = join_all(items.iter().map(write)).await;

    let mut summary = PersistSummary::default();
    for (item, result) in items.iter().zip(results) {
        match result {
            Ok(_) => summary.persisted += 1,
            Err(e) => {
                summary.failed += 1;
                error!(kind = %kind, item = %label(item), "Failed to persist generated item: {e}");
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::tracker::JobPhase;
    use crate::generation::transport::locate_trailing_record;
    use crate::llm_client::scripted::{Script, ScriptedModel};
    use crate::models::quiz::DONT_KNOW;
    use crate::store::memory::MemoryStore;

    struct Outcome {
        text: String,
        record: Option<CompletionRecord>,
        error: Option<JobError>,
    }

    fn topic(i: usize) -> String {
        format!("Topic {i} (course-name-is) Mathematics")
    }

    fn topics_json(count: usize) -> String {
        serde_json::json!({ "topics": (1..=count).map(topic).collect::<Vec<_>>() }).to_string()
    }

    fn quiz_json(correct: &str) -> String {
        let questions: Vec<_> = (1..=5)
            .map(|i| {
                serde_json::json!({
                    "question": format!("Which statement about topic {i} is true?"),
                    "topic": topic(i),
                    "option_a": "First",
                    "option_b": "Second",
                    "option_c": "Third",
                    "correct_answer": correct
                })
            })
            .collect();
        serde_json::json!({ "questions": questions }).to_string()
    }

    fn course_json() -> String {
        course_json_with(&["Fractions"], &["Addition"])
    }

    fn course_json_with(weak: &[&str], strong: &[&str]) -> String {
        let module = |name: &&str| {
            serde_json::json!({
                "topic": name,
                "description": "A module written for this learner.",
                "learning_objectives": ["Solve a real-world problem"],
                "recommended_resources": ["https://video.example/1", "A Book by An Author", "An article"]
            })
        };
        serde_json::json!({
            "course_title": "Mathematics Boost",
            "weak_modules": weak.iter().map(module).collect::<Vec<_>>(),
            "strong_modules": strong.iter().map(module).collect::<Vec<_>>()
        })
        .to_string()
    }

    fn course_job(weak: &[String], strong: &[String]) -> GenerationJob {
        GenerationJob::Course {
            collection_id: 7,
            weak_topics: weak.to_vec(),
            strong_topics: strong.to_vec(),
            interests: vec!["football".to_string()],
        }
    }

    fn orchestrator(store: &Arc<MemoryStore>, model: &Arc<ScriptedModel>) -> Orchestrator {
        Orchestrator::new(
            store.clone(),
            model.clone(),
            JobTracker::new(),
            Duration::from_secs(60),
        )
    }

    async fn seed_partition(store: &MemoryStore, collection_id: i64, partition_index: i32) {
        store
            .create_topic_partition(&NewTopicPartition {
                collection_id,
                partition_index,
                topics: std::array::from_fn(|i| topic(i + 1)),
                age: 12,
            })
            .await
            .unwrap();
    }

    async fn run(orchestrator: &Orchestrator, job: GenerationJob) -> Outcome {
        let stream = orchestrator
            .start(job, Framing::Trailer)
            .await
            .expect("job should start");
        let mut bytes = Box::pin(stream.into_bytes());
        let mut body = Vec::new();
        let mut error = None;
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(b) => body.extend_from_slice(&b),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        let text = String::from_utf8(body).unwrap();
        let record = locate_trailing_record(&text);
        Outcome {
            text,
            record,
            error,
        }
    }

    #[tokio::test]
    async fn test_topic_job_partitions_by_five() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&topics_json(12), 17));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Topics {
                collection_id: 3,
                age: 12,
                document: "Unit 1: Numbers".to_string(),
            },
        )
        .await;

        let record = outcome.record.expect("trailing record");
        assert_eq!(record.status, CompletionStatus::Complete);
        assert_eq!(record.last_partition, Some(2));
        assert_eq!(record.persisted, 2);

        let mut partitions = store.partitions();
        partitions.sort_by_key(|p| p.partition_index);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].topics[0], topic(1));
        assert_eq!(partitions[1].topics[4], topic(10));
        assert!(outcome.text.starts_with("{\"topics\""));
        assert!(model.requests()[0].system.contains("12 years old"));
    }

    #[tokio::test]
    async fn test_topic_job_caps_at_nine_partitions() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&topics_json(50), 64));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Topics {
                collection_id: 3,
                age: 16,
                document: "A long syllabus".to_string(),
            },
        )
        .await;

        assert_eq!(outcome.record.unwrap().last_partition, Some(9));
        let mut indices: Vec<i32> = store.partitions().iter().map(|p| p.partition_index).collect();
        indices.sort();
        assert_eq!(indices, (1..=9).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_topic_job_rejects_blank_document_before_model_call() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&topics_json(5), 8));
        let result = orchestrator(&store, &model)
            .start(
                GenerationJob::Topics {
                    collection_id: 3,
                    age: 16,
                    document: "  \n ".to_string(),
                },
                Framing::Trailer,
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_quiz_job_persists_questions_with_sentinel_option() {
        let store = Arc::new(MemoryStore::new());
        seed_partition(&store, 7, 1).await;
        let model = Arc::new(ScriptedModel::chunked(&quiz_json("b"), 23));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Quiz {
                collection_id: 7,
                partition_index: 1,
            },
        )
        .await;

        let record = outcome.record.unwrap();
        assert_eq!(record.partition_index, Some(1));
        assert_eq!((record.persisted, record.failed), (5, 0));
        let questions = store.questions();
        assert!(questions.iter().all(|q| q.option_d == DONT_KNOW));
        assert!(questions.iter().all(|q| q.user_answer.is_empty()));
        assert!(model.requests()[0].prompt.contains(&topic(3)));
    }

    #[tokio::test]
    async fn test_quiz_job_missing_partition_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&quiz_json("a"), 8));
        let result = orchestrator(&store, &model)
            .start(
                GenerationJob::Quiz {
                    collection_id: 7,
                    partition_index: 4,
                },
                Framing::Trailer,
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_quiz_job_out_of_range_partition_is_encoding_error() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&quiz_json("a"), 8));
        let result = orchestrator(&store, &model)
            .start(
                GenerationJob::Quiz {
                    collection_id: 7,
                    partition_index: 10,
                },
                Framing::Trailer,
            )
            .await;
        assert!(matches!(result, Err(AppError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_quiz_with_sentinel_correct_answer_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        seed_partition(&store, 7, 1).await;
        let writes_before = store.write_attempts();
        let model = Arc::new(ScriptedModel::chunked(&quiz_json("d"), 40));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Quiz {
                collection_id: 7,
                partition_index: 1,
            },
        )
        .await;

        let record = outcome.record.unwrap();
        assert_eq!(record.status, CompletionStatus::Error);
        assert!(record.error.unwrap().contains("correct_answer is 'd'"));
        assert_eq!(store.write_attempts(), writes_before);
        assert!(store.questions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_item_write_does_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        seed_partition(&store, 7, 1).await;
        store.fail_writes_for_topic(&topic(3));
        let model = Arc::new(ScriptedModel::chunked(&quiz_json("c"), 40));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Quiz {
                collection_id: 7,
                partition_index: 1,
            },
        )
        .await;

        let record = outcome.record.unwrap();
        assert_eq!(record.status, CompletionStatus::Complete);
        assert_eq!((record.persisted, record.failed), (4, 1));
        assert_eq!(store.questions().len(), 4);
    }

    #[tokio::test]
    async fn test_course_job_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&course_json(), 50));
        let orchestrator = orchestrator(&store, &model);
        let job = course_job(
            &["Fractions (course-name-is) Mathematics".to_string()],
            &["Addition (course-name-is) Mathematics".to_string()],
        );

        let first = run(&orchestrator, job.clone()).await.record.unwrap();
        assert_eq!(first.status, CompletionStatus::CourseGenerationComplete);
        assert_eq!(first.persisted, 2);
        assert!(!first.skipped);

        let second = run(&orchestrator, job).await.record.unwrap();
        assert_eq!(second.status, CompletionStatus::CourseGenerationComplete);
        assert!(second.skipped);
        assert_eq!(second.persisted, 0);

        assert_eq!(store.modules().len(), 2);
        assert_eq!(store.write_attempts(), 2);
    }

    #[tokio::test]
    async fn test_course_job_drops_modules_for_unlisted_topics() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(
            &course_json_with(&["fractions", "Probability"], &[]),
            50,
        ));
        let record = run(
            &orchestrator(&store, &model),
            course_job(&["Fractions (course-name-is) Mathematics".to_string()], &[]),
        )
        .await
        .record
        .unwrap();

        assert_eq!(record.status, CompletionStatus::CourseGenerationComplete);
        assert_eq!(record.persisted, 1);
        let modules = store.modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].topic, "fractions");
    }

    #[tokio::test]
    async fn test_course_job_drops_unrequested_category() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&course_json(), 50));
        let record = run(
            &orchestrator(&store, &model),
            course_job(&["Fractions (course-name-is) Mathematics".to_string()], &[]),
        )
        .await
        .record
        .unwrap();

        assert_eq!(record.persisted, 1);
        let modules = store.modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].topic, "Fractions");
        assert_eq!(modules[0].course_title, "Mathematics Boost");

        let request = &model.requests()[0];
        assert!(request.system.contains("\"Mathematics\""));
        assert!(request.prompt.contains("Weak Topics: Fractions"));
        assert!(request.prompt.contains("Strong Topics: None"));
    }

    #[tokio::test]
    async fn test_course_job_requires_some_topic() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&course_json(), 50));
        let result = orchestrator(&store, &model)
            .start(course_job(&[], &[]), Framing::Trailer)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_course_guard_read_failure_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let model = Arc::new(ScriptedModel::chunked(&course_json(), 50));
        let record = run(&orchestrator(&store, &model), course_job(&[topic(1)], &[]))
            .await
            .record
            .unwrap();

        assert_eq!(record.status, CompletionStatus::Error);
        assert_eq!(record.persisted, 0);
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_model_open_failure_is_an_llm_error() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(Script::FailToOpen));
        let orchestrator = orchestrator(&store, &model);
        let job = course_job(&[topic(1)], &[]);
        let key = job.key();

        let result = orchestrator.start(job, Framing::Trailer).await;
        assert!(matches!(result, Err(AppError::Llm(LlmError::Api { status: 529, .. }))));
        assert!(matches!(
            orchestrator.tracker().phase(&key),
            Some(JobPhase::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_aborts_without_record() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(Script::FailMidStream(vec![
            "{\"topics\": [".to_string(),
        ])));
        let outcome = run(
            &orchestrator(&store, &model),
            GenerationJob::Topics {
                collection_id: 3,
                age: 16,
                document: "Unit 1".to_string(),
            },
        )
        .await;

        assert_eq!(outcome.text, "{\"topics\": [");
        assert!(outcome.record.is_none());
        assert!(matches!(outcome.error, Some(JobError::Transport(_))));
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_without_record() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(Script::Stall(vec![
            "{\"topics\"".to_string(),
        ])));
        let tracker = JobTracker::new();
        let orchestrator = Orchestrator::new(
            store.clone(),
            model.clone(),
            tracker.clone(),
            Duration::from_secs(5),
        );
        let job = GenerationJob::Topics {
            collection_id: 3,
            age: 16,
            document: "Unit 1".to_string(),
        };
        let key = job.key();

        let outcome = run(&orchestrator, job).await;
        assert_eq!(outcome.text, "{\"topics\"");
        assert!(outcome.record.is_none());
        assert!(matches!(outcome.error, Some(JobError::DeadlineExceeded(_))));
        assert_eq!(store.write_attempts(), 0);
        assert!(matches!(tracker.phase(&key), Some(JobPhase::Aborted(_))));
    }

    #[tokio::test]
    async fn test_job_persists_after_caller_disconnects() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::chunked(&topics_json(5), 3));
        let tracker = JobTracker::new();
        let orchestrator =
            Orchestrator::new(store.clone(), model.clone(), tracker.clone(), Duration::from_secs(60));
        let job = GenerationJob::Topics {
            collection_id: 3,
            age: 16,
            document: "Unit 1".to_string(),
        };
        let key = job.key();

        drop(orchestrator.start(job, Framing::Trailer).await.unwrap());

        let phase = tracker.wait(&key, Duration::from_secs(5)).await;
        match phase {
            Some(JobPhase::Settled(record)) => assert_eq!(record.persisted, 1),
            other => panic!("expected settled job, got {other:?}"),
        }
        assert_eq!(store.partitions().len(), 1);
    }
}
