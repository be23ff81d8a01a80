//! Schema validation of model output at the trust boundary.
//!
//! Output is decoded leniently (missing fields become empty values) and then
//! checked rule by rule, so one `ValidationError` reports every violation instead
//! of the first serde complaint. Nothing here has side effects: a job only
//! reaches persistence with a value these functions returned.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::generation::JobKind;
use crate::llm_client::strip_json_fences;
use crate::models::quiz::{AnswerChoice, DONT_KNOW};

pub const MIN_TOPICS: usize = 5;
pub const MIN_QUESTION_CHARS: usize = 5;
pub const MIN_DESCRIPTION_CHARS: usize = 5;
pub const MIN_LEARNING_OBJECTIVES: usize = 1;
pub const MIN_RESOURCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} output failed validation: {}", .violations.join("; "))]
pub struct ValidationError {
    pub kind: JobKind,
    pub violations: Vec<String>,
}

impl ValidationError {
    fn new(kind: JobKind, violations: Vec<String>) -> Self {
        Self { kind, violations }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validated shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct QuizItem {
    pub question: String,
    pub topic: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    /// Always [`DONT_KNOW`], whatever the model sent.
    pub option_d: String,
    pub correct_answer: AnswerChoice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDraft {
    pub topic: String,
    pub description: String,
    pub learning_objectives: Vec<String>,
    pub recommended_resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseOutline {
    pub course_title: String,
    pub weak_modules: Vec<ModuleDraft>,
    pub strong_modules: Vec<ModuleDraft>,
}

// ────────────────────────────────────────────────────────────────────────────
// Raw, lenient shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawTopics {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuiz {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawQuestion {
    question: String,
    topic: String,
    option_a: String,
    option_b: String,
    option_c: String,
    correct_answer: String,
}

#[derive(Debug, Deserialize)]
struct RawCourse {
    #[serde(default)]
    course_title: String,
    #[serde(default)]
    weak_modules: Vec<RawModule>,
    #[serde(default)]
    strong_modules: Vec<RawModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModule {
    topic: String,
    description: String,
    learning_objectives: Vec<String>,
    recommended_resources: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Parsers
// ────────────────────────────────────────────────────────────────────────────

/// Topic extraction: at least [`MIN_TOPICS`] non-blank topic strings.
pub fn parse_topics(output: &str) -> Result<Vec<String>, ValidationError> {
    let raw: RawTopics = decode(JobKind::Topics, output)?;
    let mut violations = Vec::new();

    let topics: Vec<String> = raw.topics.iter().map(|t| t.trim().to_string()).collect();
    for (i, topic) in topics.iter().enumerate() {
        if topic.is_empty() {
            violations.push(format!("topics[{i}] is empty"));
        }
    }
    if topics.len() < MIN_TOPICS {
        violations.push(format!(
            "expected at least {MIN_TOPICS} topics, got {}",
            topics.len()
        ));
    }

    if violations.is_empty() {
        Ok(topics)
    } else {
        Err(ValidationError::new(JobKind::Topics, violations))
    }
}

/// Quiz generation: every item complete, correct answer in a..c.
pub fn parse_quiz(output: &str) -> Result<Vec<QuizItem>, ValidationError> {
    let raw: RawQuiz = decode(JobKind::Quiz, output)?;
    let mut violations = Vec::new();
    let mut items = Vec::with_capacity(raw.questions.len());

    if raw.questions.is_empty() {
        violations.push("expected at least 1 question".to_string());
    }

    for (i, q) in raw.questions.into_iter().enumerate() {
        let at = format!("questions[{i}]");
        let question = q.question.trim().to_string();
        if question.chars().count() < MIN_QUESTION_CHARS {
            violations.push(format!(
                "{at}.question must be at least {MIN_QUESTION_CHARS} characters"
            ));
        }
        let topic = q.topic.trim().to_string();
        if topic.is_empty() {
            violations.push(format!("{at}.topic is empty"));
        }
        for (name, value) in [
            ("option_a", &q.option_a),
            ("option_b", &q.option_b),
            ("option_c", &q.option_c),
        ] {
            if value.trim().is_empty() {
                violations.push(format!("{at}.{name} is empty"));
            }
        }

        let correct_answer = match AnswerChoice::parse(&q.correct_answer) {
            Some(choice) if choice.is_sentinel() => {
                violations.push(format!(
                    "{at}.correct_answer is 'd', the \"{DONT_KNOW}\" option"
                ));
                None
            }
            Some(choice) => Some(choice),
            None => {
                violations.push(format!(
                    "{at}.correct_answer '{}' is not one of a, b, c",
                    q.correct_answer
                ));
                None
            }
        };

        if let Some(correct_answer) = correct_answer {
            items.push(QuizItem {
                question,
                topic,
                option_a: q.option_a.trim().to_string(),
                option_b: q.option_b.trim().to_string(),
                option_c: q.option_c.trim().to_string(),
                option_d: DONT_KNOW.to_string(),
                correct_answer,
            });
        }
    }

    if violations.is_empty() {
        Ok(items)
    } else {
        Err(ValidationError::new(JobKind::Quiz, violations))
    }
}

/// Course generation: a title and complete modules in both lists.
pub fn parse_course(output: &str) -> Result<CourseOutline, ValidationError> {
    let raw: RawCourse = decode(JobKind::Course, output)?;
    let mut violations = Vec::new();

    let course_title = raw.course_title.trim().to_string();
    if course_title.is_empty() {
        violations.push("course_title is empty".to_string());
    }

    let weak_modules = check_modules("weak_modules", raw.weak_modules, &mut violations);
    let strong_modules = check_modules("strong_modules", raw.strong_modules, &mut violations);

    if violations.is_empty() {
        Ok(CourseOutline {
            course_title,
            weak_modules,
            strong_modules,
        })
    } else {
        Err(ValidationError::new(JobKind::Course, violations))
    }
}

fn check_modules(
    list: &str,
    modules: Vec<RawModule>,
    violations: &mut Vec<String>,
) -> Vec<ModuleDraft> {
    modules
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let at = format!("{list}[{i}]");
            let draft = ModuleDraft {
                topic: m.topic.trim().to_string(),
                description: m.description.trim().to_string(),
                learning_objectives: non_blank(m.learning_objectives),
                recommended_resources: non_blank(m.recommended_resources),
            };
            if draft.topic.is_empty() {
                violations.push(format!("{at}.topic is empty"));
            }
            if draft.description.chars().count() < MIN_DESCRIPTION_CHARS {
                violations.push(format!(
                    "{at}.description must be at least {MIN_DESCRIPTION_CHARS} characters"
                ));
            }
            if draft.learning_objectives.len() < MIN_LEARNING_OBJECTIVES {
                violations.push(format!(
                    "{at}.learning_objectives needs at least {MIN_LEARNING_OBJECTIVES} entry"
                ));
            }
            if draft.recommended_resources.len() < MIN_RESOURCES {
                violations.push(format!(
                    "{at}.recommended_resources needs at least {MIN_RESOURCES} entries, got {}",
                    draft.recommended_resources.len()
                ));
            }
            draft
        })
        .collect()
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decodes model output as JSON, tolerating code fences and surrounding prose.
fn decode<T: DeserializeOwned>(kind: JobKind, output: &str) -> Result<T, ValidationError> {
    let body = strip_json_fences(output);
    let first_error = match serde_json::from_str::<T>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&body[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ValidationError::new(
        kind,
        vec![format!("output is not a valid JSON object: {first_error}")],
    ))
}
