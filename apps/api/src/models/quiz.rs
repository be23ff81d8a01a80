use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fixed text of option d. It is never the correct answer.
pub const DONT_KNOW: &str = "I don't know";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizQuestionRow {
    pub id: Uuid,
    pub collection_id: i64,
    pub partition_index: i32,
    pub topic: String,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    /// One of `a`, `b`, `c`.
    pub correct_answer: String,
    /// Empty until the learner submits, then one of `a`..`d`.
    pub user_answer: String,
    pub created_at: DateTime<Utc>,
}

impl QuizQuestionRow {
    pub fn is_answered(&self) -> bool {
        !self.user_answer.trim().is_empty()
    }

    pub fn is_correct(&self) -> bool {
        self.is_answered() && self.user_answer == self.correct_answer
    }
}

#[derive(Debug, Clone)]
pub struct NewQuizQuestion {
    pub collection_id: i64,
    pub partition_index: i32,
    pub topic: String,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: AnswerChoice,
}

/// A learner-selectable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerChoice {
    A,
    B,
    C,
    D,
}

impl AnswerChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerChoice::A => "a",
            AnswerChoice::B => "b",
            AnswerChoice::C => "c",
            AnswerChoice::D => "d",
        }
    }

    /// Lenient parse used for model output and request bodies (`" B "` → `B`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" => Some(AnswerChoice::A),
            "b" => Some(AnswerChoice::B),
            "c" => Some(AnswerChoice::C),
            "d" => Some(AnswerChoice::D),
            _ => None,
        }
    }

    /// Option d is the "I don't know" sentinel and can never be a correct answer.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, AnswerChoice::D)
    }
}
