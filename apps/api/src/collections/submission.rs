// Answer submission rules.
// A partition's quiz locks as soon as any of its questions has an answer, and a
// single question's answer is write-once (enforced again by the store).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::quiz::{AnswerChoice, QuizQuestionRow};

pub fn is_locked(questions: &[QuizQuestionRow]) -> bool {
    questions.iter().any(|q| q.is_answered())
}

/// Checks a batch submission against the partition's current questions and
/// returns the answers to record. Questions left out stay unanswered.
pub fn validate_batch(
    questions: &[QuizQuestionRow],
    answers: &HashMap<Uuid, String>,
) -> Result<Vec<(Uuid, AnswerChoice)>, AppError> {
    if is_locked(questions) {
        return Err(AppError::Conflict(
            "This quiz has already been submitted".to_string(),
        ));
    }
    if answers.is_empty() {
        return Err(AppError::Validation("answers cannot be empty".to_string()));
    }

    let known: HashSet<Uuid> = questions.iter().map(|q| q.id).collect();
    let mut accepted = Vec::with_capacity(answers.len());
    for (id, raw) in answers {
        if !known.contains(id) {
            return Err(AppError::Validation(format!(
                "question {id} does not belong to this quiz"
            )));
        }
        let choice = parse_choice(raw)?;
        accepted.push((*id, choice));
    }
    accepted.sort_by_key(|(id, _)| *id);
    Ok(accepted)
}

pub fn parse_choice(raw: &str) -> Result<AnswerChoice, AppError> {
    AnswerChoice::parse(raw).ok_or_else(|| {
        AppError::Validation(format!("answer must be one of a, b, c, d; got '{raw}'"))
    })
}
