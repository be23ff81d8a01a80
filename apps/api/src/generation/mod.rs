// Content generation pipeline: topic extraction, quiz generation, course generation.
// Every model call goes through the orchestrator and llm_client; nothing here
// persists output that has not passed schema validation.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod document;
pub mod guard;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod schema;
pub mod tracker;
pub mod transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Topics,
    Quiz,
    Course,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Topics => "topics",
            JobKind::Quiz => "quiz",
            JobKind::Course => "course",
        })
    }
}
