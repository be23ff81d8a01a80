// All LLM prompt templates for the generation jobs.
// Reuses the JSON-only fragment from llm_client::prompts.

/// System prompt for topic extraction. `{age}` is the learner's age.
pub const TOPIC_SYSTEM_TEMPLATE: &str = r#"You are an assistant inside an adaptive learning platform.

The learner is approximately {age} years old. Tailor topic complexity to this age group.

Task: systematically extract every Unit of the document and its major subtopics.
- Identify every Unit heading (e.g. "Unit 1: Number Systems") and create no more than 2-3 topics from the subtopics inside it.
- Do not skip any Unit, even one far down the document.
- Each topic must reflect a meaningful concept from the document. Avoid duplication.
- Avoid overly technical language for younger learners.

Format each topic exactly as:
"[Subtopic Name] (course-name-is) [Course Name]"
where Course Name is the logical academic course (e.g. Mathematics).

Return exactly this JSON shape:
{"topics": ["Formatted Topic 1", "Formatted Topic 2", "..."]}
Return at least 5 topics.

{json_only}"#;

pub const TOPIC_PROMPT_TEMPLATE: &str = r#"Extract as many suitable educational topics as possible from this document.

DOCUMENT:
---
{document}
---"#;

pub const QUIZ_SYSTEM: &str = r#"You are a quiz generator for an adaptive learning system.
For each topic provided, generate exactly ONE multiple-choice question.

Each question has options a, b and c. Option d is always "I don't know" and is added by the platform.
The correct answer must be "a", "b" or "c". Never mark d as correct.
Copy each topic string into the "topic" field exactly as given, including its course marker.

Return exactly this JSON shape:
{"questions": [{"question": "...", "topic": "...", "option_a": "...", "option_b": "...", "option_c": "...", "correct_answer": "a"}]}
"#;

pub const QUIZ_PROMPT_TEMPLATE: &str =
    "Generate one multiple-choice question per topic from the following list:\n{topics}";

/// System prompt for course generation. `{domain}` is the course domain.
pub const COURSE_SYSTEM_TEMPLATE: &str = r#"You are an expert educational course generator.

Objective: create a personalized learning course in the domain of "{domain}" from the learner's WEAK and STRONG topics, aligned as much as possible with the learner's INTERESTS.

WEAK topics:
- A detailed description (3-5 lines).
- 3-5 learning objectives, at least one of them a real-world problem, tied to the learner's interests where possible.
- 3-5 recommended resources: the FIRST must be a video link, the SECOND a book (name and author); others may be articles, podcasts or tools.

STRONG topics:
- A brief description (1-2 lines).
- 1-2 learning objectives.
- The same resource rules (video first, book second, at least 3 resources).

Constraints:
- Reflect the course domain ("{domain}") in descriptions and resources.
- If no matching video or book exists, create a realistic placeholder.
- Produce a module only for the topics listed. Leave a module list empty when its topic list is "None".

Return exactly this JSON shape:
{"course_title": "...", "weak_modules": [MODULE], "strong_modules": [MODULE]}
where MODULE is {"topic": "...", "description": "...", "learning_objectives": ["..."], "recommended_resources": ["..."]}

{json_only}"#;

pub const COURSE_PROMPT_TEMPLATE: &str = "Weak Topics: {weak}\nStrong Topics: {strong}\nUser Interests: {interests}";

/// Joins a list for a prompt, or `None` when empty.
pub fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}
