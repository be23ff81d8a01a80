// Shared prompt fragments.
// Each job defines its own prompts in generation/prompts.rs; this file holds the
// cross-cutting pieces every job appends.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";
