// Idempotency guard for course generation.
// The orchestrator queries a fresh snapshot right before persisting; this module
// only decides. A failed snapshot read is handled by the caller (fail closed).

use crate::models::course::CourseModuleRow;

/// True when course modules already exist for the collection, so the job must
/// finish without writing.
pub fn should_skip(existing: &[CourseModuleRow]) -> bool {
    !existing.is_empty()
}
