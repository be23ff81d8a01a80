// Learner performance: topic classification and partition progress.
// Pure over store snapshots; nothing here writes.

pub mod analyzer;
pub mod handlers;
pub mod progress;
