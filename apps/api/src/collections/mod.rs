// Collection reads and answer recording.

pub mod handlers;
pub mod submission;
