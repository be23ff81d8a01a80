pub mod course;
pub mod quiz;
pub mod topic;
