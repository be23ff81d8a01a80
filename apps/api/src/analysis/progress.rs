//! Per-partition progress badges and the overall-completion gate.

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionStatus {
    pub partition_index: i32,
    /// At least one quiz question exists.
    pub generated: bool,
    /// At least one question has a recorded answer.
    pub taken: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub collection_id: i64,
    pub last_partition: i32,
    pub partitions: Vec<PartitionStatus>,
    pub overall_completed: bool,
}

/// Queries partitions `1..=last_partition` concurrently. A partition whose query
/// fails reads as neither generated nor taken.
pub async fn partition_statuses(
    store: &dyn Store,
    collection_id: i64,
    last_partition: i32,
) -> Vec<PartitionStatus> {
    let checks = (1..=last_partition).map(|partition_index| async move {
        match store
            .list_quiz_questions(collection_id, Some(partition_index))
            .await
        {
            Ok(questions) => PartitionStatus {
                partition_index,
                generated: !questions.is_empty(),
                taken: questions.iter().any(|q| q.is_answered()),
            },
            Err(e) => {
                warn!(
                    collection_id,
                    partition_index, "Progress check failed, reporting partition as not taken: {e}"
                );
                PartitionStatus {
                    partition_index,
                    generated: false,
                    taken: false,
                }
            }
        }
    });
    join_all(checks).await
}

/// True only for a non-empty range in which every partition was taken.
pub fn overall_completed(statuses: &[PartitionStatus]) -> bool {
    !statuses.is_empty() && statuses.iter().all(|s| s.taken)
}

pub async fn check_progress(
    store: &dyn Store,
    collection_id: i64,
    last_partition: i32,
) -> ProgressReport {
    let partitions = partition_statuses(store, collection_id, last_partition).await;
    ProgressReport {
        collection_id,
        last_partition,
        overall_completed: overall_completed(&partitions),
        partitions,
    }
}
