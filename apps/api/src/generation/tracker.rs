//! In-process completion signals for generation jobs.
//!
//! Status endpoints wait on a `watch` channel instead of sleeping and re-reading
//! the store. The tracker is never the source of truth: a key it does not know
//! (the job ran in another process, or before a restart) falls back to store
//! polling in the handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::transport::CompletionRecord;
use super::JobKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub kind: JobKind,
    pub collection_id: i64,
    pub partition_index: Option<i32>,
}

impl JobKey {
    pub fn new(kind: JobKind, collection_id: i64, partition_index: Option<i32>) -> Self {
        Self {
            kind,
            collection_id,
            partition_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Running,
    Settled(CompletionRecord),
    Aborted(String),
}

impl JobPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, JobPhase::Running)
    }
}

// TODO: evict settled entries once their collection has been read back, the map
// currently grows by one small entry per job for the life of the process.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashMap<JobKey, watch::Receiver<JobPhase>>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running job. A re-issued job replaces the previous signal.
    pub fn begin(&self, key: JobKey) -> JobHandle {
        let (tx, rx) = watch::channel(JobPhase::Running);
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, rx);
        JobHandle { tx }
    }

    /// Current phase, or `None` for a job this process never ran.
    pub fn phase(&self, key: &JobKey) -> Option<JobPhase> {
        self.receiver(key).map(|rx| rx.borrow().clone())
    }

    /// Resolves as soon as the job leaves `Running`, or with `Running` once
    /// `timeout` elapses. `None` when the key is unknown.
    pub async fn wait(&self, key: &JobKey, timeout: Duration) -> Option<JobPhase> {
        let mut rx = self.receiver(key)?;
        let outcome = tokio::time::timeout(timeout, async {
            rx.wait_for(|phase| !phase.is_running())
                .await
                .map(|phase| phase.clone())
        })
        .await;

        Some(match outcome {
            Ok(Ok(phase)) => phase,
            // handle dropped without settling, i.e. the job task died
            Ok(Err(_)) => JobPhase::Aborted("job ended without settling".to_string()),
            Err(_) => JobPhase::Running,
        })
    }

    fn receiver(&self, key: &JobKey) -> Option<watch::Receiver<JobPhase>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Held by the job task; consumed when the job settles or aborts.
pub struct JobHandle {
    tx: watch::Sender<JobPhase>,
}

impl JobHandle {
    pub fn settle(self, record: CompletionRecord) {
        self.tx.send_replace(JobPhase::Settled(record));
    }

    pub fn abort(self, reason: impl Into<String>) {
        self.tx.send_replace(JobPhase::Aborted(reason.into()));
    }
}
