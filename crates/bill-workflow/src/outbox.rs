//! Reconciliation Outbox
//!
//! A failed secondary write leaves the GST projection stale. The sync is
//! queued here as a task and retried on the next drain; a task that
//! exhausts its attempts is parked rather than dropped, so a stale
//! projection always stays visible somewhere.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use bill_ledger::ReviewStatus;
use bill_store::{PersistenceApi, PersistenceError};

use crate::reconcile::reconcile;

/// Retry attempts before a task is parked.
const MAX_ATTEMPTS: u32 = 3;

/// One pending secondary sync.
#[derive(Debug, Clone)]
pub struct ReconcileTask {
    pub task_id: Uuid,
    pub authorization_ref: String,
    pub status: ReviewStatus,
    pub remark_blob: String,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Summary of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    pub requeued: usize,
    pub parked: usize,
}

/// Queue of secondary syncs still owed to the GST projection.
#[derive(Default)]
pub struct ReconcileOutbox {
    pending: Mutex<VecDeque<ReconcileTask>>,
    parked: Mutex<Vec<ReconcileTask>>,
}

impl ReconcileOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a sync that could not be applied, returning its task id.
    pub async fn enqueue(
        &self,
        authorization_ref: impl Into<String>,
        status: ReviewStatus,
        remark_blob: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Uuid {
        let task = ReconcileTask {
            task_id: Uuid::new_v4(),
            authorization_ref: authorization_ref.into(),
            status,
            remark_blob: remark_blob.into(),
            queued_at: now,
            attempts: 0,
        };
        let task_id = task.task_id;
        info!(
            %task_id,
            reference = %task.authorization_ref,
            "queued GST projection sync for retry"
        );
        self.pending.lock().await.push_back(task);
        task_id
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Snapshot of tasks that exhausted their attempts.
    pub async fn parked_tasks(&self) -> Vec<ReconcileTask> {
        self.parked.lock().await.clone()
    }

    /// Retry every queued sync against a fresh projection snapshot.
    ///
    /// A task that fails again goes back to the queue with its attempt
    /// count bumped, or is parked once it hits the cap. A snapshot fetch
    /// failure requeues the whole batch untouched and surfaces the error.
    pub async fn drain(
        &self,
        store: &dyn PersistenceApi,
        now: DateTime<Utc>,
    ) -> Result<DrainReport, PersistenceError> {
        let batch: Vec<ReconcileTask> = {
            let mut pending = self.pending.lock().await;
            pending.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(DrainReport::default());
        }

        let snapshot = match store.fetch_gst_invoices().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let mut pending = self.pending.lock().await;
                for task in batch {
                    pending.push_back(task);
                }
                return Err(err);
            }
        };

        let mut report = DrainReport::default();
        for mut task in batch {
            let outcome = match reconcile(
                &task.authorization_ref,
                task.status,
                &task.remark_blob,
                &snapshot,
                now,
            ) {
                Ok(updated) => store.update_gst_invoice(&updated).await.err().map(|e| e.to_string()),
                Err(err) => Some(err.to_string()),
            };

            match outcome {
                None => {
                    info!(task_id = %task.task_id, "GST projection sync applied");
                    report.synced += 1;
                }
                Some(error) => {
                    task.attempts += 1;
                    if task.attempts >= MAX_ATTEMPTS {
                        warn!(
                            task_id = %task.task_id,
                            attempts = task.attempts,
                            error = %error,
                            "parking GST projection sync after repeated failure"
                        );
                        report.parked += 1;
                        self.parked.lock().await.push(task);
                    } else {
                        warn!(
                            task_id = %task.task_id,
                            attempts = task.attempts,
                            error = %error,
                            "GST projection sync failed; requeueing"
                        );
                        report.requeued += 1;
                        self.pending.lock().await.push_back(task);
                    }
                }
            }
        }

        Ok(report)
    }
}
