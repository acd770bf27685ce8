//! Batch settlement detection and one-time notification.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use genpress_core::BatchId;

use crate::store::{JobStore, StoreError};

/// What a settled batch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub completed_count: usize,
    pub failed_count: usize,
    /// `result_ref`s of the completed jobs, in schedule order.
    pub results: Vec<String>,
}

/// Notification delivery error.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Downstream collaborator told once per settled batch.
///
/// Fire-and-forget from the detector's perspective: a delivery failure is
/// logged for audit and never re-driven.
pub trait NotificationSink: Send + Sync {
    fn batch_settled(&self, batch_id: BatchId, outcome: &BatchOutcome) -> Result<(), SinkError>;
}

/// Detects batches with no job left open and fires their one-time
/// notification.
pub struct SettlementDetector {
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn NotificationSink>,
}

impl SettlementDetector {
    pub fn new(jobs: Arc<dyn JobStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { jobs, sink }
    }

    /// Check every unnotified batch; returns the batches notified this pass.
    pub fn check_settled_batches(&self) -> Result<Vec<BatchId>, StoreError> {
        let mut notified = Vec::new();

        for summary in self.jobs.unnotified_batches()? {
            if !summary.is_settled() {
                continue;
            }

            let outcome = BatchOutcome {
                completed_count: summary.completed,
                failed_count: summary.failed,
                results: summary.results,
            };
            info!(
                batch_id = %summary.batch_id,
                completed = outcome.completed_count,
                failed = outcome.failed_count,
                "batch settled"
            );

            if let Err(err) = self.sink.batch_settled(summary.batch_id, &outcome) {
                warn!(
                    batch_id = %summary.batch_id,
                    error = %err,
                    "settlement notification failed; delivery will not be retried"
                );
            }
            // The batch is marked notified whatever the delivery outcome.
            self.jobs.mark_batch_notified(summary.batch_id)?;
            notified.push(summary.batch_id);
        }

        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;
    use crate::store::InMemoryJobStore;
    use crate::testing::CollectingSink;
    use chrono::{TimeZone, Utc};
    use genpress_core::SeedId;

    fn seeded_batch(store: &InMemoryJobStore, jobs: usize) -> (BatchId, Vec<genpress_core::JobId>) {
        let batch = BatchId::new();
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let ids = (0..jobs)
            .map(|i| {
                store
                    .create(JobSpec::new(
                        batch,
                        SeedId::new(),
                        format!("topic {i}"),
                        base + chrono::Duration::minutes(10 * i as i64),
                    ))
                    .unwrap()
                    .id
            })
            .collect();
        (batch, ids)
    }

    fn drain(store: &InMemoryJobStore) {
        let far = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        store.claim_due(far, usize::MAX).unwrap();
    }

    #[test]
    fn mixed_outcome_batch_settles_once() {
        let store = Arc::new(InMemoryJobStore::new());
        let sink = Arc::new(CollectingSink::new());
        let (batch, ids) = seeded_batch(&store, 3);
        drain(&store);
        store.complete(ids[0], "ref-0").unwrap();
        store.complete(ids[1], "ref-1").unwrap();
        store.fail(ids[2], "boom").unwrap();

        let detector = SettlementDetector::new(store.clone(), sink.clone());

        assert_eq!(detector.check_settled_batches().unwrap(), vec![batch]);
        // Idempotent: a second pass finds nothing left to notify.
        assert!(detector.check_settled_batches().unwrap().is_empty());

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        let (notified_batch, outcome) = &calls[0];
        assert_eq!(*notified_batch, batch);
        assert_eq!(outcome.completed_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.results, ["ref-0", "ref-1"]);
    }

    #[test]
    fn open_jobs_block_settlement() {
        let store = Arc::new(InMemoryJobStore::new());
        let sink = Arc::new(CollectingSink::new());
        let (_, ids) = seeded_batch(&store, 2);
        drain(&store);
        store.complete(ids[0], "ref-0").unwrap();
        // ids[1] is still in progress.

        let detector = SettlementDetector::new(store, sink.clone());

        assert!(detector.check_settled_batches().unwrap().is_empty());
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn delivery_failure_still_marks_notified() {
        let store = Arc::new(InMemoryJobStore::new());
        let sink = Arc::new(CollectingSink::failing());
        let (batch, ids) = seeded_batch(&store, 1);
        drain(&store);
        store.complete(ids[0], "ref-0").unwrap();

        let detector = SettlementDetector::new(store.clone(), sink.clone());

        assert_eq!(detector.check_settled_batches().unwrap(), vec![batch]);
        assert_eq!(sink.calls().len(), 1);

        // No re-notification storm after a failed delivery.
        assert!(detector.check_settled_batches().unwrap().is_empty());
        assert_eq!(sink.calls().len(), 1);
    }
}
