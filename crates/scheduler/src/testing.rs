//! Test doubles for the scheduler layer.

use std::sync::Mutex;

use genpress_core::BatchId;

use crate::settlement::{BatchOutcome, NotificationSink, SinkError};

/// Notification sink that records every call; optionally fails delivery.
#[derive(Debug, Default)]
pub struct CollectingSink {
    calls: Mutex<Vec<(BatchId, BatchOutcome)>>,
    fail_delivery: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose deliveries always fail (the calls are still recorded).
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_delivery: true,
        }
    }

    pub fn calls(&self) -> Vec<(BatchId, BatchOutcome)> {
        self.calls.lock().unwrap().clone()
    }
}

impl NotificationSink for CollectingSink {
    fn batch_settled(&self, batch_id: BatchId, outcome: &BatchOutcome) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push((batch_id, outcome.clone()));
        if self.fail_delivery {
            Err(SinkError::Delivery("sink offline".to_string()))
        } else {
            Ok(())
        }
    }
}
