//! Test doubles for the provider layer.
//!
//! Used by this crate's unit tests and by downstream crates' scheduler tests;
//! not intended for production wiring.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use genpress_core::ManualClock;

use crate::error::GenerationError;
use crate::provider::TextProvider;

/// Shared call log: provider names in invocation order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Behaviour of a [`RecordingProvider`].
#[derive(Debug, Copy, Clone)]
pub enum ScriptedCall {
    /// Always succeed.
    Succeed,
    /// Always fail with a retryable error.
    Retryable,
    /// Always fail with a fatal error.
    Fatal,
    /// Fail retryably for the first `n` calls, then succeed.
    SucceedAfter(u32),
}

/// Provider stub that records every call it receives.
pub struct RecordingProvider {
    name: String,
    script: ScriptedCall,
    calls: AtomicU32,
    log: CallLog,
}

impl RecordingProvider {
    pub fn new(name: impl Into<String>, script: ScriptedCall, log: CallLog) -> Self {
        Self {
            name: name.into(),
            script,
            calls: AtomicU32::new(0),
            log,
        }
    }

    pub fn shared_log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }
}

impl TextProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, prompt: &str) -> Result<String, GenerationError> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(self.name.clone());

        match self.script {
            ScriptedCall::Succeed => Ok(format!("{}: {}", self.name, prompt)),
            ScriptedCall::Retryable => Err(GenerationError::retryable(&self.name, "rate limited")),
            ScriptedCall::Fatal => Err(GenerationError::fatal(&self.name, "invalid credentials")),
            ScriptedCall::SucceedAfter(failures) => {
                if call_number > failures {
                    Ok(format!("{}: {}", self.name, prompt))
                } else {
                    Err(GenerationError::retryable(&self.name, "overloaded"))
                }
            }
        }
    }
}

/// Manual clock pinned to a fixed instant.
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ))
}
