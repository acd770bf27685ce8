//! Provider abstraction and per-call attempt records.

use std::time::Duration;

use crate::error::{AttemptClass, GenerationError};

/// One text-generation provider (an API adapter).
///
/// Adapters own their transport details (HTTP client, per-call timeout) and
/// must map every failure onto a tagged [`GenerationError`] variant.
pub trait TextProvider: Send + Sync {
    /// Stable name used for preference ordering, logging, and attribution.
    fn name(&self) -> &str;

    /// Run one generation call.
    fn call(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// In-memory record of one provider call.
///
/// Lives only for the duration of one backoff cycle; collected so the caller
/// can log the full sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub provider: String,
    pub class: AttemptClass,
    pub latency: Duration,
}

/// Successful generation with its winning provider attached.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// Name of the provider that produced the result.
    pub provider: String,
    /// All attempts made to obtain it, in call order.
    pub attempts: Vec<GenerationAttempt>,
}
