//! Provider error taxonomy.
//!
//! Every provider adapter returns a tagged [`GenerationError`] variant; the
//! fallback and backoff layers branch on the variant, never on message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a single provider attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptClass {
    /// The attempt succeeded.
    Ok,
    /// Transient failure (rate limit, overload, temporary outage).
    Retryable,
    /// Permanent failure (bad credentials, malformed request, policy rejection).
    Fatal,
}

/// Error raised by the generation layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Transient provider failure; the caller may try another provider or
    /// retry later.
    #[error("provider {provider} temporarily unavailable: {message}")]
    Retryable { provider: String, message: String },

    /// Permanent provider failure; retrying cannot help.
    #[error("provider {provider} rejected the request: {message}")]
    Fatal { provider: String, message: String },

    /// Every configured provider failed transiently in one sweep.
    #[error("all {providers} providers busy after {attempts} attempts")]
    AllProvidersBusy { providers: usize, attempts: usize },
}

impl GenerationError {
    pub fn retryable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retryable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Attempt classification of this error.
    pub fn class(&self) -> AttemptClass {
        match self {
            GenerationError::Retryable { .. } | GenerationError::AllProvidersBusy { .. } => {
                AttemptClass::Retryable
            }
            GenerationError::Fatal { .. } => AttemptClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == AttemptClass::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_variant() {
        assert_eq!(
            GenerationError::retryable("a", "429").class(),
            AttemptClass::Retryable
        );
        assert_eq!(
            GenerationError::fatal("a", "bad key").class(),
            AttemptClass::Fatal
        );
        assert!(
            GenerationError::AllProvidersBusy {
                providers: 2,
                attempts: 2
            }
            .is_retryable()
        );
    }
}
