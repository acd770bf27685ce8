//! Ordered multi-provider fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use genpress_core::Clock;

use crate::error::{AttemptClass, GenerationError};
use crate::provider::{Generation, GenerationAttempt, TextProvider};

const DEFAULT_INTER_PROVIDER_DELAY: Duration = Duration::from_secs(2);

/// Tries an ordered list of providers for one prompt.
///
/// Order encodes preference (cost, quality); it is never shuffled. A
/// retryable failure moves on to the next provider after a short fixed delay;
/// a fatal failure aborts the whole call immediately.
pub struct FallbackClient {
    providers: Vec<Box<dyn TextProvider>>,
    clock: Arc<dyn Clock>,
    inter_provider_delay: Duration,
}

impl FallbackClient {
    pub fn new(providers: Vec<Box<dyn TextProvider>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            providers,
            clock,
            inter_provider_delay: DEFAULT_INTER_PROVIDER_DELAY,
        }
    }

    /// Override the pause inserted between providers after a retryable failure.
    pub fn with_inter_provider_delay(mut self, delay: Duration) -> Self {
        self.inter_provider_delay = delay;
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Run one full sweep through the provider list.
    ///
    /// Returns the first success, the first fatal error, or
    /// [`GenerationError::AllProvidersBusy`] when every provider failed
    /// transiently.
    pub fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let mut attempts: Vec<GenerationAttempt> = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            let started = self.clock.now();
            let outcome = provider.call(prompt);
            let latency = (self.clock.now() - started).to_std().unwrap_or_default();

            match outcome {
                Ok(text) => {
                    attempts.push(GenerationAttempt {
                        provider: provider.name().to_string(),
                        class: AttemptClass::Ok,
                        latency,
                    });
                    debug!(
                        provider = provider.name(),
                        attempt = attempts.len(),
                        latency_ms = latency.as_millis() as u64,
                        "generation succeeded"
                    );
                    return Ok(Generation {
                        text,
                        provider: provider.name().to_string(),
                        attempts,
                    });
                }
                Err(err) if err.is_retryable() => {
                    attempts.push(GenerationAttempt {
                        provider: provider.name().to_string(),
                        class: AttemptClass::Retryable,
                        latency,
                    });
                    warn!(
                        provider = provider.name(),
                        error = %err,
                        "provider busy, falling through"
                    );
                    // Brief pause so a shared upstream is not hammered back-to-back.
                    if index + 1 < self.providers.len() && !self.inter_provider_delay.is_zero() {
                        self.clock.sleep(self.inter_provider_delay);
                    }
                }
                Err(err) => {
                    attempts.push(GenerationAttempt {
                        provider: provider.name().to_string(),
                        class: AttemptClass::Fatal,
                        latency,
                    });
                    warn!(
                        provider = provider.name(),
                        error = %err,
                        "fatal provider error, aborting sweep"
                    );
                    return Err(err);
                }
            }
        }

        Err(GenerationError::AllProvidersBusy {
            providers: self.providers.len(),
            attempts: attempts.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingProvider, ScriptedCall, test_clock};

    #[test]
    fn returns_first_success_in_order() {
        let log = RecordingProvider::shared_log();
        let providers: Vec<Box<dyn TextProvider>> = vec![
            Box::new(RecordingProvider::new("alpha", ScriptedCall::Retryable, log.clone())),
            Box::new(RecordingProvider::new("beta", ScriptedCall::Retryable, log.clone())),
            Box::new(RecordingProvider::new("gamma", ScriptedCall::Succeed, log.clone())),
        ];
        let client = FallbackClient::new(providers, test_clock())
            .with_inter_provider_delay(Duration::from_millis(10));

        let generation = client.generate("a prompt").unwrap();

        assert_eq!(generation.provider, "gamma");
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["alpha", "beta", "gamma"]
        );
        assert_eq!(generation.attempts.len(), 3);
        assert_eq!(generation.attempts[2].class, AttemptClass::Ok);
    }

    #[test]
    fn fatal_error_short_circuits() {
        let log = RecordingProvider::shared_log();
        let providers: Vec<Box<dyn TextProvider>> = vec![
            Box::new(RecordingProvider::new("alpha", ScriptedCall::Fatal, log.clone())),
            Box::new(RecordingProvider::new("beta", ScriptedCall::Succeed, log.clone())),
        ];
        let client = FallbackClient::new(providers, test_clock());

        let err = client.generate("a prompt").unwrap_err();

        assert!(matches!(err, GenerationError::Fatal { .. }));
        assert_eq!(log.lock().unwrap().as_slice(), ["alpha"]);
    }

    #[test]
    fn all_retryable_raises_busy() {
        let log = RecordingProvider::shared_log();
        let providers: Vec<Box<dyn TextProvider>> = vec![
            Box::new(RecordingProvider::new("alpha", ScriptedCall::Retryable, log.clone())),
            Box::new(RecordingProvider::new("beta", ScriptedCall::Retryable, log.clone())),
        ];
        let client = FallbackClient::new(providers, test_clock());

        let err = client.generate("a prompt").unwrap_err();

        assert!(matches!(
            err,
            GenerationError::AllProvidersBusy {
                providers: 2,
                attempts: 2
            }
        ));
    }

    #[test]
    fn pauses_between_providers_but_not_after_last() {
        let clock = test_clock();
        let log = RecordingProvider::shared_log();
        let providers: Vec<Box<dyn TextProvider>> = vec![
            Box::new(RecordingProvider::new("alpha", ScriptedCall::Retryable, log.clone())),
            Box::new(RecordingProvider::new("beta", ScriptedCall::Retryable, log.clone())),
            Box::new(RecordingProvider::new("gamma", ScriptedCall::Retryable, log.clone())),
        ];
        let client = FallbackClient::new(providers, clock.clone())
            .with_inter_provider_delay(Duration::from_secs(2));

        let _ = client.generate("a prompt");

        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(2)]
        );
    }

    #[test]
    fn empty_provider_list_is_busy() {
        let client = FallbackClient::new(Vec::new(), test_clock());
        let err = client.generate("a prompt").unwrap_err();
        assert!(matches!(
            err,
            GenerationError::AllProvidersBusy {
                providers: 0,
                attempts: 0
            }
        ));
    }
}
