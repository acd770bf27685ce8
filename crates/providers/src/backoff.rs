//! Whole-sweep retry with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use genpress_core::Clock;

use crate::error::GenerationError;
use crate::fallback::FallbackClient;
use crate::provider::Generation;

/// Backoff policy for repeated provider sweeps.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of full provider sweeps.
    pub max_cycles: u32,
    /// Exponent base for the delay growth.
    pub base: u32,
    /// Delay unit; the delay after cycle `i` is `unit * base^i`.
    pub unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        // 5s, 15s, 45s across three cycles.
        Self {
            max_cycles: 3,
            base: 3,
            unit: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay applied after the given 0-indexed cycle.
    pub fn delay_for_cycle(&self, cycle: u32) -> Duration {
        self.unit.saturating_mul(self.base.saturating_pow(cycle))
    }
}

/// Wraps [`FallbackClient`] with a whole-cycle retry policy.
///
/// Only [`GenerationError::AllProvidersBusy`] triggers another cycle; fatal
/// errors propagate untouched. This layer retries *within* one job
/// execution; the coarser job-level retry across ticks lives in the
/// scheduler crate.
pub struct BackoffOrchestrator {
    client: FallbackClient,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
}

impl BackoffOrchestrator {
    pub fn new(client: FallbackClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn generate_with_backoff(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let cycles = self.policy.max_cycles.max(1);
        let mut last_busy = GenerationError::AllProvidersBusy {
            providers: self.client.provider_count(),
            attempts: 0,
        };

        for cycle in 0..cycles {
            match self.client.generate(prompt) {
                Ok(generation) => return Ok(generation),
                Err(err @ GenerationError::AllProvidersBusy { .. }) => {
                    let delay = self.policy.delay_for_cycle(cycle);
                    warn!(
                        cycle = cycle + 1,
                        max_cycles = cycles,
                        delay_secs = delay.as_secs(),
                        "all providers busy, backing off"
                    );
                    self.clock.sleep(delay);
                    last_busy = err;
                }
                Err(fatal) => return Err(fatal),
            }
        }

        Err(last_busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TextProvider;
    use crate::testing::{RecordingProvider, ScriptedCall, test_clock};

    fn client_of(
        scripts: Vec<(&str, ScriptedCall)>,
        log: crate::testing::CallLog,
        clock: Arc<genpress_core::ManualClock>,
    ) -> FallbackClient {
        let providers: Vec<Box<dyn TextProvider>> = scripts
            .into_iter()
            .map(|(name, script)| {
                Box::new(RecordingProvider::new(name, script, log.clone())) as Box<dyn TextProvider>
            })
            .collect();
        FallbackClient::new(providers, clock).with_inter_provider_delay(Duration::ZERO)
    }

    #[test]
    fn exhausts_cycles_with_exponential_delays() {
        let clock = test_clock();
        let log = RecordingProvider::shared_log();
        let client = client_of(
            vec![("alpha", ScriptedCall::Retryable), ("beta", ScriptedCall::Retryable)],
            log.clone(),
            clock.clone(),
        );
        let orchestrator = BackoffOrchestrator::new(client, clock.clone());

        let err = orchestrator.generate_with_backoff("a prompt").unwrap_err();

        assert!(matches!(err, GenerationError::AllProvidersBusy { .. }));
        // Three full sweeps over two providers.
        assert_eq!(log.lock().unwrap().len(), 6);
        assert_eq!(
            clock.recorded_sleeps(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45),
            ]
        );
    }

    #[test]
    fn fatal_error_is_never_retried() {
        let clock = test_clock();
        let log = RecordingProvider::shared_log();
        let client = client_of(vec![("alpha", ScriptedCall::Fatal)], log.clone(), clock.clone());
        let orchestrator = BackoffOrchestrator::new(client, clock.clone());

        let err = orchestrator.generate_with_backoff("a prompt").unwrap_err();

        assert!(matches!(err, GenerationError::Fatal { .. }));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[test]
    fn recovers_on_a_later_cycle() {
        let clock = test_clock();
        let log = RecordingProvider::shared_log();
        // Busy on the first sweep, succeeds on the second.
        let client = client_of(
            vec![("alpha", ScriptedCall::SucceedAfter(1))],
            log.clone(),
            clock.clone(),
        );
        let orchestrator = BackoffOrchestrator::new(client, clock.clone());

        let generation = orchestrator.generate_with_backoff("a prompt").unwrap();

        assert_eq!(generation.provider, "alpha");
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn delay_growth_matches_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_cycle(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_cycle(1), Duration::from_secs(15));
        assert_eq!(policy.delay_for_cycle(2), Duration::from_secs(45));
    }
}
