use super::{
    ComputationStatus, SensitivityMode, SensitivityOracle, SensitivityRequest,
    SystematicSensitivityResult,
};
use rao_core::Network;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Oracle wrapper applying the default-then-fallback retry policy.
///
/// The chain mirrors a solver dispatcher: try the strict configuration,
/// then the looser one up to `max_retries_with_fallback` times, and report
/// a `Failure` result rather than an error when everything fails.
#[derive(Clone)]
pub struct SensitivityComputer {
    oracle: Arc<dyn SensitivityOracle>,
    max_retries_with_fallback: usize,
}

impl SensitivityComputer {
    pub fn new(oracle: Arc<dyn SensitivityOracle>, max_retries_with_fallback: usize) -> Self {
        Self {
            oracle,
            max_retries_with_fallback,
        }
    }

    pub fn oracle(&self) -> &Arc<dyn SensitivityOracle> {
        &self.oracle
    }

    pub fn compute(&self, network: &Network, request: &SensitivityRequest<'_>) -> SystematicSensitivityResult {
        match self.oracle.compute(network, request, SensitivityMode::Default) {
            Ok(result) if result.status() != ComputationStatus::Failure => return result,
            Ok(_) => warn!(
                oracle = self.oracle.name(),
                "Sensitivity computation failed with default parameters"
            ),
            Err(e) => warn!(
                oracle = self.oracle.name(),
                "Sensitivity computation failed with default parameters: {}", e
            ),
        }

        for attempt in 1..=self.max_retries_with_fallback {
            debug!(attempt, "Retrying sensitivity computation with fallback parameters");
            match self.oracle.compute(network, request, SensitivityMode::Fallback) {
                Ok(mut result) if result.status() != ComputationStatus::Failure => {
                    result.mark_fallback();
                    return result;
                }
                Ok(_) => warn!(attempt, "Fallback sensitivity computation failed"),
                Err(e) => warn!(attempt, "Fallback sensitivity computation failed: {}", e),
            }
        }

        error!(
            oracle = self.oracle.name(),
            "Sensitivity computation failed, no fallback left"
        );
        SystematicSensitivityResult::failed()
    }
}

impl std::fmt::Debug for SensitivityComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensitivityComputer")
            .field("oracle", &self.oracle.name())
            .field("max_retries_with_fallback", &self.max_retries_with_fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied::AppliedRemedialActions;
    use rao_core::{CoreResult, RaoError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
    }

    impl SensitivityOracle for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn compute(
            &self,
            _network: &Network,
            _request: &SensitivityRequest<'_>,
            _mode: SensitivityMode,
        ) -> CoreResult<SystematicSensitivityResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(RaoError::Sensitivity("diverged".into()))
            } else {
                Ok(SystematicSensitivityResult::new(ComputationStatus::Default))
            }
        }
    }

    fn run(failures: usize, retries: usize) -> SystematicSensitivityResult {
        let oracle = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            failures,
        });
        let computer = SensitivityComputer::new(oracle, retries);
        let applied = AppliedRemedialActions::new();
        let request = SensitivityRequest {
            cnecs: &[],
            range_actions: &[],
            contingencies: &[],
            applied_remedial_actions: &applied,
            compute_ptdf_sums: false,
            compute_loop_flows: false,
        };
        computer.compute(&Network::new("n"), &request)
    }

    #[test]
    fn test_fallback_after_one_failure() {
        assert_eq!(run(0, 1).status(), ComputationStatus::Default);
        assert_eq!(run(1, 1).status(), ComputationStatus::Fallback);
    }

    #[test]
    fn test_second_failure_is_reported_not_raised() {
        assert_eq!(run(2, 1).status(), ComputationStatus::Failure);
        assert_eq!(run(1, 0).status(), ComputationStatus::Failure);
    }
}
