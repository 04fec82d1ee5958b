//! Decides whether the primary answer stands or the fallback path runs.

use crate::category::OperationCategory;
use crate::executor::StepResult;
use crate::validator::ValidationResult;
use log::info;
use serde::Serialize;
use switchyard_config::FallbackConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackDecision {
    pub use_fallback: bool,
    pub reason: String,
    /// The validator asked for fallback but a successful real-time lookup
    /// outranked it.
    pub validator_overridden: bool,
}

impl FallbackDecision {
    fn keep(reason: &str) -> Self {
        Self {
            use_fallback: false,
            reason: reason.to_string(),
            validator_overridden: false,
        }
    }

    fn fall_back(reason: &str) -> Self {
        Self {
            use_fallback: true,
            reason: reason.to_string(),
            validator_overridden: false,
        }
    }
}

pub struct FallbackCoordinator {
    config: FallbackConfig,
}

impl FallbackCoordinator {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// `primary_failed` means the primary path produced no usable answer:
    /// every step failed, or nothing ran and no model answered.
    pub fn decide(
        &self,
        prompt: &str,
        validation: Option<&ValidationResult>,
        policy_fallback: bool,
        primary_failed: bool,
        results: &[StepResult],
    ) -> FallbackDecision {
        let decision = self.arbitrate(prompt, validation, policy_fallback, primary_failed, results);
        info!(
            "fallback decided (use_fallback={}, overridden={}, reason={})",
            decision.use_fallback, decision.validator_overridden, decision.reason
        );
        decision
    }

    fn arbitrate(
        &self,
        prompt: &str,
        validation: Option<&ValidationResult>,
        policy_fallback: bool,
        primary_failed: bool,
        results: &[StepResult],
    ) -> FallbackDecision {
        if !self.config.enabled {
            return FallbackDecision::keep("fallback disabled");
        }
        if primary_failed {
            return FallbackDecision::fall_back("primary path produced no answer");
        }
        if policy_fallback {
            return FallbackDecision::fall_back("policy requested fallback");
        }
        let Some(validation) = validation.filter(|validation| validation.should_fallback) else {
            return FallbackDecision::keep("primary answer accepted");
        };
        let real_time_lookup_succeeded = results.iter().any(|result| {
            result.succeeded && result.step.category == Some(OperationCategory::RealTimeInformation)
        });
        if self.config.real_time_override
            && OperationCategory::RealTimeInformation.matches_prompt(prompt)
            && real_time_lookup_succeeded
        {
            return FallbackDecision {
                use_fallback: false,
                reason: "real-time answer kept over validator recommendation".to_string(),
                validator_overridden: true,
            };
        }
        if validation.degraded {
            FallbackDecision::fall_back("validation degraded")
        } else {
            FallbackDecision::fall_back("validator recommended fallback")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannedStep;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn failing_validation() -> ValidationResult {
        ValidationResult {
            confidence: 0.3,
            issues: vec!["response is brief relative to the request".to_string()],
            suggestions: Vec::new(),
            should_fallback: true,
            coherence: 0.7,
            accuracy: 0.0,
            completeness: 0.7,
            safety: 0.0,
            safety_issues: Vec::new(),
            degraded: false,
        }
    }

    fn search_result(succeeded: bool) -> StepResult {
        StepResult {
            step: PlannedStep {
                operation: "webSearch".to_string(),
                provider: "web".to_string(),
                arguments: json!({}),
                category: Some(OperationCategory::RealTimeInformation),
            },
            succeeded,
            output: succeeded.then(|| "chips up".to_string()),
            error: (!succeeded).then(|| "offline".to_string()),
            elapsed_ms: 3,
        }
    }

    fn coordinator() -> FallbackCoordinator {
        FallbackCoordinator::new(FallbackConfig::default())
    }

    #[test]
    fn real_time_lookup_overrides_validator() {
        let decision = coordinator().decide(
            "latest news on chips",
            Some(&failing_validation()),
            false,
            false,
            &[search_result(true)],
        );
        assert_eq!(decision.use_fallback, false);
        assert_eq!(decision.validator_overridden, true);
    }

    #[test]
    fn one_successful_lookup_is_enough() {
        let decision = coordinator().decide(
            "latest news on chips",
            Some(&failing_validation()),
            false,
            false,
            &[search_result(false), search_result(true)],
        );
        assert_eq!(decision.use_fallback, false);
        assert_eq!(decision.validator_overridden, true);
    }

    #[test]
    fn failed_lookup_does_not_override() {
        let decision = coordinator().decide(
            "latest news on chips",
            Some(&failing_validation()),
            false,
            false,
            &[search_result(false)],
        );
        assert_eq!(decision.use_fallback, true);
    }

    #[test]
    fn non_real_time_prompt_falls_back() {
        let decision = coordinator().decide(
            "explain chip design",
            Some(&failing_validation()),
            false,
            false,
            &[search_result(true)],
        );
        assert_eq!(decision.use_fallback, true);
        assert_eq!(decision.validator_overridden, false);
    }

    #[test]
    fn policy_fallback_is_not_overridden() {
        let decision =
            coordinator().decide("latest news", None, true, false, &[search_result(true)]);
        assert_eq!(decision.use_fallback, true);
        assert_eq!(decision.reason, "policy requested fallback");
    }

    #[test]
    fn disabled_fallback_keeps_primary() {
        let coordinator = FallbackCoordinator::new(FallbackConfig {
            enabled: false,
            ..FallbackConfig::default()
        });
        let decision = coordinator.decide("x", Some(&failing_validation()), true, true, &[]);
        assert_eq!(decision.use_fallback, false);
    }

    #[test]
    fn failed_primary_path_falls_back_without_validation() {
        let decision = coordinator().decide("latest news", None, false, true, &[search_result(false)]);
        assert_eq!(decision.use_fallback, true);
        assert_eq!(decision.reason, "primary path produced no answer");
    }
}
