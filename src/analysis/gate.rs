//! Confirmation gate between validation and strategic analysis
//!
//! [`Clearance`] is the only way into [`StrategyWorkflow`], and only a
//! [`ConfirmPrompt`] can produce one. A confirm prompt is only presented when
//! the latest validation succeeded with `puede_proseguir_analisis: true`, so a
//! blocked validation has no path to the second phase at all.
//!
//! A clearance remembers which validation run it confirmed. Once validation
//! runs again or is reset, older clearances stop being accepted.
//!
//! [`StrategyWorkflow`]: super::workflow::StrategyWorkflow

use super::types::ValidationResult;
use super::workflow::{AnalysisOutcome, RunInput, ValidationWorkflow};
use crate::business::BusinessContext;
use crate::records::CostSnapshot;
use thiserror::Error;

/// Why a clearance was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("validation changed since the analysis was confirmed (confirmed run {confirmed}, current run {current})")]
    Superseded { confirmed: u64, current: u64 },
    #[error("the latest validation does not allow the analysis to proceed")]
    NotAllowed,
}

/// Proof that the user confirmed a successful validation
#[derive(Debug, PartialEq)]
pub struct Clearance {
    sequence: u64,
    snapshot: CostSnapshot,
    context: BusinessContext,
}

impl Clearance {
    /// Sequence number of the validation run that was confirmed
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Accept only if `validation` is still on the confirmed run and that run
    /// allows the analysis
    pub fn check(&self, validation: &ValidationWorkflow) -> Result<(), GateError> {
        if self.sequence != validation.sequence() {
            return Err(GateError::Superseded {
                confirmed: self.sequence,
                current: validation.sequence(),
            });
        }
        if !validation.may_proceed() {
            return Err(GateError::NotAllowed);
        }
        Ok(())
    }

    /// The records exactly as they were validated
    pub fn snapshot(&self) -> &CostSnapshot {
        &self.snapshot
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }

    pub fn into_parts(self) -> (CostSnapshot, BusinessContext) {
        (self.snapshot, self.context)
    }
}

/// Where the user ends up after dismissing a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Back to editing costs; the store is left as it was
    Editing,
    /// Run validation again with the current records
    Retry,
}

/// What the gate shows for the current validation state
#[derive(Debug)]
pub enum GatePrompt<'a> {
    /// Nothing to decide yet (idle or request in flight)
    Pending,
    Confirm(ConfirmPrompt<'a>),
    Acknowledge(AcknowledgePrompt<'a>),
    Failed(FailurePrompt),
}

/// Validation passed; the user may confirm or cancel
#[derive(Debug)]
pub struct ConfirmPrompt<'a> {
    sequence: u64,
    result: &'a ValidationResult,
    input: &'a RunInput,
}

impl<'a> ConfirmPrompt<'a> {
    pub fn result(&self) -> &'a ValidationResult {
        self.result
    }

    pub fn message(&self) -> &'a str {
        &self.result.summary.message
    }

    pub fn total(&self) -> f64 {
        self.input.snapshot.total
    }

    pub fn confirm(self) -> Clearance {
        tracing::debug!(
            sequence = self.sequence,
            total = self.input.snapshot.total,
            "analysis confirmed"
        );
        Clearance {
            sequence: self.sequence,
            snapshot: self.input.snapshot.clone(),
            context: self.input.context.clone(),
        }
    }

    pub fn cancel(self) -> Resolution {
        Resolution::Editing
    }
}

/// Validation blocked the analysis; the only option is to go back and fix it
#[derive(Debug)]
pub struct AcknowledgePrompt<'a> {
    result: &'a ValidationResult,
}

impl<'a> AcknowledgePrompt<'a> {
    pub fn result(&self) -> &'a ValidationResult {
        self.result
    }

    pub fn message(&self) -> &'a str {
        &self.result.summary.message
    }

    pub fn acknowledge(self) -> Resolution {
        Resolution::Editing
    }
}

/// Validation could not produce a verdict
#[derive(Debug)]
pub struct FailurePrompt {
    message: String,
}

impl FailurePrompt {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn acknowledge(self) -> Resolution {
        Resolution::Editing
    }

    pub fn retry(self) -> Resolution {
        Resolution::Retry
    }
}

/// Map the validation workflow state to the prompt the user should see
pub fn present(validation: &ValidationWorkflow) -> GatePrompt<'_> {
    match (validation.outcome(), validation.input()) {
        (AnalysisOutcome::Succeeded(result), Some(input)) if result.may_proceed() => {
            GatePrompt::Confirm(ConfirmPrompt {
                sequence: validation.sequence(),
                result,
                input,
            })
        }
        (AnalysisOutcome::Succeeded(result), _) => {
            GatePrompt::Acknowledge(AcknowledgePrompt { result })
        }
        (outcome, _) => match outcome.user_message() {
            Some(message) => GatePrompt::Failed(FailurePrompt { message }),
            None => GatePrompt::Pending,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::client::TransportError;
    use crate::analysis::workflow::tests::{
        analysis_answer, rent_store, validation_answer, ScriptedOracle,
    };
    use crate::analysis::workflow::{StrategyWorkflow, NO_VALID_COSTS_MESSAGE};
    use crate::records::CostRecordStore;

    async fn validated(answer: Result<String, TransportError>) -> ValidationWorkflow {
        let oracle = ScriptedOracle::new(vec![answer]);
        let mut workflow = ValidationWorkflow::new();
        workflow
            .run(rent_store("500").snapshot(), BusinessContext::unspecified(), &oracle)
            .await;
        workflow
    }

    #[test]
    fn test_idle_workflow_is_pending() {
        let workflow = ValidationWorkflow::new();
        assert!(matches!(present(&workflow), GatePrompt::Pending));
    }

    #[tokio::test]
    async fn test_may_proceed_offers_confirmation() {
        let workflow = validated(Ok(validation_answer(true))).await;
        let GatePrompt::Confirm(prompt) = present(&workflow) else {
            panic!("expected confirmation prompt");
        };
        assert_eq!(prompt.total(), 500.0);
        assert_eq!(prompt.message(), "Lista revisada.");

        let clearance = prompt.confirm();
        assert_eq!(clearance.snapshot(), &workflow.input().unwrap().snapshot);
        assert_eq!(clearance.context(), &BusinessContext::unspecified());
    }

    #[tokio::test]
    async fn test_cancel_returns_to_editing() {
        let workflow = validated(Ok(validation_answer(true))).await;
        let GatePrompt::Confirm(prompt) = present(&workflow) else {
            panic!("expected confirmation prompt");
        };
        assert_eq!(prompt.cancel(), Resolution::Editing);
        assert!(workflow.may_proceed());
    }

    #[tokio::test]
    async fn test_blocked_validation_only_acknowledges() {
        let workflow = validated(Ok(validation_answer(false))).await;
        let GatePrompt::Acknowledge(ack) = present(&workflow) else {
            panic!("expected acknowledge prompt");
        };
        assert!(!ack.result().may_proceed());
        assert_eq!(ack.acknowledge(), Resolution::Editing);
    }

    #[tokio::test]
    async fn test_clearance_rejected_after_blocked_revalidation() {
        let oracle = ScriptedOracle::new(vec![
            Ok(validation_answer(true)),
            Ok(validation_answer(false)),
            Ok(analysis_answer()),
        ]);
        let store = rent_store("500");
        let mut validation = ValidationWorkflow::new();
        let mut strategy = StrategyWorkflow::new();

        validation
            .run(store.snapshot(), BusinessContext::unspecified(), &oracle)
            .await;
        let GatePrompt::Confirm(prompt) = present(&validation) else {
            panic!("expected confirmation prompt");
        };
        let clearance = prompt.confirm();
        assert_eq!(clearance.check(&validation), Ok(()));

        validation
            .run(store.snapshot(), BusinessContext::unspecified(), &oracle)
            .await;
        assert!(!validation.may_proceed());
        assert!(matches!(
            clearance.check(&validation),
            Err(GateError::Superseded { .. })
        ));

        let err = strategy
            .run(clearance, &validation, &oracle)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Superseded { .. }));
        assert_eq!(*strategy.outcome(), AnalysisOutcome::Idle);
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_clearance_rejected_after_reset() {
        let mut workflow = validated(Ok(validation_answer(true))).await;
        let GatePrompt::Confirm(prompt) = present(&workflow) else {
            panic!("expected confirmation prompt");
        };
        let clearance = prompt.confirm();

        workflow.reset();
        assert_eq!(
            clearance.check(&workflow),
            Err(GateError::Superseded {
                confirmed: clearance.sequence(),
                current: workflow.sequence(),
            })
        );
    }

    #[tokio::test]
    async fn test_clearance_from_other_workflow_needs_passing_verdict() {
        let passed = validated(Ok(validation_answer(true))).await;
        let blocked = validated(Ok(validation_answer(false))).await;
        assert_eq!(passed.sequence(), blocked.sequence());

        let GatePrompt::Confirm(prompt) = present(&passed) else {
            panic!("expected confirmation prompt");
        };
        let clearance = prompt.confirm();
        assert_eq!(clearance.check(&blocked), Err(GateError::NotAllowed));
    }

    #[tokio::test]
    async fn test_transport_failure_offers_retry() {
        let workflow = validated(Err(TransportError::Timeout)).await;
        let GatePrompt::Failed(failure) = present(&workflow) else {
            panic!("expected failure prompt");
        };
        assert_eq!(failure.message(), TransportError::Timeout.to_string());
        assert_eq!(failure.retry(), Resolution::Retry);
    }

    #[tokio::test]
    async fn test_no_valid_costs_is_failure() {
        let oracle = ScriptedOracle::new(vec![]);
        let mut workflow = ValidationWorkflow::new();
        workflow
            .run(
                CostRecordStore::new(1).snapshot(),
                BusinessContext::unspecified(),
                &oracle,
            )
            .await;
        let GatePrompt::Failed(failure) = present(&workflow) else {
            panic!("expected failure prompt");
        };
        assert_eq!(failure.message(), NO_VALID_COSTS_MESSAGE);
        assert_eq!(failure.acknowledge(), Resolution::Editing);
    }
}
