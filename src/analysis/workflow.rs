//! Phase workflows
//!
//! A run is split into three steps so ordering stays explicit:
//!
//! 1. `begin` snapshots the input, builds the prompt and bumps the
//!    sequence number (synchronous).
//! 2. [`Ticket::execute`] talks to the oracle and parses the answer (the only
//!    step that suspends).
//! 3. [`Workflow::complete`] applies the result if it belongs to the latest
//!    run, otherwise drops it (synchronous).
//!
//! `run` chains all three for callers that don't need to interleave runs.

use super::client::{Oracle, TransportError};
use super::extract::{extract, ParseError};
use super::gate::{Clearance, GateError};
use super::prompts::{build_analysis_prompt, build_validation_prompt, AnalysisRequest};
use super::types::{Inspect, StrategicAnalysisResult, ValidationResult};
use crate::business::BusinessContext;
use crate::records::{CostRecord, CostSnapshot};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Shown when a run is started without a single complete cost record
pub const NO_VALID_COSTS_MESSAGE: &str = "No hay costos válidos para analizar";

/// Shown instead of parser internals when the oracle answer can't be read
pub const PARSE_FAILED_MESSAGE: &str =
    "The analysis response could not be understood. Please try again.";

/// What differs between the validation and the strategic-analysis phase
pub trait Phase {
    type Output: DeserializeOwned + Inspect + Send + std::fmt::Debug;
    const NAME: &'static str;
    fn build(records: &[CostRecord], context: &BusinessContext) -> Option<AnalysisRequest>;
}

#[derive(Debug)]
pub struct ValidationPhase;

impl Phase for ValidationPhase {
    type Output = ValidationResult;
    const NAME: &'static str = "validation";

    fn build(records: &[CostRecord], context: &BusinessContext) -> Option<AnalysisRequest> {
        build_validation_prompt(records, context)
    }
}

#[derive(Debug)]
pub struct StrategyPhase;

impl Phase for StrategyPhase {
    type Output = StrategicAnalysisResult;
    const NAME: &'static str = "analysis";

    fn build(records: &[CostRecord], context: &BusinessContext) -> Option<AnalysisRequest> {
        build_analysis_prompt(records, context)
    }
}

/// Current state of one workflow
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome<T> {
    Idle,
    Requesting,
    Succeeded(T),
    NoValidCosts,
    TransportFailed(TransportError),
    /// Parser detail for logs; users see [`PARSE_FAILED_MESSAGE`]
    ParseFailed(String),
}

impl<T> AnalysisOutcome<T> {
    /// Message to put in front of the user, if the run failed
    pub fn user_message(&self) -> Option<String> {
        match self {
            AnalysisOutcome::NoValidCosts => Some(NO_VALID_COSTS_MESSAGE.to_string()),
            AnalysisOutcome::TransportFailed(err) => Some(err.to_string()),
            AnalysisOutcome::ParseFailed(_) => Some(PARSE_FAILED_MESSAGE.to_string()),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.user_message().is_some()
    }
}

/// Input a run was started with
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub snapshot: CostSnapshot,
    pub context: BusinessContext,
}

#[derive(Debug)]
pub enum PhaseFailure {
    Transport(TransportError),
    Parse(ParseError),
}

/// In-flight request for one run
#[derive(Debug)]
pub struct Ticket<P: Phase> {
    sequence: u64,
    request: AnalysisRequest,
    _phase: PhantomData<P>,
}

impl<P: Phase> Ticket<P> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    /// Send the prompt and parse the answer
    pub async fn execute<O: Oracle + ?Sized>(self, oracle: &O) -> Completion<P> {
        let result = match oracle.send(&self.request.prompt).await {
            Ok(raw) => extract::<P::Output>(&raw).map_err(PhaseFailure::Parse),
            Err(err) => Err(PhaseFailure::Transport(err)),
        };
        Completion {
            sequence: self.sequence,
            result,
        }
    }
}

/// Finished request, not yet applied
#[derive(Debug)]
pub struct Completion<P: Phase> {
    sequence: u64,
    result: Result<P::Output, PhaseFailure>,
}

impl<P: Phase> Completion<P> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// One analysis phase, owning at most one outcome at a time
#[derive(Debug)]
pub struct Workflow<P: Phase> {
    outcome: AnalysisOutcome<P::Output>,
    input: Option<RunInput>,
    sequence: u64,
}

pub type ValidationWorkflow = Workflow<ValidationPhase>;
pub type StrategyWorkflow = Workflow<StrategyPhase>;

impl<P: Phase> Default for Workflow<P> {
    fn default() -> Self {
        Self {
            outcome: AnalysisOutcome::Idle,
            input: None,
            sequence: 0,
        }
    }
}

impl<P: Phase> Workflow<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> &AnalysisOutcome<P::Output> {
        &self.outcome
    }

    /// Payload of the latest run, if it succeeded
    pub fn result(&self) -> Option<&P::Output> {
        match &self.outcome {
            AnalysisOutcome::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    /// Snapshot and context of the latest run
    pub fn input(&self) -> Option<&RunInput> {
        self.input.as_ref()
    }

    pub fn is_requesting(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Requesting)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Back to `Idle`. Anything still in flight becomes stale.
    pub fn reset(&mut self) {
        self.sequence += 1;
        self.outcome = AnalysisOutcome::Idle;
        self.input = None;
    }

    fn start(&mut self, snapshot: CostSnapshot, context: BusinessContext) -> Option<Ticket<P>> {
        self.sequence += 1;
        let request = P::build(&snapshot.records, &context);
        self.input = Some(RunInput { snapshot, context });

        let Some(request) = request else {
            tracing::debug!(phase = P::NAME, "no complete cost records; oracle not contacted");
            self.outcome = AnalysisOutcome::NoValidCosts;
            return None;
        };

        tracing::debug!(phase = P::NAME, sequence = self.sequence, "requesting analysis");
        self.outcome = AnalysisOutcome::Requesting;
        Some(Ticket {
            sequence: self.sequence,
            request,
            _phase: PhantomData,
        })
    }

    /// Apply a finished request. Returns false, leaving the state untouched,
    /// when a newer run has started since the ticket was issued.
    pub fn complete(&mut self, completion: Completion<P>) -> bool {
        if completion.sequence != self.sequence {
            tracing::warn!(
                phase = P::NAME,
                stale = completion.sequence,
                current = self.sequence,
                "discarding superseded analysis response"
            );
            return false;
        }

        self.outcome = match completion.result {
            Ok(result) => {
                for drift in result.shape_drift() {
                    tracing::warn!(phase = P::NAME, "response shape drift: {}", drift);
                }
                tracing::info!(phase = P::NAME, "analysis succeeded");
                AnalysisOutcome::Succeeded(result)
            }
            Err(PhaseFailure::Transport(err)) => {
                tracing::info!(phase = P::NAME, error = %err, "analysis request failed");
                AnalysisOutcome::TransportFailed(err)
            }
            Err(PhaseFailure::Parse(err)) => {
                tracing::warn!(
                    phase = P::NAME,
                    error = %err.source,
                    attempted = %crate::util::truncate(&err.attempted, 500),
                    "could not parse analysis response"
                );
                AnalysisOutcome::ParseFailed(err.source.to_string())
            }
        };
        true
    }

    async fn run_with<O: Oracle + ?Sized>(
        &mut self,
        snapshot: CostSnapshot,
        context: BusinessContext,
        oracle: &O,
    ) -> &AnalysisOutcome<P::Output> {
        if let Some(ticket) = self.start(snapshot, context) {
            let completion = ticket.execute(oracle).await;
            self.complete(completion);
        }
        &self.outcome
    }
}

impl ValidationWorkflow {
    /// Start a validation run over a copy of the current records
    pub fn begin(
        &mut self,
        snapshot: CostSnapshot,
        context: BusinessContext,
    ) -> Option<Ticket<ValidationPhase>> {
        self.start(snapshot, context)
    }

    pub async fn run<O: Oracle + ?Sized>(
        &mut self,
        snapshot: CostSnapshot,
        context: BusinessContext,
        oracle: &O,
    ) -> &AnalysisOutcome<ValidationResult> {
        self.run_with(snapshot, context, oracle).await
    }

    /// The validation verdict; false unless the latest run succeeded with
    /// `puede_proseguir_analisis: true`
    pub fn may_proceed(&self) -> bool {
        self.result().is_some_and(ValidationResult::may_proceed)
    }
}

impl StrategyWorkflow {
    /// Start the strategic analysis for the input the gate cleared. Refused
    /// when `validation` has moved on from the confirmed run or no longer
    /// allows the analysis.
    pub fn begin(
        &mut self,
        clearance: Clearance,
        validation: &ValidationWorkflow,
    ) -> Result<Option<Ticket<StrategyPhase>>, GateError> {
        if let Err(err) = clearance.check(validation) {
            tracing::warn!(error = %err, "strategic analysis refused");
            return Err(err);
        }
        let (snapshot, context) = clearance.into_parts();
        Ok(self.start(snapshot, context))
    }

    pub async fn run<O: Oracle + ?Sized>(
        &mut self,
        clearance: Clearance,
        validation: &ValidationWorkflow,
        oracle: &O,
    ) -> Result<&AnalysisOutcome<StrategicAnalysisResult>, GateError> {
        if let Some(ticket) = self.begin(clearance, validation)? {
            let completion = ticket.execute(oracle).await;
            self.complete(completion);
        }
        Ok(&self.outcome)
    }
}
