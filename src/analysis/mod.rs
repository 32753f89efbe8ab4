//! Two-phase cost analysis: validation, a confirmation gate, then strategy

pub mod client;
pub mod extract;
pub mod gate;
pub mod prompts;
pub mod types;
pub mod workflow;

pub use client::{HttpOracle, Oracle, TransportError};
pub use extract::{extract, ParseError};
pub use gate::{present, Clearance, GateError, GatePrompt, Resolution};
pub use prompts::{build_analysis_prompt, build_validation_prompt, AnalysisRequest};
pub use types::{ShapeDrift, StrategicAnalysisResult, ValidationResult};
pub use workflow::{AnalysisOutcome, StrategyWorkflow, ValidationWorkflow};
