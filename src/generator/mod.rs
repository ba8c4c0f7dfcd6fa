pub mod composer;
pub mod context;
pub mod grounding;
pub mod orchestrator;
pub mod postprocess;
pub mod strategy;
pub mod validator;

pub use composer::{ComposedPrompt, PromptComposer};
pub use context::{CancellationToken, GenerationContext, Stage};
pub use grounding::{FactBudget, GroundingExtractor, GroundingFact, GroundingSource, PageSpan};
pub use orchestrator::GenerationOrchestrator;
pub use strategy::{Strategy, StrategyRegistry};
pub use validator::{OutputValidator, ValidationState, Violation};
