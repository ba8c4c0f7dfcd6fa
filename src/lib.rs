//! Content generation engine for blog articles and LinkedIn posts.
//!
//! [`GenerationOrchestrator::generate_content`] is the single operation:
//! a [`GenerationRequest`] goes in, a validated [`GenerationResult`] or a typed
//! [`GenerationError`] comes out.

pub mod cli;
pub mod config;
pub mod errors;
pub mod generator;
pub mod integrations;
pub mod llm;
pub mod types;

pub use config::{Config, ConfigError};
pub use errors::{ErrorDetail, GenerationError};
pub use generator::{CancellationToken, GenerationOrchestrator};
pub use types::{ContentType, GenerationRequest, GenerationResult, ValidationStatus};
