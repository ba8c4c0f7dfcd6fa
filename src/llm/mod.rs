pub mod client;
pub mod provider;

pub use client::{GenerationClient, GenerationOutput, RetryPolicy};
pub use provider::{CompletionRequest, LlmProvider, OpenAiProvider, ProviderError};
