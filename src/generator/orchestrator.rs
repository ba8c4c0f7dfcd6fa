use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, debug, info, info_span};

use crate::config::{Config, ConfigError};
use crate::errors::GenerationError;
use crate::generator::composer::PromptComposer;
use crate::generator::context::{CancellationToken, GenerationContext, Stage};
use crate::generator::postprocess::{self, ProcessedDraft};
use crate::generator::strategy::Strategy;
use crate::generator::validator::{self, OutputValidator, ValidationState, Violation};
use crate::integrations::knowledge_sync::{HttpReferenceFetcher, KnowledgeSyncer, ReferenceFetcher};
use crate::llm::client::GenerationClient;
use crate::llm::provider::{LlmProvider, OpenAiProvider};
use crate::types::{
    GenerationRequest, GenerationResult, PromptPayload, ResultWarning, ValidationStatus,
};

/// Single entry point of the engine.
///
/// Holds only read-only collaborators, so one instance can be shared behind an
/// `Arc` and serve any number of concurrent requests.
pub struct GenerationOrchestrator {
    config: Config,
    composer: PromptComposer,
    collector: KnowledgeSyncer,
    client: GenerationClient,
    validator: OutputValidator,
}

impl GenerationOrchestrator {
    /// Build an engine around `provider`. Reference URLs are fetched over
    /// HTTP when `grounding.fetch_reference_urls` is set.
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>) -> Result<Self, ConfigError> {
        config.validate()?;

        let fetcher: Option<Arc<dyn ReferenceFetcher>> = if config.grounding.fetch_reference_urls {
            let http = HttpReferenceFetcher::new(&config.grounding).map_err(|e| ConfigError::Invalid {
                key: "grounding.fetch_reference_urls",
                reason: format!("{e:#}"),
            })?;
            Some(Arc::new(http))
        } else {
            None
        };

        Ok(Self {
            composer: PromptComposer::new(&config),
            collector: KnowledgeSyncer::new(&config, fetcher),
            client: GenerationClient::new(&config, provider),
            validator: OutputValidator::new(&config.validation.denylist),
            config,
        })
    }

    /// Engine backed by the OpenAI-compatible HTTP provider.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        if config.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "llm.api_key",
                reason: format!(
                    "not set; add it to the config file or export {}",
                    crate::config::API_KEY_ENV
                ),
            });
        }
        let provider = Arc::new(OpenAiProvider::new(&config.llm));
        Self::new(config, provider)
    }

    /// Replace the reference fetcher, e.g. with an offline one.
    pub fn with_reference_fetcher(mut self, fetcher: Arc<dyn ReferenceFetcher>) -> Self {
        self.collector = KnowledgeSyncer::new(&self.config, Some(fetcher));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn generate_content(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate_content_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`generate_content`](Self::generate_content), but gives up at the
    /// next stage boundary once `cancel` fires.
    pub async fn generate_content_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        let strategy = self.composer.validate(&request)?;
        let ctx = GenerationContext::new(strategy.content_type(), cancel.clone());
        let span = info_span!(
            "generate",
            request_id = %ctx.request_id,
            content_type = %ctx.content_type
        );
        self.run(&request, strategy, ctx).instrument(span).await
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        strategy: Strategy,
        mut ctx: GenerationContext,
    ) -> Result<GenerationResult, GenerationError> {
        info!(topic = %request.topic, "generation started");

        ctx.checkpoint(Stage::Ingestion)?;
        let mut sources = Vec::new();
        if let Some(document) = self.collector.ingest_document(request).await? {
            sources.push(document);
        }

        ctx.checkpoint(Stage::Collection)?;
        if strategy.uses_grounding() && !request.reference_urls.is_empty() {
            let collected = self
                .collector
                .collect_references(&request.reference_urls)
                .await;
            sources.extend(collected.sources);
            for warning in collected.warnings {
                ctx.warn(warning);
            }
        }

        ctx.checkpoint(Stage::Composition)?;
        let composed = self.composer.compose(request, &sources)?;
        if !composed.grounded
            && strategy.uses_grounding()
            && (strategy.requires_source() || !sources.is_empty())
        {
            let reason = if sources.is_empty() {
                "no source text could be collected"
            } else {
                "source material yielded no usable facts"
            };
            info!(reason, "continuing without grounding");
            ctx.warn(ResultWarning::Ungrounded {
                reason: reason.to_string(),
            });
        }
        let payload = composed.payload;
        let fingerprint = payload.fingerprint();
        debug!(fingerprint = %fingerprint, facts = composed.facts.len(), "payload ready");

        ctx.checkpoint(Stage::Generation)?;
        let first = self.draft(&payload, &strategy, &mut ctx).await?;
        ctx.checkpoint(Stage::Validation)?;
        let violations = self.validate(&first, &payload);

        let (draft, status, attempts) = if violations.is_empty() {
            transition(ValidationState::Accepted, 1);
            (first, ValidationStatus::Accepted, 1)
        } else {
            transition(ValidationState::Regenerating, 1);
            ctx.checkpoint(Stage::Regeneration)?;
            let corrected = payload.with_correction(&validator::correction_for(&violations));
            let second = self.draft(&corrected, &strategy, &mut ctx).await?;

            ctx.checkpoint(Stage::Validation)?;
            let remaining = self.validate(&second, &payload);
            if !remaining.is_empty() {
                transition(ValidationState::Rejected, 2);
                return Err(GenerationError::validation_failed(2, remaining));
            }
            transition(ValidationState::Accepted, 2);
            (second, ValidationStatus::Regenerated, 2)
        };

        ctx.checkpoint(Stage::PostProcessing)?;
        let result = GenerationResult {
            id: ctx.request_id,
            content_type: ctx.content_type,
            word_count: validator::word_count(&draft.text),
            char_count: draft.text.chars().count(),
            text: draft.text,
            title: draft.title,
            meta_description: draft.meta_description,
            keywords: draft.keywords,
            summary: draft.summary,
            hashtags: draft.hashtags,
            status,
            attempts,
            provider_calls: ctx.provider_calls,
            grounded: composed.grounded,
            facts_used: composed.facts.len(),
            warnings: ctx.warnings.clone(),
            model: self.client.model_for(&payload).to_string(),
            prompt_fingerprint: fingerprint,
            generated_at: Utc::now(),
        };

        info!(
            status = ?result.status,
            attempts = result.attempts,
            provider_calls = result.provider_calls,
            words = result.word_count,
            elapsed_ms = ctx.elapsed_ms(),
            "generation finished"
        );
        Ok(result)
    }

    async fn draft(
        &self,
        payload: &PromptPayload,
        strategy: &Strategy,
        ctx: &mut GenerationContext,
    ) -> Result<ProcessedDraft, GenerationError> {
        let output = self.client.generate(payload).await?;
        ctx.provider_calls += output.provider_calls;
        debug!(state = %ValidationState::Generated, chars = output.text.len(), "draft received");
        Ok(postprocess::process(
            &output.text,
            strategy.content_type(),
            &payload.constraints.required_markers,
        ))
    }

    fn validate(&self, draft: &ProcessedDraft, payload: &PromptPayload) -> Vec<Violation> {
        debug!(state = %ValidationState::Validating, "checking draft");
        let violations = self.validator.check(&draft.text, &payload.constraints);
        for violation in &violations {
            debug!(%violation, "draft violation");
        }
        violations
    }
}

fn transition(state: ValidationState, attempt: u32) {
    info!(%state, attempt, "validation state");
}
