use std::collections::BTreeMap;

use reqwest::Url;
use tracing::debug;

use crate::config::Config;
use crate::errors::GenerationError;
use crate::generator::grounding::{FactBudget, GroundingExtractor, GroundingFact, GroundingSource};
use crate::generator::strategy::{Strategy, StrategyRegistry};
use crate::types::{
    GenerationRequest, LengthBounds, LengthUnit, LinkedInAuthor, PromptConstraints, PromptPayload,
    TargetLength,
};

// Output tokens per 1000 units of target length, 25% headroom included:
// ~1.4 tokens per word, ~4 characters per token.
const WORD_TOKENS_PER_MILLE: u64 = 1_750;
const CHAR_TOKENS_PER_MILLE: u64 = 312;

// Average characters per word, spaces included, when a word target has to fit
// a character ceiling.
const CHARS_PER_WORD: u32 = 6;

/// A payload plus what went into it.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub payload: PromptPayload,
    pub strategy: Strategy,
    pub facts: Vec<GroundingFact>,
    /// Facts were extracted and placed in the prompt.
    pub grounded: bool,
}

/// Turns a request into a provider-agnostic [`PromptPayload`].
///
/// Composition is a pure function of the request, the sources and the
/// configuration: identical inputs produce byte-identical payloads.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    registry: StrategyRegistry,
    extractor: GroundingExtractor,
    budget: FactBudget,
    max_output_tokens: u32,
    length_tolerance: f64,
    author_models: BTreeMap<String, String>,
}

impl PromptComposer {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: StrategyRegistry::new(&config.enabled_content_types),
            extractor: GroundingExtractor::new(&config.grounding),
            budget: FactBudget::from(&config.grounding),
            max_output_tokens: config.llm.max_output_tokens,
            length_tolerance: config.validation.length_tolerance,
            author_models: config.llm.author_models.clone(),
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Resolve the strategy and check required fields and grouping rules.
    pub fn validate(&self, request: &GenerationRequest) -> Result<Strategy, GenerationError> {
        let strategy = self.registry.resolve_for(request)?;
        let content_type = strategy.content_type();

        for field in strategy.required_fields() {
            if !field.is_present(request) {
                return Err(GenerationError::missing(field.name(), content_type));
            }
        }

        if request.author.is_some() && !matches!(strategy, Strategy::LinkedInPost(_)) {
            return Err(GenerationError::conflicting(
                "author",
                content_type,
                "authors are only accepted for linkedin.post",
            ));
        }

        let has_urls = request.reference_urls.iter().any(|u| !u.trim().is_empty());
        if request.source_document.is_some() && !strategy.accepts_document() {
            return Err(GenerationError::conflicting(
                "source_document",
                content_type,
                "documents are only accepted for blog.case_study",
            ));
        }
        if strategy.requires_source() && request.source_document.is_none() && !has_urls {
            return Err(GenerationError::missing("source_document", content_type));
        }

        if let Some(target) = request.target_length {
            if !target.is_valid() {
                return Err(GenerationError::conflicting(
                    "target_length",
                    content_type,
                    format!("{target} is not a valid range"),
                ));
            }
        }

        for raw in request.reference_urls.iter().filter(|u| !u.trim().is_empty()) {
            let valid = Url::parse(raw.trim())
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(GenerationError::conflicting(
                    "reference_urls",
                    content_type,
                    format!("not an http(s) URL: {raw}"),
                ));
            }
        }

        Ok(strategy)
    }

    /// Build the payload for `request`, grounding it in `sources` when the
    /// strategy uses grounding.
    pub fn compose(
        &self,
        request: &GenerationRequest,
        sources: &[GroundingSource],
    ) -> Result<ComposedPrompt, GenerationError> {
        let strategy = self.validate(request)?;

        let defaults = strategy.default_components();
        let components = match &request.system_components {
            Some(overrides) => overrides.merged_onto(&defaults),
            None => defaults,
        };

        let facts = if strategy.uses_grounding() && !sources.is_empty() {
            self.extractor
                .extract(sources, &request.keywords(), self.budget)
        } else {
            Vec::new()
        };
        let grounded = !facts.is_empty();

        let requested = request
            .target_length
            .unwrap_or_else(|| strategy.default_target_length());
        let target = fit_to_ceiling(&strategy, requested);
        if target != requested {
            debug!(%requested, effective = %target, "target length clamped to platform ceiling");
        }
        let char_ceiling = hard_char_ceiling(&strategy, &target);

        let (system_instruction, user_instruction) = strategy.compose(
            request,
            &components,
            grounded.then_some(facts.as_slice()),
            &length_instruction(&target),
            char_ceiling,
        );

        let constraints = PromptConstraints {
            max_output_tokens: self.output_tokens(&target),
            length: LengthBounds {
                min: target.min,
                max: target.max,
                unit: target.unit,
            },
            length_tolerance: self.length_tolerance,
            hard_char_ceiling: char_ceiling,
            required_markers: strategy.required_markers(request),
        };

        debug!(
            content_type = %strategy.content_type(),
            facts = facts.len(),
            max_output_tokens = constraints.max_output_tokens,
            "prompt composed"
        );

        Ok(ComposedPrompt {
            payload: PromptPayload {
                system_instruction,
                user_instruction,
                constraints,
                model: self.author_model(&strategy, request),
            },
            strategy,
            facts,
            grounded,
        })
    }

    /// Model configured for the requested LinkedIn author, if any.
    fn author_model(&self, strategy: &Strategy, request: &GenerationRequest) -> Option<String> {
        if !matches!(strategy, Strategy::LinkedInPost(_)) {
            return None;
        }
        let author = request.author.filter(|a| *a != LinkedInAuthor::Default)?;
        self.author_models.get(author.as_str()).cloned()
    }

    /// Upper bound converted to tokens with headroom, capped by configuration.
    fn output_tokens(&self, target: &TargetLength) -> u32 {
        let per_mille = match target.unit {
            LengthUnit::Words => WORD_TOKENS_PER_MILLE,
            LengthUnit::Characters => CHAR_TOKENS_PER_MILLE,
        };
        let tokens = (u64::from(target.max) * per_mille).div_ceil(1_000);
        let capped = tokens.min(u64::from(self.max_output_tokens)) as u32;
        capped.max(1)
    }
}

fn length_instruction(target: &TargetLength) -> String {
    format!(
        "between {} and {} {}",
        target.min,
        target.max,
        target.unit.label()
    )
}

/// Clamp a target so it fits the strategy's character ceiling: the upper
/// bound drops to the ceiling (in words, ceiling / 6) and the lower bound
/// never exceeds it.
fn fit_to_ceiling(strategy: &Strategy, target: TargetLength) -> TargetLength {
    let Some(platform) = strategy.hard_char_ceiling() else {
        return target;
    };
    let platform = u32::try_from(platform).unwrap_or(u32::MAX);
    let cap = match target.unit {
        LengthUnit::Characters => platform,
        LengthUnit::Words => platform / CHARS_PER_WORD,
    };
    let max = target.max.min(cap);
    TargetLength {
        min: target.min.min(max),
        max,
        unit: target.unit,
    }
}

fn hard_char_ceiling(strategy: &Strategy, target: &TargetLength) -> Option<usize> {
    let platform = strategy.hard_char_ceiling()?;
    Some(match target.unit {
        LengthUnit::Characters => (target.max as usize).min(platform),
        LengthUnit::Words => platform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, SourceDocument, SystemComponents};

    fn composer() -> PromptComposer {
        PromptComposer::new(&Config::default())
    }

    fn source(text: &str) -> GroundingSource {
        GroundingSource {
            label: "acme.txt".into(),
            text: text.into(),
            pages: vec![],
        }
    }

    #[test]
    fn test_blank_topic_is_missing() {
        let request = GenerationRequest::new(ContentType::GeneralInterestBlog, "   ");
        let err = composer().validate(&request).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MissingRequiredField { ref field, .. } if field == "topic"
        ));
    }

    #[test]
    fn test_grouping_rules() {
        let c = composer();

        let case_study = GenerationRequest::new(ContentType::CaseStudyBlog, "Acme");
        let err = c.validate(&case_study).unwrap_err();
        assert_eq!(err.detail().field.as_deref(), Some("source_document"));

        let mut with_url = case_study.clone();
        with_url.reference_urls = vec!["https://acme.example/story".into()];
        assert_eq!(c.validate(&with_url).unwrap(), Strategy::CaseStudyBlog);

        let mut blog = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        blog.source_document = Some(SourceDocument::from_bytes("text/plain", None, b"x"));
        assert_eq!(c.validate(&blog).unwrap_err().code(), "conflicting_fields");

        let mut post = GenerationRequest::new(ContentType::LinkedInPost, "IA");
        post.source_document = Some(SourceDocument::from_bytes("text/plain", None, b"x"));
        assert_eq!(c.validate(&post).unwrap_err().code(), "conflicting_fields");
    }

    #[test]
    fn test_invalid_target_length_and_url() {
        let c = composer();
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        request.target_length = Some(TargetLength::words(1500, 1000));
        assert_eq!(
            c.validate(&request).unwrap_err().detail().field.as_deref(),
            Some("target_length")
        );

        request.target_length = None;
        request.reference_urls = vec!["ftp://files.example/a".into()];
        assert_eq!(
            c.validate(&request).unwrap_err().detail().field.as_deref(),
            Some("reference_urls")
        );
    }

    #[test]
    fn test_constraints_from_target_length() {
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA en marketing");
        request.target_length = Some(TargetLength::words(1000, 1500));
        request.call_to_action = Some("Contactar para asesoría".into());

        let composed = composer().compose(&request, &[]).unwrap();
        let constraints = &composed.payload.constraints;
        // 1500 * 1.4 * 1.25 = 2625
        assert_eq!(constraints.max_output_tokens, 2625);
        assert_eq!(constraints.length.min, 1000);
        assert_eq!(constraints.hard_char_ceiling, None);
        assert_eq!(constraints.required_markers, vec!["Contactar para asesoría"]);
        assert!(composed.payload.user_instruction.contains("between 1000 and 1500 words"));
        assert!(!composed.grounded);
    }

    #[test]
    fn test_output_tokens_are_capped() {
        let mut config = Config::default();
        config.llm.max_output_tokens = 1000;
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        request.target_length = Some(TargetLength::words(2000, 3000));
        let composed = PromptComposer::new(&config).compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.max_output_tokens, 1000);
    }

    #[test]
    fn test_linkedin_ceiling_never_exceeds_platform_limit() {
        let c = composer();
        let mut request = GenerationRequest::new(ContentType::LinkedInPost, "Remote work");

        request.target_length = Some(TargetLength::characters(500, 1200));
        let composed = c.compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.hard_char_ceiling, Some(1200));

        request.target_length = Some(TargetLength::characters(1000, 9000));
        let composed = c.compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.hard_char_ceiling, Some(3000));
        assert_eq!(composed.payload.constraints.length.max, 3000);

        request.target_length = None;
        let composed = c.compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.hard_char_ceiling, Some(3000));
    }

    #[test]
    fn test_oversized_linkedin_target_is_clamped_everywhere() {
        let mut request = GenerationRequest::new(ContentType::LinkedInPost, "Remote work");
        request.target_length = Some(TargetLength::characters(5000, 9000));
        let composed = composer().compose(&request, &[]).unwrap();
        let constraints = &composed.payload.constraints;
        assert_eq!(constraints.length.min, 3000);
        assert_eq!(constraints.length.max, 3000);
        assert_eq!(constraints.hard_char_ceiling, Some(3000));
        // 3000 * 0.312 = 936
        assert_eq!(constraints.max_output_tokens, 936);
        let user = &composed.payload.user_instruction;
        assert!(user.contains("between 3000 and 3000 characters"));
        assert!(user.contains("under 3000 characters"));
        assert!(!user.contains("9000"));

        request.target_length = Some(TargetLength::words(200, 900));
        let composed = composer().compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.length.min, 200);
        assert_eq!(composed.payload.constraints.length.max, 500);
        assert!(composed.payload.user_instruction.contains("between 200 and 500 words"));

        request.target_length = Some(TargetLength::characters(300, 1200));
        let composed = composer().compose(&request, &[]).unwrap();
        assert!(composed.payload.user_instruction.contains("under 1200 characters"));
    }

    #[test]
    fn test_blog_targets_are_not_clamped() {
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        request.target_length = Some(TargetLength::characters(5000, 9000));
        let composed = composer().compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.constraints.length.max, 9000);
        assert_eq!(composed.payload.constraints.hard_char_ceiling, None);
    }

    #[test]
    fn test_author_selects_model_and_voice() {
        let mut config = Config::default();
        config
            .llm
            .author_models
            .insert("pablo".into(), "ft:gpt-4o:pablo".into());
        let c = PromptComposer::new(&config);

        let mut request = GenerationRequest::new(ContentType::LinkedInPost, "Remote work");
        request.author = Some(LinkedInAuthor::Pablo);
        let composed = c.compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.model.as_deref(), Some("ft:gpt-4o:pablo"));
        assert!(composed.payload.system_instruction.contains("Write the way Pablo writes"));

        request.author = Some(LinkedInAuthor::Aitor);
        let composed = c.compose(&request, &[]).unwrap();
        assert_eq!(composed.payload.model, None);
        assert!(composed.payload.system_instruction.contains("Write the way Aitor writes"));

        request.author = Some(LinkedInAuthor::Default);
        assert_eq!(c.compose(&request, &[]).unwrap().payload.model, None);
    }

    #[test]
    fn test_author_on_blog_conflicts() {
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        request.author = Some(LinkedInAuthor::Pablo);
        let err = composer().validate(&request).unwrap_err();
        assert_eq!(err.code(), "conflicting_fields");
        assert_eq!(err.detail().field.as_deref(), Some("author"));
    }

    #[test]
    fn test_overrides_replace_only_given_components() {
        let mut request = GenerationRequest::new(ContentType::GeneralInterestBlog, "IA");
        request.system_components = Some(SystemComponents {
            role_description: Some("veteran tech journalist".into()),
            tone: Some("".into()),
            ..Default::default()
        });
        let composed = composer().compose(&request, &[]).unwrap();
        let system = &composed.payload.system_instruction;
        assert!(system.starts_with("You are a veteran tech journalist."));
        assert!(system.contains("Balanced between professional and informal"));
    }

    #[test]
    fn test_grounded_case_study_and_determinism() {
        let mut request = GenerationRequest::new(ContentType::CaseStudyBlog, "Acme logistics");
        request.reference_urls = vec!["https://acme.example".into()];
        let sources = [source(
            "Acme cut delivery costs by 30% in 2023. The project ran across Spain and Portugal.",
        )];

        let first = composer().compose(&request, &sources).unwrap();
        let second = composer().compose(&request, &sources).unwrap();
        assert!(first.grounded);
        assert_eq!(first.facts.len(), 2);
        assert_eq!(first.payload, second.payload);
        assert!(first.payload.user_instruction.contains("https://acme.example"));
        assert!(first.payload.user_instruction.contains("[acme.txt]"));
    }

    #[test]
    fn test_linkedin_ignores_sources() {
        let request = GenerationRequest::new(ContentType::LinkedInPost, "Remote work");
        let composed = composer()
            .compose(&request, &[source("Acme grew 40% in 2022 across Europe.")])
            .unwrap();
        assert!(composed.facts.is_empty());
        assert!(!composed.grounded);
    }
}
