use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Accepted,
    Regenerated,
    Rejected,
}

/// Non-fatal conditions noticed while producing a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultWarning {
    /// Source material was expected or supplied but yielded no usable facts.
    Ungrounded { reason: String },
    /// A reference URL could not be fetched; it was still cited in the prompt.
    ReferenceFetchFailed { url: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: Uuid,
    pub content_type: ContentType,
    pub text: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Executive summary section of a case study.
    pub summary: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub word_count: usize,
    pub char_count: usize,
    pub status: ValidationStatus,
    /// Generation passes used: 1, or 2 after a corrective regeneration.
    pub attempts: u32,
    /// Raw provider calls including transient retries.
    pub provider_calls: u32,
    pub grounded: bool,
    pub facts_used: usize,
    #[serde(default)]
    pub warnings: Vec<ResultWarning>,
    pub model: String,
    pub prompt_fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn is_ungrounded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ResultWarning::Ungrounded { .. }))
    }
}
