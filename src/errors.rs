use serde::Serialize;
use thiserror::Error;

use crate::generator::context::Stage;
use crate::generator::validator::Violation;

/// Every expected failure of a generation run.
///
/// The HTTP layer renders these through [`GenerationError::detail`]; nothing the
/// engine anticipates is ever reported as an opaque error.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("missing required field `{field}` for {content_type}")]
    MissingRequiredField { field: String, content_type: String },

    #[error("invalid `{field}` for {content_type}: {reason}")]
    ConflictingFields {
        field: String,
        content_type: String,
        reason: String,
    },

    #[error("unknown content type: {content_type}")]
    UnknownContentType { content_type: String },

    #[error("document is {size} bytes, limit is {limit} bytes")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("document unreadable: {reason}")]
    DocumentUnreadable { reason: String },

    #[error("provider rejected the request: {message}")]
    ProviderRejected { status: Option<u16>, message: String },

    #[error("provider unavailable after {attempts} attempts: {last_error}")]
    ProviderUnavailable { attempts: u32, last_error: String },

    #[error("generated content failed validation after {attempts} attempts: {summary}")]
    ContentValidationFailed {
        attempts: u32,
        summary: String,
        violations: Vec<Violation>,
    },

    #[error("generation cancelled before {stage}")]
    Cancelled { stage: Stage },
}

/// Structured, serialisable view of a [`GenerationError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub retryable: bool,
}

impl GenerationError {
    pub fn missing(field: impl Into<String>, content_type: impl ToString) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            content_type: content_type.to_string(),
        }
    }

    pub fn conflicting(
        field: impl Into<String>,
        content_type: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConflictingFields {
            field: field.into(),
            content_type: content_type.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unreadable(reason: impl Into<String>) -> Self {
        Self::DocumentUnreadable {
            reason: reason.into(),
        }
    }

    pub fn validation_failed(attempts: u32, violations: Vec<Violation>) -> Self {
        let summary = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::ContentValidationFailed {
            attempts,
            summary,
            violations,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredField { .. } => "missing_required_field",
            Self::ConflictingFields { .. } => "conflicting_fields",
            Self::UnknownContentType { .. } => "unknown_content_type",
            Self::DocumentTooLarge { .. } => "document_too_large",
            Self::DocumentUnreadable { .. } => "document_unreadable",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ContentValidationFailed { .. } => "content_validation_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::Cancelled { .. }
        )
    }

    pub fn detail(&self) -> ErrorDetail {
        let field = match self {
            Self::MissingRequiredField { field, .. } | Self::ConflictingFields { field, .. } => {
                Some(field.clone())
            }
            Self::UnknownContentType { .. } => Some("content_type".to_string()),
            Self::DocumentTooLarge { .. } | Self::DocumentUnreadable { .. } => {
                Some("source_document".to_string())
            }
            _ => None,
        };
        let attempts = match self {
            Self::ProviderUnavailable { attempts, .. }
            | Self::ContentValidationFailed { attempts, .. } => Some(*attempts),
            _ => None,
        };
        let violations = match self {
            Self::ContentValidationFailed { violations, .. } => violations.clone(),
            _ => Vec::new(),
        };

        ErrorDetail {
            code: self.code(),
            message: self.to_string(),
            field,
            violations,
            attempts,
            retryable: self.is_retryable(),
        }
    }
}
