use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::request::LengthUnit;

/// Length bounds the validator enforces, before tolerance is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: u32,
    pub max: u32,
    pub unit: LengthUnit,
}

impl LengthBounds {
    /// Bounds widened by `tolerance` (0.15 = ±15%).
    pub fn with_tolerance(&self, tolerance: f64) -> (usize, usize) {
        let lower = (self.min as f64 * (1.0 - tolerance)).floor().max(0.0) as usize;
        let upper = (self.max as f64 * (1.0 + tolerance)).ceil() as usize;
        (lower, upper)
    }
}

/// Constraints declared alongside the prompt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConstraints {
    pub max_output_tokens: u32,
    pub length: LengthBounds,
    pub length_tolerance: f64,
    /// Absolute character limit of the platform, if it has one.
    pub hard_char_ceiling: Option<usize>,
    /// Strings that must appear verbatim in the output.
    pub required_markers: Vec<String>,
}

/// Provider-agnostic prompt: the only thing the generation client ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system_instruction: String,
    pub user_instruction: String,
    pub constraints: PromptConstraints,
    /// Model to use instead of the client's configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl PromptPayload {
    /// Same prompt with a corrective note appended to the user instruction.
    pub fn with_correction(&self, correction: &str) -> PromptPayload {
        let mut amended = self.clone();
        amended.user_instruction.push_str("\n\nCORRECTION REQUIRED:\n");
        amended
            .user_instruction
            .push_str("Your previous draft was rejected. Rewrite it in full and fix the following:\n");
        amended.user_instruction.push_str(correction);
        amended
    }

    /// MD5 over both instructions, for tracing and reproducibility checks.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.system_instruction.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user_instruction.as_bytes());
        if let Some(model) = &self.model {
            hasher.update([0u8]);
            hasher.update(model.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PromptPayload {
        PromptPayload {
            system_instruction: "system".into(),
            user_instruction: "user".into(),
            constraints: PromptConstraints {
                max_output_tokens: 1000,
                length: LengthBounds {
                    min: 1000,
                    max: 1500,
                    unit: LengthUnit::Words,
                },
                length_tolerance: 0.15,
                hard_char_ceiling: None,
                required_markers: vec![],
            },
            model: None,
        }
    }

    #[test]
    fn test_tolerance_band() {
        let bounds = payload().constraints.length;
        assert_eq!(bounds.with_tolerance(0.15), (850, 1725));
        assert_eq!(bounds.with_tolerance(0.0), (1000, 1500));
    }

    #[test]
    fn test_correction_keeps_original_instruction_and_constraints() {
        let original = payload();
        let amended = original.with_correction("- lengthen to at least 1000 words");
        assert!(amended.user_instruction.starts_with("user"));
        assert!(amended.user_instruction.contains("lengthen to at least 1000 words"));
        assert_eq!(amended.constraints, original.constraints);
        assert_eq!(amended.system_instruction, original.system_instruction);

        let pinned = PromptPayload {
            model: Some("ft:gpt-4o:aitor".into()),
            ..original
        };
        assert_eq!(pinned.with_correction("x").model, pinned.model);
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = payload();
        let b = payload();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 32);
        assert_ne!(a.fingerprint(), a.with_correction("x").fingerprint());
    }
}
