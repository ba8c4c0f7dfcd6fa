use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Kinds of content the engine knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ContentType {
    #[serde(rename = "blog.general_interest")]
    GeneralInterestBlog,
    #[serde(rename = "blog.case_study")]
    CaseStudyBlog,
    #[serde(rename = "linkedin.post")]
    LinkedInPost,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::GeneralInterestBlog,
        ContentType::CaseStudyBlog,
        ContentType::LinkedInPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::GeneralInterestBlog => "blog.general_interest",
            ContentType::CaseStudyBlog => "blog.case_study",
            ContentType::LinkedInPost => "linkedin.post",
        }
    }

    pub fn is_blog(&self) -> bool {
        matches!(
            self,
            ContentType::GeneralInterestBlog | ContentType::CaseStudyBlog
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| GenerationError::UnknownContentType {
                content_type: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    Words,
    Characters,
}

impl LengthUnit {
    pub fn label(&self) -> &'static str {
        match self {
            LengthUnit::Words => "words",
            LengthUnit::Characters => "characters",
        }
    }
}

/// Inclusive target length range, e.g. 1000-1500 words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetLength {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub unit: LengthUnit,
}

impl TargetLength {
    pub fn words(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            unit: LengthUnit::Words,
        }
    }

    pub fn characters(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            unit: LengthUnit::Characters,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.max > 0 && self.min <= self.max
    }
}

impl fmt::Display for TargetLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} {}", self.min, self.max, self.unit.label())
    }
}

/// Post style for LinkedIn content; the subtype half of a strategy key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkedInStyle {
    #[default]
    Leadership,
    BehindTheScenes,
    Wins,
    CeoJourney,
    HotTakes,
}

impl LinkedInStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkedInStyle::Leadership => "leadership",
            LinkedInStyle::BehindTheScenes => "behind_the_scenes",
            LinkedInStyle::Wins => "wins",
            LinkedInStyle::CeoJourney => "ceo_journey",
            LinkedInStyle::HotTakes => "hot_takes",
        }
    }
}

/// Author whose voice a LinkedIn post imitates. `Default` writes in the
/// strategy's own voice with the configured model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkedInAuthor {
    #[serde(alias = "Pablo")]
    Pablo,
    #[serde(alias = "Aitor")]
    Aitor,
    #[default]
    #[serde(alias = "Default")]
    Default,
}

impl LinkedInAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkedInAuthor::Pablo => "pablo",
            LinkedInAuthor::Aitor => "aitor",
            LinkedInAuthor::Default => "default",
        }
    }
}

/// Uploaded source material. Bytes travel base64-encoded so a request stays
/// plain JSON; decoding happens in the document ingestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceDocument {
    /// Declared MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    /// Original file name, used as the provenance label of extracted facts.
    #[serde(default)]
    pub name: Option<String>,
    /// Base64 (standard alphabet) document bytes.
    pub content_base64: String,
}

impl SourceDocument {
    pub fn from_bytes(mime_type: impl Into<String>, name: Option<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            name,
            content_base64: STANDARD.encode(bytes),
        }
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "document".to_string())
    }

    /// Upper bound of the decoded size, computed without decoding.
    pub fn estimated_size(&self) -> usize {
        self.content_base64.trim().len() / 4 * 3
    }
}

/// Caller overrides for the system instruction. Every field is optional; the
/// resolved strategy fills whatever is left unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SystemComponents {
    pub role_description: Option<String>,
    pub content_objective: Option<String>,
    pub tone: Option<String>,
    pub style_guidance: Option<String>,
    pub structure_description: Option<String>,
    pub format_guide: Option<String>,
    pub seo_guidelines: Option<String>,
    pub limitations: Option<String>,
    pub engagement_tips: Option<String>,
    pub additional_instructions: Option<String>,
}

impl SystemComponents {
    /// Field-by-field merge: a non-blank override wins, otherwise the default
    /// value for that field is kept.
    pub fn merged_onto(&self, defaults: &SystemComponents) -> SystemComponents {
        SystemComponents {
            role_description: pick(&self.role_description, &defaults.role_description),
            content_objective: pick(&self.content_objective, &defaults.content_objective),
            tone: pick(&self.tone, &defaults.tone),
            style_guidance: pick(&self.style_guidance, &defaults.style_guidance),
            structure_description: pick(
                &self.structure_description,
                &defaults.structure_description,
            ),
            format_guide: pick(&self.format_guide, &defaults.format_guide),
            seo_guidelines: pick(&self.seo_guidelines, &defaults.seo_guidelines),
            limitations: pick(&self.limitations, &defaults.limitations),
            engagement_tips: pick(&self.engagement_tips, &defaults.engagement_tips),
            additional_instructions: pick(
                &self.additional_instructions,
                &defaults.additional_instructions,
            ),
        }
    }
}

fn pick(value: &Option<String>, fallback: &Option<String>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback.clone(),
    }
}

/// One call of the engine's single public operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    /// `blog.general_interest`, `blog.case_study` or `linkedin.post`.
    pub content_type: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub primary_keywords: Vec<String>,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub target_length: Option<TargetLength>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub call_to_action: Option<String>,
    /// Topics or angles the content must stay away from.
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub additional_comments: Option<String>,
    /// Output language tag, `es` when absent.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub linkedin_style: Option<LinkedInStyle>,
    /// LinkedIn only: imitate this author's voice and use their model.
    #[serde(default)]
    pub author: Option<LinkedInAuthor>,
    #[serde(default)]
    pub reference_urls: Vec<String>,
    #[serde(default)]
    pub source_document: Option<SourceDocument>,
    #[serde(default)]
    pub system_components: Option<SystemComponents>,
}

impl GenerationRequest {
    pub fn new(content_type: ContentType, topic: impl Into<String>) -> Self {
        Self {
            content_type: content_type.as_str().to_string(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// All keywords, primary first.
    pub fn keywords(&self) -> Vec<String> {
        self.primary_keywords
            .iter()
            .chain(self.secondary_keywords.iter())
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect()
    }

    /// The call to action when one was supplied and is not blank.
    pub fn cta(&self) -> Option<&str> {
        self.call_to_action
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn language(&self) -> &str {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("es")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parses_wire_names() {
        assert_eq!(
            "blog.case_study".parse::<ContentType>().unwrap(),
            ContentType::CaseStudyBlog
        );
        assert_eq!(
            " LinkedIn.Post ".parse::<ContentType>().unwrap(),
            ContentType::LinkedInPost
        );
        let err = "newsletter".parse::<ContentType>().unwrap_err();
        assert_eq!(err.code(), "unknown_content_type");
    }

    #[test]
    fn test_merge_keeps_defaults_for_unset_fields() {
        let defaults = SystemComponents {
            role_description: Some("blog writer".into()),
            content_objective: Some("inform".into()),
            tone: Some("friendly".into()),
            ..Default::default()
        };
        let overrides = SystemComponents {
            tone: Some("formal".into()),
            role_description: Some("   ".into()),
            ..Default::default()
        };

        let merged = overrides.merged_onto(&defaults);
        assert_eq!(merged.tone.as_deref(), Some("formal"));
        assert_eq!(merged.role_description.as_deref(), Some("blog writer"));
        assert_eq!(merged.content_objective.as_deref(), Some("inform"));
        assert_eq!(merged.format_guide, None);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{
                "content_type": "blog.general_interest",
                "topic": "IA en marketing",
                "target_length": {"min": 1000, "max": 1500},
                "call_to_action": "Contactar para asesoría"
            }"#,
        )
        .unwrap();

        assert_eq!(request.target_length, Some(TargetLength::words(1000, 1500)));
        assert_eq!(request.cta(), Some("Contactar para asesoría"));
        assert_eq!(request.language(), "es");
        assert!(request.reference_urls.is_empty());
        assert_eq!(request.author, None);
    }

    #[test]
    fn test_author_accepts_display_names() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"content_type": "linkedin.post", "topic": "Remote work", "author": "Pablo"}"#,
        )
        .unwrap();
        assert_eq!(request.author, Some(LinkedInAuthor::Pablo));

        let author: LinkedInAuthor = serde_json::from_str(r#""aitor""#).unwrap();
        assert_eq!(author.as_str(), "aitor");
    }

    #[test]
    fn test_source_document_round_trips_bytes() {
        let doc = SourceDocument::from_bytes("text/plain", None, b"hello world");
        assert_eq!(doc.label(), "document");
        assert_eq!(STANDARD.decode(&doc.content_base64).unwrap(), b"hello world");
        assert!(doc.estimated_size() >= 11);
    }
}
