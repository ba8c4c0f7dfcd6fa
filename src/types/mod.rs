pub mod prompt;
pub mod request;
pub mod result;

pub use prompt::{LengthBounds, PromptConstraints, PromptPayload};
pub use request::{
    ContentType, GenerationRequest, LengthUnit, LinkedInAuthor, LinkedInStyle, SourceDocument, SystemComponents,
    TargetLength,
};
pub use result::{GenerationResult, ResultWarning, ValidationStatus};
