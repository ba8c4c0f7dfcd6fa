use std::path::Path;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::errors::GenerationError;
use crate::generator::grounding::{GroundingSource, PageSpan};
use crate::types::SourceDocument;

static INLINE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Supported documentation file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocFileType {
    Pdf,
    Markdown,
    Text,
}

impl DocFileType {
    /// Map a declared MIME type (parameters such as `charset` are ignored).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Some(DocFileType::Pdf),
            "text/markdown" | "text/x-markdown" => Some(DocFileType::Markdown),
            "text/plain" => Some(DocFileType::Text),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DocFileType::Pdf => "application/pdf",
            DocFileType::Markdown => "text/markdown",
            DocFileType::Text => "text/plain",
        }
    }
}

/// Plain text of an uploaded document with its page layout.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedDocument {
    pub label: String,
    pub file_type: DocFileType,
    pub text: String,
    pub pages: Vec<PageSpan>,
}

impl IngestedDocument {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn into_source(self) -> GroundingSource {
        GroundingSource {
            label: self.label,
            text: self.text,
            pages: self.pages,
        }
    }
}

/// Document ingestor: bytes plus declared MIME type in, normalised text out.
#[derive(Debug, Clone)]
pub struct LocalDocsProcessor {
    max_bytes: usize,
}

impl LocalDocsProcessor {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            max_bytes: config.max_document_bytes,
        }
    }

    /// Decode and ingest a document attached to a request.
    pub fn ingest(&self, document: &SourceDocument) -> Result<IngestedDocument, GenerationError> {
        let estimated = document.estimated_size();
        if estimated > self.max_bytes + 2 {
            return Err(GenerationError::DocumentTooLarge {
                size: estimated,
                limit: self.max_bytes,
            });
        }

        let bytes = STANDARD
            .decode(document.content_base64.trim())
            .map_err(|e| GenerationError::unreadable(format!("invalid base64 payload: {e}")))?;

        self.ingest_bytes(&bytes, &document.mime_type, &document.label())
    }

    pub fn ingest_bytes(
        &self,
        bytes: &[u8],
        mime: &str,
        label: &str,
    ) -> Result<IngestedDocument, GenerationError> {
        if bytes.len() > self.max_bytes {
            return Err(GenerationError::DocumentTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let file_type = DocFileType::from_mime(mime)
            .ok_or_else(|| GenerationError::unreadable(format!("unsupported MIME type: {mime}")))?;

        let raw_pages = match file_type {
            DocFileType::Pdf => Self::extract_pdf_text(bytes)?
                .split('\u{c}')
                .map(str::to_string)
                .collect::<Vec<_>>(),
            DocFileType::Markdown | DocFileType::Text => vec![Self::decode_text(bytes)?],
        };

        let (text, pages) = Self::assemble_pages(&raw_pages);
        info!(
            document = label,
            file_type = ?file_type,
            bytes = bytes.len(),
            pages = pages.len(),
            chars = text.len(),
            "ingested source document"
        );

        Ok(IngestedDocument {
            label: label.to_string(),
            file_type,
            text,
            pages,
        })
    }

    /// Extract text content from PDF bytes
    fn extract_pdf_text(bytes: &[u8]) -> Result<String, GenerationError> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(GenerationError::unreadable("missing %PDF- header"));
        }

        // The parser panics on some malformed cross-reference tables.
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(GenerationError::unreadable(format!(
                "failed to extract text from PDF: {e}"
            ))),
            Err(_) => Err(GenerationError::unreadable(
                "PDF parser aborted on corrupt input",
            )),
        }
    }

    fn decode_text(bytes: &[u8]) -> Result<String, GenerationError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| GenerationError::unreadable(format!("text is not valid UTF-8: {e}")))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    /// Normalise each page and join them with blank lines, recording spans.
    fn assemble_pages(raw_pages: &[String]) -> (String, Vec<PageSpan>) {
        let mut text = String::new();
        let mut pages = Vec::new();

        for (index, raw) in raw_pages.iter().enumerate() {
            let page = Self::normalize(raw);
            if page.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            let start = text.len();
            text.push_str(&page);
            pages.push(PageSpan {
                number: index + 1,
                start,
                end: text.len(),
            });
        }

        debug!(pages = pages.len(), "assembled document pages");
        (text, pages)
    }

    fn normalize(raw: &str) -> String {
        let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
        let lines = unified
            .lines()
            .map(|line| INLINE_WHITESPACE.replace_all(line.trim(), " ").into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        BLANK_RUNS.replace_all(lines.trim(), "\n\n").into_owned()
    }

    /// Guess the MIME type from a file extension, for CLI uploads.
    pub fn mime_for_path(file_path: &Path) -> Option<&'static str> {
        let extension = file_path.extension().and_then(|e| e.to_str())?;

        match extension.to_lowercase().as_str() {
            "pdf" => Some(DocFileType::Pdf.mime()),
            "md" | "markdown" => Some(DocFileType::Markdown.mime()),
            "txt" | "text" => Some(DocFileType::Text.mime()),
            _ => None,
        }
    }
}
