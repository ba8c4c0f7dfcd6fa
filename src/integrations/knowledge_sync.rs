use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Config, GroundingConfig};
use crate::errors::GenerationError;
use crate::generator::grounding::GroundingSource;
use crate::integrations::local_docs::LocalDocsProcessor;
use crate::types::{GenerationRequest, ResultWarning};

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->").unwrap()
});
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|div|br|h[1-6]|li|ul|ol|tr|table|section|article|header|footer|blockquote)\b[^>]*>")
        .unwrap()
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static INLINE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n[\s\n]*").unwrap());

/// Fetches the readable text behind a reference URL.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP GET, HTML stripped, truncated to the configured length.
pub struct HttpReferenceFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpReferenceFetcher {
    pub fn new(config: &GroundingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.url_fetch_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for reference URLs")?;
        Ok(Self {
            client,
            max_chars: config.max_url_chars,
        })
    }
}

#[async_trait]
impl ReferenceFetcher for HttpReferenceFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("Unexpected status from {}", url))?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|v| v.contains("html"));
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        let text = if is_html { html_to_text(&body) } else { body };
        Ok(truncate_chars(&text, self.max_chars))
    }
}

/// Readable text of an HTML page, paragraph breaks kept.
pub fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let with_breaks = BLOCK_TAG.replace_all(&without_code, "\n\n");
    let bare = ANY_TAG.replace_all(&with_breaks, "");
    let decoded = bare
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    let lines = decoded
        .lines()
        .map(|line| INLINE_WHITESPACE.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_RUNS.replace_all(lines.trim(), "\n\n").into_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Reference text plus the URLs that could not be used.
#[derive(Debug, Default)]
pub struct CollectedReferences {
    pub sources: Vec<GroundingSource>,
    pub warnings: Vec<ResultWarning>,
}

/// Gathers every grounding source of a request: the uploaded document first,
/// then the fetched reference pages in request order.
#[derive(Clone)]
pub struct KnowledgeSyncer {
    ingestor: LocalDocsProcessor,
    fetcher: Option<Arc<dyn ReferenceFetcher>>,
}

impl KnowledgeSyncer {
    /// A syncer that fetches through `fetcher`, or only cites URLs when it is `None`.
    pub fn new(config: &Config, fetcher: Option<Arc<dyn ReferenceFetcher>>) -> Self {
        Self {
            ingestor: LocalDocsProcessor::new(&config.ingest),
            fetcher,
        }
    }

    /// The HTTP fetcher when `grounding.fetch_reference_urls` is on.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher: Option<Arc<dyn ReferenceFetcher>> = if config.grounding.fetch_reference_urls {
            Some(Arc::new(HttpReferenceFetcher::new(&config.grounding)?))
        } else {
            None
        };
        Ok(Self::new(config, fetcher))
    }

    pub fn fetches_references(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Ingest the request's document, if it has one. Parsing runs on the
    /// blocking pool so a large PDF never stalls the async workers.
    pub async fn ingest_document(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GroundingSource>, GenerationError> {
        let Some(document) = request.source_document.clone() else {
            return Ok(None);
        };
        let ingestor = self.ingestor.clone();
        let ingested = tokio::task::spawn_blocking(move || ingestor.ingest(&document))
            .await
            .map_err(|e| GenerationError::unreadable(format!("document ingestion aborted: {e}")))??;
        if ingested.is_blank() {
            debug!(document = %ingested.label, "document has no extractable text");
        }
        Ok(Some(ingested.into_source()))
    }

    /// Fetch every reference URL concurrently. Failures never abort the run;
    /// they become warnings and the URL stays a citation only.
    pub async fn collect_references(&self, urls: &[String]) -> CollectedReferences {
        let Some(fetcher) = &self.fetcher else {
            return CollectedReferences::default();
        };

        let urls = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect::<Vec<_>>();
        let fetched = join_all(urls.iter().map(|url| fetcher.fetch(url))).await;

        let mut collected = CollectedReferences::default();
        for (url, outcome) in urls.into_iter().zip(fetched) {
            match outcome {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(url, chars = text.len(), "reference fetched");
                    collected.sources.push(GroundingSource {
                        label: url.to_string(),
                        text,
                        pages: Vec::new(),
                    });
                }
                Ok(_) => {
                    warn!(url, "reference page has no readable text");
                    collected.warnings.push(ResultWarning::ReferenceFetchFailed {
                        url: url.to_string(),
                        reason: "no readable text".to_string(),
                    });
                }
                Err(e) => {
                    warn!(url, error = %format!("{e:#}"), "failed to fetch reference");
                    collected.warnings.push(ResultWarning::ReferenceFetchFailed {
                        url: url.to_string(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, SourceDocument};

    struct StaticFetcher;

    #[async_trait]
    impl ReferenceFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            if url.contains("broken") {
                anyhow::bail!("connection refused");
            }
            Ok(format!("Content of {url} reports 25% growth."))
        }
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><style>p { color: red; }</style><script>var x = 1;</script></head>
            <body><h1>Acme &amp; Co</h1><p>Cut costs by   30%.</p><!-- hidden --><p>Second<br>line</p></body></html>"#;
        assert_eq!(
            html_to_text(html),
            "Acme & Co\n\nCut costs by 30%.\n\nSecond\n\nline"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("añadir más", 4), "añad");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn test_failed_urls_become_warnings() {
        let syncer = KnowledgeSyncer::new(&Config::default(), Some(Arc::new(StaticFetcher)));
        let collected = syncer
            .collect_references(&[
                "https://ok.example/a".to_string(),
                "https://broken.example/b".to_string(),
                " ".to_string(),
            ])
            .await;

        assert_eq!(collected.sources.len(), 1);
        assert_eq!(collected.sources[0].label, "https://ok.example/a");
        assert!(matches!(
            &collected.warnings[..],
            [ResultWarning::ReferenceFetchFailed { url, .. }] if url == "https://broken.example/b"
        ));
    }

    #[tokio::test]
    async fn test_without_fetcher_nothing_is_fetched() {
        let syncer = KnowledgeSyncer::new(&Config::default(), None);
        let collected = syncer
            .collect_references(&["https://ok.example".to_string()])
            .await;
        assert!(collected.sources.is_empty());
        assert!(collected.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_document_becomes_first_source() {
        let syncer = KnowledgeSyncer::new(&Config::default(), None);
        let mut request = GenerationRequest::new(ContentType::CaseStudyBlog, "Acme");
        assert_eq!(syncer.ingest_document(&request).await.unwrap(), None);

        request.source_document = Some(SourceDocument::from_bytes(
            "text/markdown",
            Some("acme.md".into()),
            b"# Acme\n\nAcme cut costs by 30%.",
        ));
        let source = syncer.ingest_document(&request).await.unwrap().unwrap();
        assert_eq!(source.label, "acme.md");
        assert!(source.text.contains("30%"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_ingestion_errors_cross_the_blocking_pool() {
        let mut config = Config::default();
        config.ingest.max_document_bytes = 64;
        let syncer = KnowledgeSyncer::new(&config, None);
        let mut request = GenerationRequest::new(ContentType::CaseStudyBlog, "Acme");

        request.source_document = Some(SourceDocument::from_bytes(
            "application/pdf",
            Some("broken.pdf".into()),
            b"not a pdf",
        ));
        let err = syncer.ingest_document(&request).await.unwrap_err();
        assert_eq!(err.code(), "document_unreadable");

        request.source_document = Some(SourceDocument::from_bytes(
            "text/plain",
            None,
            &[b'a'; 256],
        ));
        let err = syncer.ingest_document(&request).await.unwrap_err();
        assert_eq!(err.code(), "document_too_large");
    }
}
