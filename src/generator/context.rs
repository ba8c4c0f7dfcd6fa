use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::GenerationError;
use crate::types::{ContentType, ResultWarning};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Collection,
    Composition,
    Generation,
    Validation,
    Regeneration,
    PostProcessing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Collection => "collection",
            Stage::Composition => "composition",
            Stage::Generation => "generation",
            Stage::Validation => "validation",
            Stage::Regeneration => "regeneration",
            Stage::PostProcessing => "post_processing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared between a caller and a running request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// State of one generation run. Created per request and dropped with it.
#[derive(Debug)]
pub struct GenerationContext {
    /// Correlates every log line of the run.
    pub request_id: Uuid,
    pub content_type: ContentType,
    pub started_at: DateTime<Utc>,
    /// Provider calls made so far, retries included.
    pub provider_calls: u32,
    pub warnings: Vec<ResultWarning>,
    cancel: CancellationToken,
}

impl GenerationContext {
    pub fn new(content_type: ContentType, cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            content_type,
            started_at: Utc::now(),
            provider_calls: 0,
            warnings: Vec::new(),
            cancel,
        }
    }

    /// Fail with `Cancelled` if the caller gave up before `stage`.
    pub fn checkpoint(&self, stage: Stage) -> Result<(), GenerationError> {
        if self.cancel.is_cancelled() {
            info!(request_id = %self.request_id, %stage, "generation cancelled");
            return Err(GenerationError::Cancelled { stage });
        }
        Ok(())
    }

    pub fn warn(&mut self, warning: ResultWarning) {
        self.warnings.push(warning);
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
