pub mod knowledge_sync;
pub mod local_docs;

pub use knowledge_sync::{CollectedReferences, HttpReferenceFetcher, KnowledgeSyncer, ReferenceFetcher};
pub use local_docs::{DocFileType, IngestedDocument, LocalDocsProcessor};
