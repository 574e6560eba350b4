pub mod chunking;
pub mod classifier;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod retriever;

pub use chunking::{
    chunk_document, chunk_documents, normalize_whitespace, split_text, ChunkingConfig, TextChunk,
};
pub use classifier::{
    ChatCompletionClassifier, ClassifierConfig, ComplianceChecker,
};
pub use embeddings::{Embedder, HashedNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{extract_text, extract_text_from_bytes, DocumentFormat};
pub use index::{open_or_build, EmbeddingIndex, OpenReport};
pub use loader::{
    discover_document_files, load_documents_from_bytes, load_documents_from_dir, LoadReport,
    NamedBytes, SkippedFile,
};
pub use models::{
    CheckType, ClassifierScheme, ComplianceStanding, ComplianceVerdict, DistanceMetric,
    DocumentFingerprint, IndexedChunk, RegulationObject, RetrievalOptions, RetrievalResult,
    ScoredSegment, SourceDocument,
};
pub use pipeline::{CertPipeline, CheckOutcome};
pub use rerank::{HttpCrossEncoderReranker, Reranker, TermOverlapReranker};
pub use retriever::RetrievalContext;
