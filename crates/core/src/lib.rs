pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod export;
pub mod extractor;
pub mod genai;
pub mod ingest;
pub mod models;
pub mod query;
pub mod store;

pub use chunking::{chunk_text, ChunkingConfig};
pub use embeddings::{embed_chunks, Embedder, LocalNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ExportError, GenAiError, IngestError, QueryError, StoreError};
pub use export::{ExportReport, ReportExporter, HEADER};
pub use extractor::{
    allowed_file, FallbackExtractor, LopdfExtractor, PdfExtractExtractor, PdfExtractor,
};
pub use genai::{GeminiClient, GeminiConfig, TextGenerator};
pub use ingest::{
    delete_document, digest_file, discover_pdf_files, DeletionOutcome, IngestPipeline,
    IngestionOutcome, IngestionReport, SkippedPdf,
};
pub use models::{
    DocumentRecord, EmbeddedChunk, ExportRow, MemberRecord, PipelineOptions, DEFAULT_CHUNK_SIZE,
    DEFAULT_PROMPT_TEMPLATE,
};
pub use query::{saved_answer, QueryAnswerer};
pub use store::{DocumentStore, Durability, JsonFileStore, ResponseStore};
