use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::{embed_chunks, Embedder};
use crate::extractor::{allowed_file, PdfExtractor};
use crate::models::{DocumentRecord, PipelineOptions};
use crate::store::{DocumentStore, ResponseStore};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path, allowed_extensions: &BTreeSet<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let accepted = entry
            .file_name()
            .to_str()
            .is_some_and(|name| allowed_file(name, allowed_extensions));

        if accepted {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub document_id: String,
    pub raw_chunks: usize,
    pub stored_chunks: usize,
    /// False when no chunk survived embedding and the store was left alone.
    pub stored: bool,
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub ingested: Vec<IngestionOutcome>,
    pub skipped_files: Vec<SkippedPdf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletionOutcome {
    pub document_removed: bool,
    pub response_removed: bool,
    pub file_removed: bool,
}

/// Extract, chunk and embed PDFs into a [`DocumentStore`].
pub struct IngestPipeline<X, E> {
    extractor: X,
    embedder: E,
    options: PipelineOptions,
}

impl<X, E> IngestPipeline<X, E>
where
    X: PdfExtractor,
    E: Embedder,
{
    pub fn new(extractor: X, embedder: E, options: PipelineOptions) -> Self {
        Self {
            extractor,
            embedder,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ingests the PDF at `path` under `document_id`, replacing any earlier
    /// record with that id.
    pub fn ingest_pdf(
        &self,
        documents: &mut DocumentStore,
        path: &Path,
        document_id: &str,
    ) -> Result<IngestionOutcome, IngestError> {
        let text = self.extractor.extract_text(path)?;
        let raw_chunks = chunk_text(&text, ChunkingConfig::from(&self.options))?;
        let raw_count = raw_chunks.len();
        let chunks = embed_chunks(&self.embedder, raw_chunks);

        if chunks.is_empty() {
            warn!(document_id, raw_chunks = raw_count, "no chunk was embedded; document not stored");
            return Ok(IngestionOutcome {
                document_id: document_id.to_string(),
                raw_chunks: raw_count,
                stored_chunks: 0,
                stored: false,
            });
        }

        let stored_chunks = chunks.len();
        let record = DocumentRecord {
            chunks,
            checksum: Some(digest_file(path)?),
            ingested_at: Some(Utc::now()),
        };
        documents.put(document_id, record)?;

        info!(
            document_id,
            raw_chunks = raw_count,
            stored_chunks,
            "document ingested"
        );

        Ok(IngestionOutcome {
            document_id: document_id.to_string(),
            raw_chunks: raw_count,
            stored_chunks,
            stored: true,
        })
    }

    /// Validates the file name, copies `source` into `uploads_dir` and
    /// ingests it keyed by that file name.
    pub fn ingest_upload(
        &self,
        documents: &mut DocumentStore,
        source: &Path,
        uploads_dir: &Path,
    ) -> Result<IngestionOutcome, IngestError> {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(source.display().to_string()))?;

        if !allowed_file(name, &self.options.allowed_extensions) {
            return Err(IngestError::NotAllowed(name.to_string()));
        }

        fs::create_dir_all(uploads_dir)?;
        let target = uploads_dir.join(name);
        if !same_file(source, &target)? {
            fs::copy(source, &target)?;
        }

        self.ingest_pdf(documents, &target, name)
    }

    /// Uploads every allowed file below `folder`, recording failures instead
    /// of stopping at the first one. Documents are keyed by file name, so a
    /// later file sharing a name with one already ingested is skipped.
    pub fn ingest_folder_best_effort(
        &self,
        documents: &mut DocumentStore,
        folder: &Path,
        uploads_dir: &Path,
    ) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder, &self.options.allowed_extensions);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut ingested = Vec::new();
        let mut skipped_files = Vec::new();
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();

        for path in files {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                if let Some(first) = seen.get(name) {
                    warn!(
                        path = %path.display(),
                        first = %first.display(),
                        "duplicate document id in folder; skipping"
                    );
                    skipped_files.push(SkippedPdf {
                        reason: format!(
                            "duplicate document id {name}: already ingested from {}",
                            first.display()
                        ),
                        path,
                    });
                    continue;
                }
                seen.insert(name.to_string(), path.clone());
            }

            match self.ingest_upload(documents, &path, uploads_dir) {
                Ok(outcome) => ingested.push(outcome),
                Err(error) => skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(IngestionReport {
            ingested,
            skipped_files,
        })
    }
}

fn same_file(left: &Path, right: &Path) -> Result<bool, IngestError> {
    if !right.exists() {
        return Ok(false);
    }
    Ok(fs::canonicalize(left)? == fs::canonicalize(right)?)
}

/// Removes a document, its saved answer and its uploaded file.
pub fn delete_document(
    documents: &mut DocumentStore,
    responses: &mut ResponseStore,
    uploads_dir: &Path,
    document_id: &str,
) -> Result<DeletionOutcome, IngestError> {
    let document_removed = documents.remove(document_id)?.is_some();
    let response_removed = responses.remove(document_id)?.is_some();

    let file_removed = match Path::new(document_id).file_name() {
        Some(name) => match fs::remove_file(uploads_dir.join(name)) {
            Ok(()) => true,
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(error) => return Err(error.into()),
        },
        None => false,
    };

    info!(document_id, document_removed, response_removed, file_removed, "document deleted");

    Ok(DeletionOutcome {
        document_removed,
        response_removed,
        file_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenAiError;
    use crate::models::EmbeddedChunk;
    use crate::store::{Durability, JsonFileStore};
    use tempfile::tempdir;

    struct StaticExtractor(&'static str);

    impl PdfExtractor for StaticExtractor {
        fn name(&self) -> &str {
            "static"
        }

        fn extract_text(&self, _path: &Path) -> Result<String, IngestError> {
            Ok(self.0.to_string())
        }
    }

    struct RejectingEmbedder(&'static [&'static str]);

    impl Embedder for RejectingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
            if self.0.iter().any(|rejected| *rejected == text) {
                return Err(GenAiError::MissingApiKey);
            }
            Ok(vec![1.0, 2.0])
        }
    }

    fn pipeline(
        text: &'static str,
        rejected: &'static [&'static str],
    ) -> IngestPipeline<StaticExtractor, RejectingEmbedder> {
        let options = PipelineOptions {
            chunk_size: 4,
            ..PipelineOptions::default()
        };
        IngestPipeline::new(StaticExtractor(text), RejectingEmbedder(rejected), options)
    }

    #[test]
    fn ingest_stores_surviving_chunks_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("acta.pdf");
        fs::write(&pdf, b"%PDF-1.4")?;
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("embeddings_store.json"), Durability::Overwrite)?;

        let outcome = pipeline("aaaabbbbcc", &["bbbb"]).ingest_pdf(&mut documents, &pdf, "acta.pdf")?;

        assert_eq!(outcome.raw_chunks, 3);
        assert_eq!(outcome.stored_chunks, 2);
        assert!(outcome.stored);

        let record = documents.get("acta.pdf").ok_or("document missing")?;
        assert_eq!(record.context(), "aaaa\ncc");
        assert_eq!(record.checksum.as_deref(), Some(digest_file(&pdf)?.as_str()));
        Ok(())
    }

    #[test]
    fn fully_failed_embedding_stores_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("acta.pdf");
        fs::write(&pdf, b"%PDF-1.4")?;
        let store_path = dir.path().join("embeddings_store.json");
        let mut documents: DocumentStore = JsonFileStore::open(&store_path, Durability::Overwrite)?;

        let outcome = pipeline("abcd", &["abcd"]).ingest_pdf(&mut documents, &pdf, "acta.pdf")?;

        assert!(!outcome.stored);
        assert!(documents.is_empty());
        assert!(!store_path.exists());
        Ok(())
    }

    #[test]
    fn upload_rejects_disallowed_extension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"text")?;
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("store.json"), Durability::Overwrite)?;

        let result = pipeline("abc", &[]).ingest_upload(&mut documents, &source, &dir.path().join("uploads"));
        assert!(matches!(result, Err(IngestError::NotAllowed(name)) if name == "notes.txt"));
        Ok(())
    }

    #[test]
    fn upload_copies_file_and_keys_by_name() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("Acta.PDF");
        fs::write(&source, b"%PDF-1.4 upload")?;
        let uploads = dir.path().join("uploads");
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("store.json"), Durability::Overwrite)?;

        let outcome = pipeline("abcdef", &[]).ingest_upload(&mut documents, &source, &uploads)?;

        assert_eq!(outcome.document_id, "Acta.PDF");
        assert_eq!(fs::read(uploads.join("Acta.PDF"))?, b"%PDF-1.4 upload");

        // re-uploading the stored copy must not truncate it
        pipeline("abcdef", &[]).ingest_upload(&mut documents, &uploads.join("Acta.PDF"), &uploads)?;
        assert_eq!(fs::read(uploads.join("Acta.PDF"))?, b"%PDF-1.4 upload");
        Ok(())
    }

    #[test]
    fn folder_ingestion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("store.json"), Durability::Overwrite)?;

        let result = pipeline("abc", &[]).ingest_folder_best_effort(
            &mut documents,
            dir.path(),
            &dir.path().join("uploads"),
        );
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    /// Reads the file as its own text; a file containing "broken" fails.
    struct FileTextExtractor;

    impl PdfExtractor for FileTextExtractor {
        fn name(&self) -> &str {
            "file-text"
        }

        fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
            let text = fs::read_to_string(path)?;
            if text == "broken" {
                return Err(IngestError::PdfParse(format!("{} is broken", path.display())));
            }
            Ok(text)
        }
    }

    fn folder_pipeline() -> IngestPipeline<FileTextExtractor, RejectingEmbedder> {
        IngestPipeline::new(FileTextExtractor, RejectingEmbedder(&[]), PipelineOptions::default())
    }

    #[test]
    fn folder_ingestion_skips_failures_and_keeps_going() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let inbox = dir.path().join("inbox");
        fs::create_dir(&inbox)?;
        fs::write(inbox.join("bad.pdf"), "broken")?;
        fs::write(inbox.join("good.pdf"), "comité técnico")?;
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("store.json"), Durability::Overwrite)?;

        let report =
            folder_pipeline().ingest_folder_best_effort(&mut documents, &inbox, &dir.path().join("uploads"))?;

        assert_eq!(report.skipped_files.len(), 1);
        let skipped = &report.skipped_files[0];
        assert_eq!(skipped.path, inbox.join("bad.pdf"));
        assert!(skipped.reason.contains("broken"), "reason was {}", skipped.reason);

        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.ingested[0].document_id, "good.pdf");
        assert_eq!(documents.ids(), vec!["good.pdf"]);
        assert_eq!(
            documents.get("good.pdf").map(DocumentRecord::context).as_deref(),
            Some("comité técnico")
        );
        Ok(())
    }

    #[test]
    fn folder_ingestion_skips_repeated_file_names() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let inbox = dir.path().join("inbox");
        fs::create_dir_all(inbox.join("x"))?;
        fs::create_dir_all(inbox.join("y"))?;
        fs::write(inbox.join("x").join("acta.pdf"), "first")?;
        fs::write(inbox.join("y").join("acta.pdf"), "second")?;
        let uploads = dir.path().join("uploads");
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("store.json"), Durability::Overwrite)?;

        let report = folder_pipeline().ingest_folder_best_effort(&mut documents, &inbox, &uploads)?;

        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].path, inbox.join("y").join("acta.pdf"));
        assert!(report.skipped_files[0].reason.contains("duplicate document id acta.pdf"));

        assert_eq!(
            documents.get("acta.pdf").map(DocumentRecord::context).as_deref(),
            Some("first")
        );
        assert_eq!(fs::read_to_string(uploads.join("acta.pdf"))?, "first");
        Ok(())
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4")?;
        fs::write(nested.join("b.PDF"), b"%PDF-1.4")?;
        fs::write(nested.join("c.txt"), b"plain")?;

        let files = discover_pdf_files(dir.path(), &PipelineOptions::default().allowed_extensions);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn delete_removes_document_response_and_file_only() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let uploads = dir.path().join("uploads");
        fs::create_dir(&uploads)?;
        fs::write(uploads.join("a.pdf"), b"a")?;
        fs::write(uploads.join("b.pdf"), b"b")?;

        let documents_path = dir.path().join("embeddings_store.json");
        let responses_path = dir.path().join("responses_store.json");
        let mut documents: DocumentStore = JsonFileStore::open(&documents_path, Durability::Overwrite)?;
        let mut responses: ResponseStore = JsonFileStore::open(&responses_path, Durability::Overwrite)?;

        for id in ["a.pdf", "b.pdf"] {
            let record = DocumentRecord::new(vec![EmbeddedChunk {
                text: format!("text of {id}"),
                embedding: vec![0.1, 0.2],
            }]);
            documents.put(id, record)?;
            responses.put(id, format!("answer for {id}"))?;
        }

        let survivor_before = serde_json::to_vec(&documents.get("b.pdf"))?;
        let outcome = delete_document(&mut documents, &mut responses, &uploads, "a.pdf")?;

        assert_eq!(
            outcome,
            DeletionOutcome {
                document_removed: true,
                response_removed: true,
                file_removed: true,
            }
        );

        let documents: DocumentStore = JsonFileStore::open(&documents_path, Durability::Overwrite)?;
        let responses: ResponseStore = JsonFileStore::open(&responses_path, Durability::Overwrite)?;
        assert_eq!(documents.ids(), vec!["b.pdf"]);
        assert_eq!(responses.ids(), vec!["b.pdf"]);
        assert_eq!(serde_json::to_vec(&documents.get("b.pdf"))?, survivor_before);
        assert_eq!(responses.get("b.pdf").map(String::as_str), Some("answer for b.pdf"));
        assert!(!uploads.join("a.pdf").exists());
        assert!(uploads.join("b.pdf").exists());
        Ok(())
    }

    #[test]
    fn deleting_unknown_document_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut documents: DocumentStore =
            JsonFileStore::open(dir.path().join("d.json"), Durability::Overwrite)?;
        let mut responses: ResponseStore =
            JsonFileStore::open(dir.path().join("r.json"), Durability::Overwrite)?;

        let outcome = delete_document(&mut documents, &mut responses, dir.path(), "ghost.pdf")?;
        assert_eq!(outcome, DeletionOutcome::default());
        Ok(())
    }
}
