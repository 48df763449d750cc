use crate::error::IngestError;
use lopdf::Document;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor {
    fn name(&self) -> &str;

    fn extract_text(&self, path: &Path) -> Result<String, IngestError>;
}

/// Page-by-page extraction through `lopdf`.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        for page_no in document.get_pages().into_keys() {
            let page_text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            text.push_str(&page_text);
        }

        Ok(text)
    }
}

/// Whole-document extraction through `pdf-extract`, which copes with more
/// font encodings than `lopdf` but panics on some malformed inputs.
#[derive(Debug, Default)]
pub struct PdfExtractExtractor;

impl PdfExtractor for PdfExtractExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));

        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(error)) => Err(IngestError::PdfParse(error.to_string())),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|value| value.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(IngestError::PdfParse(format!("pdf-extract panicked: {message}")))
            }
        }
    }
}

/// Ordered list of extractors, each tried once until one succeeds.
pub struct FallbackExtractor {
    extractors: Vec<Box<dyn PdfExtractor>>,
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(LopdfExtractor),
            Box::new(PdfExtractExtractor),
        ])
    }
}

impl FallbackExtractor {
    pub fn new(extractors: Vec<Box<dyn PdfExtractor>>) -> Self {
        Self { extractors }
    }
}

impl PdfExtractor for FallbackExtractor {
    fn name(&self) -> &str {
        "fallback"
    }

    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let mut failures = Vec::new();

        for extractor in &self.extractors {
            match extractor.extract_text(path) {
                Ok(text) => {
                    debug!(
                        extractor = extractor.name(),
                        path = %path.display(),
                        chars = text.chars().count(),
                        "extracted pdf text"
                    );
                    return Ok(text);
                }
                Err(error) => {
                    warn!(
                        extractor = extractor.name(),
                        path = %path.display(),
                        %error,
                        "pdf extractor failed"
                    );
                    failures.push(format!("{}: {error}", extractor.name()));
                }
            }
        }

        Err(IngestError::ExtractionFailed {
            path: path.to_path_buf(),
            failures,
        })
    }
}

/// Accepts `name` when it has an extension whose lower-cased form is listed.
pub fn allowed_file(name: &str, allowed_extensions: &BTreeSet<String>) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, extension)| allowed_extensions.contains(&extension.to_lowercase()))
}
