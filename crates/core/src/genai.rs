use crate::embeddings::Embedder;
use crate::error::GenAiError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";

const BACKEND: &str = "gemini";

pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenAiError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: Url,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    pub fn new(api_base: &str, api_key: Option<String>) -> Result<Self, GenAiError> {
        let mut base = api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            api_base: Url::parse(&base)?,
            api_key: api_key.and_then(non_blank),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            timeout: None,
        })
    }

    /// Reads `GOOGLE_API_KEY` and `GEMINI_API_BASE`; blank values count as unset.
    pub fn from_env() -> Result<Self, GenAiError> {
        let base = std::env::var("GEMINI_API_BASE")
            .ok()
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("GOOGLE_API_KEY").ok();
        Self::new(&base, api_key)
    }

    pub fn with_models(
        mut self,
        embedding_model: impl Into<String>,
        generation_model: impl Into<String>,
    ) -> Self {
        self.embedding_model = embedding_model.into();
        self.generation_model = generation_model.into();
        self
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'a str,
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Blocking client for the Gemini embedding and generation endpoints.
///
/// Calls are single attempts with no retry. The request timeout comes from
/// [`GeminiConfig::timeout`], which is unset by default so a slow call blocks
/// until the service answers.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GenAiError> {
        // the blocking client otherwise applies a 30 second default
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url, GenAiError> {
        let api_key = self.config.api_key.as_deref().ok_or(GenAiError::MissingApiKey)?;
        let mut url = self
            .config
            .api_base
            .join(&format!("{}:{method}", model_path(model)))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    fn post<B, R>(&self, url: Url, body: &B) -> Result<R, GenAiError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.client.post(url).json(body).send()?;
        let status = response.status();

        if !status.is_success() {
            let details = response.text().unwrap_or_default();
            return Err(GenAiError::BackendResponse {
                backend: BACKEND.to_string(),
                status: status.as_u16(),
                details,
            });
        }

        Ok(response.json()?)
    }
}

impl Embedder for GeminiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let url = self.endpoint(&self.config.embedding_model, "embedContent")?;
        let request = EmbedContentRequest {
            model: model_path(&self.config.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
            title: "Document Chunk",
        };

        let payload: EmbedContentResponse = self.post(url, &request)?;
        embedding_from_payload(payload)
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GenAiError> {
        let url = self.endpoint(&self.config.generation_model, "generateContent")?;
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };

        let payload: GenerateContentResponse = self.post(url, &request)?;
        text_from_payload(payload)
    }
}

fn embedding_from_payload(payload: EmbedContentResponse) -> Result<Vec<f32>, GenAiError> {
    match payload.embedding {
        Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
        _ => Err(GenAiError::Payload {
            backend: BACKEND.to_string(),
            details: "response carried no embedding values".to_string(),
        }),
    }
}

fn text_from_payload(payload: GenerateContentResponse) -> Result<String, GenAiError> {
    let parts = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let texts: Vec<String> = parts.into_iter().filter_map(|part| part.text).collect();
    if texts.is_empty() {
        return Err(GenAiError::Payload {
            backend: BACKEND.to_string(),
            details: "response carried no candidate text".to_string(),
        });
    }

    Ok(texts.concat())
}
