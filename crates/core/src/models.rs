use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeSet;

type ChunkPair = (String, Vec<f32>);

/// One chunk of document text with its embedding.
///
/// Persisted as a two-element `[text, embedding]` array so existing store
/// files stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChunkPair", into = "ChunkPair")]
pub struct EmbeddedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

impl From<ChunkPair> for EmbeddedChunk {
    fn from((text, embedding): ChunkPair) -> Self {
        Self { text, embedding }
    }
}

impl From<EmbeddedChunk> for ChunkPair {
    fn from(value: EmbeddedChunk) -> Self {
        (value.text, value.embedding)
    }
}

/// Stored form of an ingested document, keyed by its file name.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub chunks: Vec<EmbeddedChunk>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub ingested_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(chunks: Vec<EmbeddedChunk>) -> Self {
        Self {
            chunks,
            checksum: None,
            ingested_at: None,
        }
    }

    /// Chunk texts joined by newlines, in stored order.
    pub fn context(&self) -> String {
        self.chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A committee member as described by the generation service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberRecord {
    pub name: Option<String>,
    pub company_role: Option<String>,
    pub committee_role: Option<String>,
}

/// Flattened export line: one member of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub document: String,
    pub member: String,
    pub company_role: String,
    pub committee_role: String,
}

impl ExportRow {
    pub fn from_member(document: &str, member: &MemberRecord) -> Self {
        let field = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            document: document.to_string(),
            member: field(&member.name),
            company_role: field(&member.company_role),
            committee_role: field(&member.committee_role),
        }
    }
}

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"En base a las resoluciones o el apartado donde se resuelve a los miembros del comité técnico, lista a cada miembro y su función tanto en la empresa como en el comité.
-Contexto: Se necesita extraer información de los miembros del comité técnico del proceso para alimentar las bases de datos.
-Instrucción: Extrae la información de todos los miembros del comité técnico y sus cargos tanto para con el comité como para con la empresa.
-Formato: Responde únicamente con un arreglo JSON de objetos con las claves "Miembro del comité", "Cargo en la empresa" y "Cargo en la comisión", en ese orden.
-Restricciones: Si no encuentras un dato en el texto omite ese campo, no te inventes nombres y no pongas el nombre de la persona que firmó el documento. Si no conoces el cargo en la comisión repite el cargo en la empresa, y si no conoces el cargo en la empresa repite el cargo en la comisión. Nunca uses "miembro" como cargo por sí solo."#;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub allowed_extensions: BTreeSet<String>,
    pub prompt_template: String,
    /// Case-insensitive pattern stripped from the end of a document id to
    /// produce the report's display name.
    pub document_suffix: String,
    pub report_suffix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            allowed_extensions: BTreeSet::from(["pdf".to_string()]),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            document_suffix: r"\.pdf".to_string(),
            report_suffix: "miembros-comite".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_as_pair() -> Result<(), serde_json::Error> {
        let chunk = EmbeddedChunk {
            text: "hola".to_string(),
            embedding: vec![0.5, 1.0],
        };

        let encoded = serde_json::to_string(&chunk)?;
        assert_eq!(encoded, r#"["hola",[0.5,1.0]]"#);
        Ok(())
    }

    #[test]
    fn legacy_record_without_metadata_loads() -> Result<(), serde_json::Error> {
        let record: DocumentRecord = serde_json::from_str(r#"{"chunks": [["a", [1.0]], ["b", [2.0]]]}"#)?;

        assert_eq!(record.chunks.len(), 2);
        assert_eq!(record.checksum, None);
        assert_eq!(record.context(), "a\nb");

        let encoded = serde_json::to_string(&record)?;
        assert!(!encoded.contains("checksum"));
        Ok(())
    }

    #[test]
    fn export_row_trims_and_defaults_fields() {
        let member = MemberRecord {
            name: Some("  Jane ".to_string()),
            company_role: Some("CFO".to_string()),
            committee_role: None,
        };

        let row = ExportRow::from_member("A", &member);
        assert_eq!(row.member, "Jane");
        assert_eq!(row.company_role, "CFO");
        assert_eq!(row.committee_role, "");
    }
}
