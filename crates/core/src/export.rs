use crate::error::ExportError;
use crate::models::{ExportRow, MemberRecord, PipelineOptions};
use crate::store::ResponseStore;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

pub const HEADER: [&str; 4] = [
    "Nombre del documento",
    "Nombre del miembro",
    "Cargo en la empresa",
    "Cargo en la comisión",
];

const MEMBER_KEY: &str = "Miembro del comité";
const COMPANY_ROLE_KEY: &str = "Cargo en la empresa";
const COMMITTEE_ROLE_KEY: &str = "Cargo en la comisión";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub rows: usize,
}

/// Flattens stored answers into a tab-separated member report.
pub struct ReportExporter {
    document_suffix: Regex,
    fence: Regex,
    report_suffix: String,
}

impl ReportExporter {
    pub fn new(options: &PipelineOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            document_suffix: Regex::new(&format!("(?i)(?:{})$", options.document_suffix))?,
            fence: Regex::new(r"(?i)```(?:json)?")?,
            report_suffix: options.report_suffix.clone(),
        })
    }

    pub fn display_name(&self, document_id: &str) -> String {
        self.document_suffix.replace(document_id, "").into_owned()
    }

    /// Parses one answer; `None` when it is not a JSON array.
    pub fn parse_members(&self, answer: &str) -> Option<Vec<MemberRecord>> {
        let cleaned = self.fence.replace_all(answer, "");
        let parsed: Value = match serde_json::from_str(cleaned.trim()) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "answer is not valid json");
                return None;
            }
        };

        let Value::Array(items) = parsed else {
            warn!("answer is json but not an array");
            return None;
        };

        let members = items
            .iter()
            .filter_map(|item| match item {
                Value::Object(fields) => Some(MemberRecord {
                    name: field_text(fields.get(MEMBER_KEY)),
                    company_role: field_text(fields.get(COMPANY_ROLE_KEY)),
                    committee_role: field_text(fields.get(COMMITTEE_ROLE_KEY)),
                }),
                other => {
                    warn!(element = %other, "skipping non-object member entry");
                    None
                }
            })
            .collect();

        Some(members)
    }

    pub fn rows(&self, responses: &ResponseStore) -> Vec<ExportRow> {
        let mut rows = Vec::new();

        for (document_id, answer) in responses.iter() {
            let Some(members) = self.parse_members(answer) else {
                warn!(document_id = %document_id, "skipping document with unusable answer");
                continue;
            };

            let display = self.display_name(document_id);
            rows.extend(members.iter().map(|member| ExportRow::from_member(&display, member)));
        }

        rows
    }

    pub fn export(
        &self,
        responses: &ResponseStore,
        now: DateTime<Utc>,
    ) -> Result<ExportReport, ExportError> {
        let rows = self.rows(responses);
        if rows.is_empty() {
            warn!(documents = responses.len(), "no valid rows to export");
            return Err(ExportError::NoValidData);
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(UTF8_BOM.to_vec());
        writer.write_record(HEADER)?;
        for row in &rows {
            writer.write_record([
                row.document.as_str(),
                row.member.as_str(),
                row.company_role.as_str(),
                row.committee_role.as_str(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|error| error.into_error())?;

        let filename = format!("{}-{}.csv", now.format(TIMESTAMP_FORMAT), self.report_suffix);
        info!(rows = rows.len(), filename = %filename, "report exported");

        Ok(ExportReport {
            filename,
            bytes,
            rows: rows.len(),
        })
    }
}

fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.trim().to_string()),
        other => Some(other.to_string()),
    }
}
