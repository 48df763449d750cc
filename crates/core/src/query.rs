use crate::error::QueryError;
use crate::genai::TextGenerator;
use crate::models::{DocumentRecord, DEFAULT_PROMPT_TEMPLATE};
use crate::store::{DocumentStore, ResponseStore};
use std::collections::BTreeMap;
use tracing::info;

/// Asks the generation service about whole documents using a fixed
/// instruction template.
///
/// The context is every stored chunk of the document, in order; embeddings
/// are not consulted.
pub struct QueryAnswerer<G> {
    generator: G,
    template: String,
}

impl<G> QueryAnswerer<G>
where
    G: TextGenerator,
{
    pub fn new(generator: G, template: impl Into<String>) -> Self {
        Self {
            generator,
            template: template.into(),
        }
    }

    pub fn with_default_template(generator: G) -> Self {
        Self::new(generator, DEFAULT_PROMPT_TEMPLATE)
    }

    pub fn build_prompt(&self, record: &DocumentRecord) -> String {
        format!("Context:\n{}\n\n{}", record.context(), self.template)
    }

    /// Generates and saves the answer for `document_id`, replacing any
    /// previous answer.
    pub fn answer(
        &self,
        documents: &DocumentStore,
        responses: &mut ResponseStore,
        document_id: &str,
    ) -> Result<String, QueryError> {
        let record = documents
            .get(document_id)
            .ok_or_else(|| QueryError::DocumentNotFound(document_id.to_string()))?;

        let prompt = self.build_prompt(record);
        let answer = self.generator.generate(&prompt)?;
        responses.put(document_id, answer.clone())?;

        info!(document_id, chars = answer.chars().count(), "answer stored");
        Ok(answer)
    }

    /// Answers each listed document, or every stored document when `subset`
    /// is `None`. Answers are saved one at a time, so a failure keeps the
    /// answers produced before it.
    pub fn answer_all(
        &self,
        documents: &DocumentStore,
        responses: &mut ResponseStore,
        subset: Option<&[String]>,
    ) -> Result<BTreeMap<String, String>, QueryError> {
        let ids = match subset {
            Some(ids) => ids.to_vec(),
            None => documents.ids(),
        };

        let mut answers = BTreeMap::new();
        for id in ids {
            let answer = self.answer(documents, responses, &id)?;
            answers.insert(id, answer);
        }

        Ok(answers)
    }
}

pub fn saved_answer<'a>(responses: &'a ResponseStore, document_id: &str) -> Option<&'a str> {
    responses.get(document_id).map(String::as_str)
}
