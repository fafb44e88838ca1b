//! Answer generation over retrieved context

use std::sync::Arc;

use tracing::{debug, info};

use crate::capabilities::LanguageModel;
use crate::error::{PipelineError, Result};
use crate::retrieval::SourceDocument;

pub const CONTEXT_HEADER: &str = "Context from your knowledge base:";
pub const QUESTION_HEADER: &str = "Question:";

/// Frame `question` with the retrieved context.
///
/// The model is told to answer only from the context and to say it does
/// not know otherwise.
pub fn build_prompt(question: &str, context: &[SourceDocument]) -> String {
    let context = context
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context_header}
{context}

{question_header} {question}
Helpful Answer:"#,
        context_header = CONTEXT_HEADER,
        context = context,
        question_header = QUESTION_HEADER,
        question = question,
    )
}

pub struct Generator {
    model: Arc<dyn LanguageModel>,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        info!("Generator ready (model: {})", model.model_name());
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// One model call, no retry
    pub async fn generate(&self, question: &str, context: &[SourceDocument]) -> Result<String> {
        let prompt = build_prompt(question, context);
        debug!(
            "Generating with {} context documents ({} prompt chars)",
            context.len(),
            prompt.len()
        );

        self.model
            .complete(&prompt)
            .await
            .map_err(PipelineError::generation)
    }
}
