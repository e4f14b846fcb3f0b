use crate::error::AnswerGenerationError;
use crate::llm::LanguageModel;
use crate::models::Chunk;
use tracing::debug;

/// Joins chunk contents in ranking order, separated by a blank line.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fills the fixed grounding instructions with context and question.
pub fn build_prompt(question: &str, chunks: &[Chunk]) -> String {
    let context = format_context(chunks);
    format!(
        "Use the following pieces of context to answer the question at the end.\n\
         The context may include tables with structured data. Pay special attention to table data \
         when answering questions about specific values, numbers, or statistics.\n\
         \n\
         Answer only from the context. If the context is not enough to answer, just say \
         \"I don't know\"; don't try to make up an answer.\n\
         \n\
         Context: {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer: "
    )
}

pub struct AnswerAssembler<'a, L> {
    model: &'a L,
}

impl<'a, L> AnswerAssembler<'a, L>
where
    L: LanguageModel + Sync,
{
    pub fn new(model: &'a L) -> Self {
        Self { model }
    }

    /// Single model call; the response is returned as-is.
    pub async fn answer(
        &self,
        question: &str,
        retrieved_chunks: &[Chunk],
    ) -> Result<String, AnswerGenerationError> {
        let prompt = build_prompt(question, retrieved_chunks);
        debug!(
            context_chunks = retrieved_chunks.len(),
            prompt_chars = prompt.len(),
            "asking language model"
        );
        Ok(self.model.complete(&prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::models::{ChunkMetadata, ChunkOrigin};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            self.reply.clone().map_err(BackendError::Request)
        }
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                page: 1,
                origin: ChunkOrigin::Text { chunk_index: 0 },
            },
        }
    }

    #[test]
    fn context_keeps_ranking_order_with_blank_lines() {
        let context = format_context(&[chunk("first"), chunk("second"), chunk("third")]);
        assert_eq!(context, "first\n\nsecond\n\nthird");
    }

    #[test]
    fn prompt_contains_instructions_context_and_question() {
        let prompt = build_prompt("What color is the sky?", &[chunk("The sky is blue.")]);

        assert!(prompt.contains("Context: The sky is blue.\n"));
        assert!(prompt.contains("Question: What color is the sky?\n"));
        assert!(prompt.contains("\"I don't know\""));
        assert!(prompt.contains("table data"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn question_text_is_not_interpreted_as_a_placeholder() {
        let prompt = build_prompt("what is {context}?", &[chunk("ctx")]);
        assert!(prompt.contains("Question: what is {context}?"));
    }

    #[tokio::test]
    async fn model_reply_is_returned_unmodified() -> Result<(), AnswerGenerationError> {
        let model = RecordingModel {
            reply: Ok("  The sky is blue. [page 1]\n".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let answer = AnswerAssembler::new(&model)
            .answer("What color is the sky?", &[chunk("The sky is blue.")])
            .await?;

        assert_eq!(answer, "  The sky is blue. [page 1]\n");
        let prompts = model.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0);
        assert_eq!(prompts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn model_failure_is_an_answer_generation_error() {
        let model = RecordingModel {
            reply: Err("connection refused".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let result = AnswerAssembler::new(&model).answer("q", &[]).await;

        assert!(matches!(result, Err(AnswerGenerationError::Model(_))));
    }
}
