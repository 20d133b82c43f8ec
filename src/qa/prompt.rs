//! Prompt assembly for the "stuff" strategy: every retrieved chunk goes into one prompt.

use crate::store::ScoredChunk;

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Join retrieved chunks into the context block, best match first.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Fill the QA template with retrieved context and the question.
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end.\n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         Be concise and accurate in your response.\n\
         \n\
         Context: {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = render_prompt("The sky is blue.", "What colour is the sky?");
        let context_at = prompt.find("Context: The sky is blue.").expect("context");
        let question_at = prompt
            .find("Question: What colour is the sky?")
            .expect("question");
        assert!(context_at < question_at);
        assert!(prompt.starts_with("Use the following pieces of context"));
        assert!(prompt.contains("just say that you don't know"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn placeholders_inside_context_are_not_expanded() {
        let prompt = render_prompt("literal {question} braces", "Q?");
        assert!(prompt.contains("Context: literal {question} braces"));
    }

    #[test]
    fn context_joins_chunks_in_rank_order() {
        let chunks = vec![
            ScoredChunk {
                text: "best".into(),
                score: 0.9,
            },
            ScoredChunk {
                text: "next".into(),
                score: 0.5,
            },
        ];
        assert_eq!(build_context(&chunks), "best\n\nnext");
        assert_eq!(build_context(&[]), "");
    }
}
