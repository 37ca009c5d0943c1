//! Prompt templates for answering and judging.
//!
//! Placeholders in `{braces}` are substituted with [`Prompts::fill`].

/// Collection of prompts used for answer generation and evaluation.
pub struct Prompts;

impl Prompts {
    /// Financial analyst prompt for answering from retrieved context.
    pub fn financial_answer() -> &'static str {
        r#"You are a professional financial analyst assistant.
Use the following pieces of retrieved context to answer the question.
If the context does not contain enough information to answer the question, say that you don't know based on the context.
Do not make up information.
Always cite the source if possible (though context provided here is a merged string).

Context:
{context}

Question: {question}

Answer:"#
    }

    /// Judge prompt: are all claims in the answer inferable from the context?
    pub fn faithfulness_judge() -> &'static str {
        r#"You are a judge. Evaluate whether the following answer is faithful to the context.
Answer is faithful if all claims in the answer can be inferred from the context.

Context: {context}
Answer: {answer}

Respond with a score from 0.0 to 1.0, where 1.0 is fully faithful and 0.0 is hallucination.
Only return the numeric score."#
    }

    /// Judge prompt: does the answer address the question?
    pub fn relevance_judge() -> &'static str {
        r#"You are a judge. Evaluate whether the answer addresses the question.

Question: {question}
Answer: {answer}

Respond with a score from 0.0 to 1.0, where 1.0 is fully relevant.
Only return the numeric score."#
    }

    /// Substitute `{name}` placeholders in a single pass.
    ///
    /// Values are not re-scanned, so retrieved text containing braces is
    /// left untouched.
    pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replaced = after.find('}').and_then(|close| {
                let name = &after[..close];
                vars.iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });

            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_answer_template() {
        let prompt = Prompts::fill(
            Prompts::financial_answer(),
            &[("context", "Revenue was $10M."), ("question", "What was revenue?")],
        );
        assert!(prompt.contains("Context:\nRevenue was $10M."));
        assert!(prompt.contains("Question: What was revenue?"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn test_fill_does_not_rescan_values() {
        let filled = Prompts::fill(
            "A: {answer} Q: {question}",
            &[("answer", "{question}"), ("question", "why?")],
        );
        assert_eq!(filled, "A: {question} Q: why?");
    }

    #[test]
    fn test_fill_keeps_unknown_placeholders() {
        let filled = Prompts::fill("{a} {unknown} {", &[("a", "x")]);
        assert_eq!(filled, "x {unknown} {");
    }

    #[test]
    fn test_judge_templates_have_placeholders() {
        assert!(Prompts::faithfulness_judge().contains("{context}"));
        assert!(Prompts::faithfulness_judge().contains("{answer}"));
        assert!(Prompts::relevance_judge().contains("{question}"));
        assert!(Prompts::relevance_judge().contains("{answer}"));
    }
}
