use tracing::warn;

use crate::{generation::TextGenerator, kb::SearchHit};

/// Returned when retrieval found nothing worth grounding on. Distinct
/// from the generation-failure message so callers can tell "nothing
/// relevant" from "the capability is down".
pub const NO_INFORMATION_MESSAGE: &str =
    "No relevant information was found in the knowledge base for this question.";

pub const GENERATION_UNAVAILABLE_MESSAGE: &str =
    "The answer service is currently unavailable; please retry shortly.";

/// Compose a grounded answer from the retrieved passages. Prose comes
/// from the injected generation capability and is returned verbatim;
/// both failure modes degrade to their fixed messages instead of
/// propagating.
pub fn synthesize(question: &str, retrieved: &[SearchHit], generator: &dyn TextGenerator) -> String {
    if retrieved.is_empty() {
        return NO_INFORMATION_MESSAGE.to_string();
    }

    let prompt = build_prompt(question, retrieved);
    match generator.generate(&prompt) {
        Ok(answer) => answer,
        Err(err) => {
            warn!("Answer generation failed, degrading: {err:#}");
            GENERATION_UNAVAILABLE_MESSAGE.to_string()
        }
    }
}

fn build_prompt(question: &str, retrieved: &[SearchHit]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the reference passages below. \
         If they do not contain the answer, say so.\n\n",
    );
    for hit in retrieved {
        prompt.push_str(&format!(
            "[{} - {}]\n{}\n\n",
            hit.document.source_title, hit.document.heading, hit.document.text
        ));
    }
    prompt.push_str(&format!("Question: {question}\nAnswer:"));
    prompt
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};

    use super::{synthesize, GENERATION_UNAVAILABLE_MESSAGE, NO_INFORMATION_MESSAGE};
    use crate::{
        generation::TextGenerator,
        kb::{KbDocument, SearchHit},
    };

    struct FixedGenerator(&'static str);

    impl TextGenerator for FixedGenerator {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate(&self, _prompt: &str) -> Result<String> {
            bail!("timed out")
        }
    }

    struct EchoGenerator;

    impl TextGenerator for EchoGenerator {
        fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    fn hit(text: &str) -> SearchHit {
        SearchHit {
            document: KbDocument {
                id: 0,
                heading: "What is an aquifer".to_string(),
                text: text.to_string(),
                source_title: "aquifers.md".to_string(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn empty_retrieval_returns_the_no_information_message() {
        let answer = synthesize("What is an aquifer?", &[], &FixedGenerator("unused"));
        assert_eq!(answer, NO_INFORMATION_MESSAGE);
    }

    #[test]
    fn generation_output_is_returned_verbatim() {
        let answer = synthesize(
            "What is an aquifer?",
            &[hit("An aquifer is a water-bearing layer.")],
            &FixedGenerator("An aquifer is a water-bearing rock layer."),
        );
        assert_eq!(answer, "An aquifer is a water-bearing rock layer.");
    }

    #[test]
    fn generation_failure_degrades_to_a_distinct_message() {
        let answer = synthesize(
            "What is an aquifer?",
            &[hit("An aquifer is a water-bearing layer.")],
            &FailingGenerator,
        );
        assert_eq!(answer, GENERATION_UNAVAILABLE_MESSAGE);
        assert_ne!(GENERATION_UNAVAILABLE_MESSAGE, NO_INFORMATION_MESSAGE);
    }

    #[test]
    fn prompt_carries_question_and_labelled_passages() {
        let answer = synthesize(
            "What is an aquifer?",
            &[hit("An aquifer is a water-bearing layer.")],
            &EchoGenerator,
        );
        assert!(answer.contains("Question: What is an aquifer?"));
        assert!(answer.contains("aquifers.md"));
        assert!(answer.contains("An aquifer is a water-bearing layer."));
    }
}
