use std::sync::Arc;

use crate::error::ProviderError;
use crate::provider::ModelGateway;

/// Which surface the question came through. The refusal wording differs
/// between the embedded widget and the logged-in dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerChannel {
    /// Widget callers authenticated by API key.
    Public,
    /// Account owners chatting from the dashboard.
    Dashboard,
}

impl AnswerChannel {
    /// Fixed sentence the model must emit when the question is not covered
    /// by the context.
    pub fn refusal(&self) -> &'static str {
        match self {
            AnswerChannel::Public => {
                "Hmm, that doesn’t seem related to what I can help with. Want to try a different question?"
            }
            AnswerChannel::Dashboard => {
                "I am here to discuss the information you've provided. Could you tell me more about what you're looking for?"
            }
        }
    }
}

/// Answers end-user questions strictly from a stored context blob.
pub struct AnsweringService {
    gateway: Arc<ModelGateway>,
    candidates: Vec<String>,
}

impl AnsweringService {
    pub fn new(gateway: Arc<ModelGateway>, candidates: Vec<String>) -> Self {
        Self { gateway, candidates }
    }

    /// Produce a grounded answer, or the channel's refusal sentence when
    /// the context does not cover the question. Total model failure
    /// surfaces as `ProviderError::AllModelsFailed`; the caller decides
    /// whether that becomes a hard error or a degraded inline reply.
    pub async fn answer(
        &self,
        context: &str,
        question: &str,
        channel: AnswerChannel,
    ) -> Result<String, ProviderError> {
        let prompt = build_answer_prompt(context, question, channel);
        self.gateway.generate(&prompt, &self.candidates).await
    }
}

fn build_answer_prompt(context: &str, question: &str, channel: AnswerChannel) -> String {
    format!(
        "You are QueryMate, a helpful assistant. Use ONLY the following context to answer. If the answer isn't in the context, say \"{}\"\n\nContext:\n{}\n\nUser question:\n{}",
        channel.refusal(),
        context,
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_wording_differs_per_channel() {
        assert_ne!(
            AnswerChannel::Public.refusal(),
            AnswerChannel::Dashboard.refusal()
        );
        assert!(AnswerChannel::Public.refusal().contains("different question"));
        assert!(AnswerChannel::Dashboard.refusal().contains("information you've provided"));
    }

    #[test]
    fn test_prompt_embeds_context_question_and_refusal() {
        let prompt = build_answer_prompt(
            "We sell shoes.",
            "What is the refund policy?",
            AnswerChannel::Public,
        );
        assert!(prompt.contains("We sell shoes."));
        assert!(prompt.contains("What is the refund policy?"));
        assert!(prompt.contains(AnswerChannel::Public.refusal()));
        assert!(prompt.contains("Use ONLY the following context"));
    }
}
