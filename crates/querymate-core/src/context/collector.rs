use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ProviderError, QueryMateError, SessionError};
use crate::provider::ModelGateway;
use crate::session::store::SessionStore;
use crate::session::{ContextSession, Stage};

/// Shown when the model omits its `reply` field.
pub const DEFAULT_ACK: &str = "Thank you for the information!";

/// Canned greeting for a session with nothing collected yet.
pub const FIRST_TURN_GREETING: &str = "Hello! I'm QueryMate. Let's gather some information about your business or service. What does your business do?";

/// Canned prompt for a session that already holds some fields.
pub const CONTINUING_GREETING: &str = "Let's continue gathering information about your business. What would you like to tell me?";

/// One parsed turn of the collection conversation, as emitted by the model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelTurn {
    reply: Option<String>,
    #[serde(default)]
    collected_data: Map<String, Value>,
    #[serde(default)]
    done: bool,
}

/// Result of submitting one user message to the collection conversation.
/// `collected_data` is the full post-merge mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub reply: String,
    pub collected_data: Map<String, Value>,
    pub done: bool,
}

/// Session state reported to the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub collected_data: Map<String, Value>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_existing_context: bool,
}

/// Response of `get_or_init`: the session view plus an opening message
/// while collection is still in progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInit {
    pub session: SessionSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<String>,
}

/// Drives the multi-turn context-collection conversation: builds the
/// prompt from the accumulated field mapping, parses the model's JSON
/// turn, merges the delta, and flips the session to complete when the
/// model signals it has enough.
pub struct ContextCollector {
    gateway: Arc<ModelGateway>,
    candidates: Vec<String>,
}

impl ContextCollector {
    pub fn new(gateway: Arc<ModelGateway>, candidates: Vec<String>) -> Self {
        Self { gateway, candidates }
    }

    /// Submit one user message. On total model failure the session is left
    /// untouched and unpersisted.
    pub async fn submit_message(
        &self,
        store: &dyn SessionStore,
        email: &str,
        text: &str,
    ) -> Result<TurnOutcome, QueryMateError> {
        let mut session = store
            .get(email)
            .unwrap_or_else(|| ContextSession::new(email));

        if session.is_complete() {
            return Err(SessionError::AlreadyComplete.into());
        }

        let prompt = build_collection_prompt(&session.collected_data, text);
        let turn = self
            .gateway
            .generate_parsed(&prompt, &self.candidates, parse_turn)
            .await?;

        session.merge(&turn.collected_data);
        if turn.done {
            session.stage = Stage::Complete;
            info!("Context collection complete for {}", email);
        }
        session.last_updated = chrono::Utc::now();
        store.save(&session)?;

        Ok(TurnOutcome {
            reply: turn.reply.unwrap_or_else(|| DEFAULT_ACK.to_string()),
            collected_data: session.collected_data,
            done: turn.done,
        })
    }

    /// Get the account's session, creating one when the account has neither
    /// a session nor a finalized context. A freshly created session opens
    /// with a model-generated greeting, falling back to the canned one so
    /// session creation never fails on model trouble.
    pub async fn get_or_init(
        &self,
        store: &dyn SessionStore,
        email: &str,
        has_existing_context: bool,
    ) -> Result<SessionInit, QueryMateError> {
        if let Some(session) = store.get(email) {
            let initial_message = if session.is_complete() {
                None
            } else if session.collected_data.is_empty() {
                Some(FIRST_TURN_GREETING.to_string())
            } else {
                Some(CONTINUING_GREETING.to_string())
            };
            return Ok(SessionInit {
                session: SessionSnapshot {
                    collected_data: session.collected_data,
                    stage: session.stage,
                    last_updated: Some(session.last_updated),
                    has_existing_context: false,
                },
                initial_message,
            });
        }

        if has_existing_context {
            // Context was already finalized; nothing to collect.
            return Ok(SessionInit {
                session: SessionSnapshot {
                    collected_data: Map::new(),
                    stage: Stage::Complete,
                    last_updated: None,
                    has_existing_context: true,
                },
                initial_message: None,
            });
        }

        let session = ContextSession::new(email);
        store.save(&session)?;
        let greeting = self.opening_greeting().await;

        Ok(SessionInit {
            session: SessionSnapshot {
                collected_data: session.collected_data,
                stage: session.stage,
                last_updated: Some(session.last_updated),
                has_existing_context: false,
            },
            initial_message: Some(greeting),
        })
    }

    /// Ask the model to open the conversation. Only the reply is used; any
    /// collected fields or completion signal from this call are ignored.
    async fn opening_greeting(&self) -> String {
        let prompt = build_collection_prompt(&Map::new(), "Please begin the conversation.");
        match self
            .gateway
            .generate_parsed(&prompt, &self.candidates, parse_turn)
            .await
        {
            Ok(turn) => turn.reply.unwrap_or_else(|| FIRST_TURN_GREETING.to_string()),
            Err(e) => {
                warn!("Greeting generation failed, using canned greeting: {}", e);
                FIRST_TURN_GREETING.to_string()
            }
        }
    }

    /// Delete the session row; the next `get_or_init` starts fresh.
    pub fn reset(&self, store: &dyn SessionStore, email: &str) {
        store.delete(email);
    }
}

/// The collection task prompt: fixed instructions, the serialized field
/// mapping so far, and the latest user message.
fn build_collection_prompt(collected: &Map<String, Value>, user_text: &str) -> String {
    let collected_json =
        serde_json::to_string_pretty(collected).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are QueryMate, an intelligent assistant that gathers detailed context information about a business or service.

Your task is to ask smart, natural questions until you have enough information to generate a complete description.

Use what you already know to decide the next question — do not ask irrelevant or repetitive things.

Always collect details such as:
- What the business or service offers
- Target users or customers
- Core features or benefits
- Pricing or availability details
- Contact or support information
- Any additional unique qualities

Once you have enough context, mark the process as complete.

Respond in JSON format only:

{{
  "reply": "<your next conversational question or confirmation>",
  "collectedData": {{
    "business_name": "...",
    "description": "...",
    "target_audience": "...",
    "features": "...",
    "pricing": "...",
    "support": "...",
    "contact": "...",
    "...": "add dynamically as discovered"
  }},
  "done": true or false
}}

Current collected data:
{collected_json}

Latest user message:
"{user_text}""#
    )
}

/// Parse one model turn, tolerating a fenced code block wrapper.
fn parse_turn(text: &str) -> Result<ModelTurn, ProviderError> {
    let stripped = strip_code_fence(text);
    serde_json::from_str(stripped)
        .map_err(|e| ProviderError::Parse(format!("invalid turn record: {e}")))
}

/// Strip a surrounding ``` / ```json fence, if present. The info string
/// may run straight into the payload with no newline.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    body.trim().trim_end_matches("```").trim()
}
