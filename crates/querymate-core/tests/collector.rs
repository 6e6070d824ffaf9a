//! End-to-end tests of the context-collection conversation against a
//! scripted model and a real on-disk session store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use querymate_core::context::collector::{
    ContextCollector, CONTINUING_GREETING, DEFAULT_ACK, FIRST_TURN_GREETING,
};
use querymate_core::context::finalizer;
use querymate_core::error::{ProviderError, QueryMateError, SessionError};
use querymate_core::provider::{ModelGateway, TextGenerator};
use querymate_core::session::file_store::FileSessionStore;
use querymate_core::session::store::SessionStore;
use querymate_core::session::Stage;

/// Plays back a fixed script of model responses, one per call, regardless
/// of which candidate is asked.
struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, ProviderError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".to_string())))
    }
}

fn collector_with(script: Vec<Result<String, ProviderError>>) -> ContextCollector {
    let gateway = Arc::new(ModelGateway::new(
        ScriptedModel::new(script),
        Duration::from_secs(5),
    ));
    ContextCollector::new(gateway, vec!["primary".to_string()])
}

fn turn(reply: &str, data: serde_json::Value, done: bool) -> Result<String, ProviderError> {
    Ok(json!({ "reply": reply, "collectedData": data, "done": done }).to_string())
}

const EMAIL: &str = "owner@example.com";

#[tokio::test]
async fn full_conversation_reaches_completion_and_finalizes() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![
        turn(
            "What do you sell?",
            json!({ "business_name": "Acme Shoes" }),
            false,
        ),
        turn(
            "Thanks, that covers it!",
            json!({ "description": "Handmade leather shoes.", "pricing": "$120 per pair" }),
            true,
        ),
    ]);

    let first = collector
        .submit_message(&store, EMAIL, "We are Acme Shoes")
        .await
        .unwrap();
    assert_eq!(first.reply, "What do you sell?");
    assert!(!first.done);
    assert_eq!(first.collected_data["business_name"], json!("Acme Shoes"));

    let second = collector
        .submit_message(&store, EMAIL, "Handmade leather shoes, $120")
        .await
        .unwrap();
    assert!(second.done);
    assert_eq!(second.collected_data.len(), 3);

    let session = store.get(EMAIL).unwrap();
    assert!(session.is_complete());

    let blob = finalizer::finalize(&session, None).unwrap();
    assert!(blob.contains("Business Name: Acme Shoes"));
    assert!(blob.contains("Description:\nHandmade leather shoes."));
    assert!(blob.contains("Pricing: $120 per pair"));
}

#[tokio::test]
async fn merge_is_last_write_wins_and_keeps_first_seen_order() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![
        turn("ok", json!({ "a": "1" }), false),
        turn("ok", json!({ "b": "2", "a": "3" }), false),
    ]);

    collector.submit_message(&store, EMAIL, "first").await.unwrap();
    let outcome = collector.submit_message(&store, EMAIL, "second").await.unwrap();

    assert_eq!(outcome.collected_data["a"], json!("3"));
    assert_eq!(outcome.collected_data["b"], json!("2"));
    let keys: Vec<&String> = outcome.collected_data.keys().collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[tokio::test]
async fn message_after_completion_is_rejected_without_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![turn("done!", json!({ "a": "1" }), true)]);

    collector.submit_message(&store, EMAIL, "hello").await.unwrap();
    let before = store.get(EMAIL).unwrap();

    let err = collector
        .submit_message(&store, EMAIL, "one more thing")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryMateError::Session(SessionError::AlreadyComplete)
    ));

    let after = store.get(EMAIL).unwrap();
    assert_eq!(after.collected_data, before.collected_data);
    assert_eq!(after.last_updated, before.last_updated);
}

#[tokio::test]
async fn model_exhaustion_leaves_session_unpersisted() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![Err(ProviderError::Api {
        status: 503,
        message: "overloaded".to_string(),
    })]);

    let err = collector
        .submit_message(&store, EMAIL, "hello")
        .await
        .unwrap_err();
    match err {
        QueryMateError::Provider(p) => assert!(p.is_exhausted()),
        other => panic!("unexpected error: {other}"),
    }

    assert!(store.get(EMAIL).is_none());
}

#[tokio::test]
async fn unparseable_output_falls_through_then_exhausts() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    // Single candidate, so the prose response exhausts the list.
    let collector = collector_with(vec![Ok("Sure, let me summarize...".to_string())]);

    let err = collector
        .submit_message(&store, EMAIL, "hello")
        .await
        .unwrap_err();
    match err {
        QueryMateError::Provider(ProviderError::AllModelsFailed(inner)) => {
            assert!(matches!(*inner, ProviderError::Parse(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.get(EMAIL).is_none());
}

#[tokio::test]
async fn fenced_json_output_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![Ok(
        "```json\n{\"reply\": \"Noted.\", \"collectedData\": {\"contact\": \"hi@acme.io\"}, \"done\": false}\n```"
            .to_string(),
    )]);

    let outcome = collector.submit_message(&store, EMAIL, "hello").await.unwrap();
    assert_eq!(outcome.reply, "Noted.");
    assert_eq!(outcome.collected_data["contact"], json!("hi@acme.io"));
}

#[tokio::test]
async fn missing_reply_uses_default_acknowledgement() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![Ok(
        json!({ "collectedData": { "a": "1" }, "done": false }).to_string()
    )]);

    let outcome = collector.submit_message(&store, EMAIL, "hello").await.unwrap();
    assert_eq!(outcome.reply, DEFAULT_ACK);
}

#[tokio::test]
async fn init_creates_session_with_model_greeting() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![turn(
        "Hi there! Tell me about your business.",
        json!({}),
        false,
    )]);

    let init = collector.get_or_init(&store, EMAIL, false).await.unwrap();
    assert_eq!(init.session.stage, Stage::Collecting);
    assert_eq!(
        init.initial_message.as_deref(),
        Some("Hi there! Tell me about your business.")
    );

    // The greeting call never mutates the stored session.
    let session = store.get(EMAIL).unwrap();
    assert!(session.collected_data.is_empty());
    assert!(!session.is_complete());
}

#[tokio::test]
async fn init_greeting_failure_falls_back_to_canned_text() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![Err(ProviderError::Timeout(20_000))]);

    let init = collector.get_or_init(&store, EMAIL, false).await.unwrap();
    assert_eq!(init.initial_message.as_deref(), Some(FIRST_TURN_GREETING));
    assert!(store.get(EMAIL).is_some());
}

#[tokio::test]
async fn init_with_existing_context_reports_complete_without_a_session() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![]);

    let init = collector.get_or_init(&store, EMAIL, true).await.unwrap();
    assert_eq!(init.session.stage, Stage::Complete);
    assert!(init.session.has_existing_context);
    assert!(init.initial_message.is_none());
    assert!(store.get(EMAIL).is_none());
}

#[tokio::test]
async fn init_on_in_progress_session_returns_continuing_prompt() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![turn("ok", json!({ "a": "1" }), false)]);

    collector.submit_message(&store, EMAIL, "hello").await.unwrap();

    let init = collector.get_or_init(&store, EMAIL, false).await.unwrap();
    assert_eq!(init.initial_message.as_deref(), Some(CONTINUING_GREETING));
    assert_eq!(init.session.collected_data["a"], json!("1"));
}

#[tokio::test]
async fn reset_then_init_starts_fresh() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path());
    let collector = collector_with(vec![
        turn("done", json!({ "a": "1" }), true),
        turn("Welcome back!", json!({}), false),
    ]);

    collector.submit_message(&store, EMAIL, "hello").await.unwrap();
    assert!(store.get(EMAIL).unwrap().is_complete());

    collector.reset(&store, EMAIL);
    assert!(store.get(EMAIL).is_none());

    let init = collector.get_or_init(&store, EMAIL, false).await.unwrap();
    assert_eq!(init.session.stage, Stage::Collecting);
    assert!(init.session.collected_data.is_empty());
    assert_eq!(init.initial_message.as_deref(), Some("Welcome back!"));
}
