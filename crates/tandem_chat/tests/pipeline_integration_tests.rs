//! Integration tests for the two-stage pipeline.
//!
//! These tests drive the orchestrator with a scripted completion client,
//! holding replies open where a test needs a stage to stay in flight.

use std::time::Duration;

use chrono::Utc;
use tandem_chat::{
    ChatArchive, CompletionFailure, Conversation, FailureKind, IgnoreReason, Message, MessageRole,
    MessageStatus, Orchestrator, PipelineConfig, PipelineOutcome, Provider, ScriptedClient,
    ScriptedReply, Stage, StageConfig, CODING_PROMPT, REGENERATING_PLACEHOLDER, STOPPED_CONTENT,
    SUPERSEDED_CONTENT, THINKING_PLACEHOLDER, THINKING_PROMPT,
};
use tempfile::tempdir;

fn config() -> PipelineConfig {
    PipelineConfig::new(
        StageConfig::new(Provider::OpenRouter, "thinker", "key-1"),
        StageConfig::new(Provider::DeepSeek, "coder", "key-2"),
    )
}

fn saved_chat(messages: Vec<Message>) -> Conversation {
    Conversation {
        id: "saved-chat".to_string(),
        messages,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn spawn_submit(
    orchestrator: &Orchestrator,
    prompt: &str,
) -> tokio::task::JoinHandle<tandem_chat::ChatResult<PipelineOutcome>> {
    let orchestrator = orchestrator.clone();
    let prompt = prompt.to_string();
    tokio::spawn(async move { orchestrator.submit(&prompt, &config()).await })
}

/// Test a full run sends the right requests and fills the conversation.
#[tokio::test]
async fn test_pipeline_success() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("Use a form with two fields."))
        .with_reply(ScriptedReply::text("<form>...</form>"));
    let orchestrator = Orchestrator::new(client.clone());

    let outcome = orchestrator
        .submit("Build a login form", &config())
        .await
        .unwrap();
    let PipelineOutcome::Completed {
        user_id,
        thinking_id,
        coding_id,
    } = outcome
    else {
        panic!("expected a completed run");
    };

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].prompt, "Build a login form");
    assert_eq!(requests[0].system_prompt, THINKING_PROMPT);
    assert_eq!(requests[0].model, "thinker");
    assert_eq!(requests[0].provider, Provider::OpenRouter);
    assert_eq!(requests[0].credential, "key-1");
    assert_eq!(requests[1].system_prompt, CODING_PROMPT);
    assert_eq!(requests[1].model, "coder");
    assert_eq!(requests[1].credential, "key-2");
    assert_eq!(
        requests[1].prompt,
        "Based on this analysis:\n\nUse a form with two fields.\n\nImplement the solution with production-ready code."
    );

    let messages = orchestrator.messages();
    let ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![user_id, thinking_id, coding_id]);
    assert_eq!(messages[1].content, "Use a form with two fields.");
    assert_eq!(messages[2].content, "<form>...</form>");
    assert!(messages.iter().all(|m| m.status == MessageStatus::Complete));
    assert!(!orchestrator.is_generating());
}

/// Test a prompt submitted during a run is ignored.
#[tokio::test]
async fn test_submit_while_generating_is_ignored() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis").held())
        .with_reply(ScriptedReply::text("code"));
    let orchestrator = Orchestrator::new(client.clone());

    let run = spawn_submit(&orchestrator, "first");
    client.wait_for_calls(1).await;
    assert!(orchestrator.is_generating());

    let second = orchestrator.submit("second", &config()).await.unwrap();
    assert_eq!(second, PipelineOutcome::Ignored(IgnoreReason::Busy));
    assert_eq!(orchestrator.messages().len(), 2);

    client.release();
    assert!(run.await.unwrap().unwrap().is_completed());
    assert_eq!(orchestrator.messages().len(), 3);
    assert_eq!(client.call_count(), 2);
}

/// Test stopping during the thinking stage.
#[tokio::test]
async fn test_stop_during_thinking() {
    let client = ScriptedClient::new().with_reply(ScriptedReply::text("late analysis").held());
    let orchestrator = Orchestrator::new(client.clone());
    orchestrator.set_input("Build a login form");

    let run = spawn_submit(&orchestrator, "Build a login form");
    client.wait_for_calls(1).await;

    let generating = orchestrator.messages();
    assert_eq!(generating[1].status, MessageStatus::Generating);
    assert_eq!(generating[1].content, THINKING_PLACEHOLDER);

    assert!(orchestrator.stop_generation());
    assert!(!orchestrator.is_generating());

    let messages = orchestrator.messages();
    assert_eq!(messages[1].status, MessageStatus::Stopped);
    assert_eq!(messages[1].content, STOPPED_CONTENT);

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped { stage: Stage::Thinking });

    // The late reply never lands and coding never starts
    client.release();
    tokio::task::yield_now().await;
    assert_eq!(client.call_count(), 1);
    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].status, MessageStatus::Complete);
    assert_eq!(messages[1].content, STOPPED_CONTENT);
    assert!(orchestrator.input().is_empty());
}

/// Test stopping during the coding stage keeps the analysis.
#[tokio::test]
async fn test_stop_during_coding() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code").held());
    let orchestrator = Orchestrator::new(client.clone());

    let run = spawn_submit(&orchestrator, "task");
    client.wait_for_calls(2).await;
    assert!(orchestrator.stop_generation());

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped { stage: Stage::Coding });

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].status, MessageStatus::Complete);
    assert_eq!(messages[1].content, "analysis");
    assert_eq!(messages[2].status, MessageStatus::Stopped);
    assert_eq!(messages[2].model.as_deref(), Some("coder"));
}

/// Test a new run after a stop is unaffected by the stopped one.
#[tokio::test]
async fn test_new_run_after_stop() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("stale").held())
        .with_reply(ScriptedReply::text("fresh analysis"))
        .with_reply(ScriptedReply::text("fresh code"));
    let orchestrator = Orchestrator::new(client.clone());

    let run = spawn_submit(&orchestrator, "first");
    client.wait_for_calls(1).await;
    orchestrator.stop_generation();
    run.await.unwrap().unwrap();

    let outcome = orchestrator.submit("second", &config()).await.unwrap();
    assert!(outcome.is_completed());

    client.release();
    tokio::task::yield_now().await;

    let contents: Vec<_> = orchestrator
        .messages()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(
        contents,
        vec!["first", STOPPED_CONTENT, "second", "fresh analysis", "fresh code"]
    );
}

/// Test starting a new chat cancels the run and clears the conversation.
#[tokio::test]
async fn test_new_chat_during_generation() {
    let client = ScriptedClient::new().with_reply(ScriptedReply::text("analysis").held());
    let orchestrator = Orchestrator::new(client.clone());
    let original_id = orchestrator.conversation_id();

    let run = spawn_submit(&orchestrator, "task");
    client.wait_for_calls(1).await;

    let new_id = orchestrator.start_new_chat();
    assert_ne!(new_id, original_id);
    assert!(!orchestrator.is_generating());
    assert!(orchestrator.messages().is_empty());

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped { stage: Stage::Thinking });

    client.release();
    tokio::task::yield_now().await;
    assert!(orchestrator.messages().is_empty());
    assert_eq!(orchestrator.conversation_id(), new_id);
}

/// Test each failure kind lands on the user turn and removes the placeholder.
#[tokio::test]
async fn test_failure_kinds() {
    let failures = [
        CompletionFailure::auth("401"),
        CompletionFailure::network("timed out"),
        CompletionFailure::rate_limit("429"),
        CompletionFailure::invalid_model("no such model"),
        CompletionFailure::provider("500"),
        CompletionFailure::unknown("bad json"),
    ];

    for failure in failures {
        let kind = failure.kind;
        let client = ScriptedClient::new().with_reply(ScriptedReply::failure(failure));
        let orchestrator = Orchestrator::new(client);

        let outcome = orchestrator.submit("task", &config()).await.unwrap();
        let PipelineOutcome::Failed { stage, failure, .. } = outcome else {
            panic!("expected a failed run for {}", kind);
        };
        assert_eq!(stage, Stage::Thinking);
        assert_eq!(failure.kind, kind);

        let messages = orchestrator.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].status, MessageStatus::Error);
        assert!(messages[0].error.is_some());
        assert!(!orchestrator.is_generating());
    }
}

/// Test an auth failure on the coding stage.
#[tokio::test]
async fn test_coding_stage_failure() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::failure(CompletionFailure::auth("bad key")));
    let orchestrator = Orchestrator::new(client);

    let outcome = orchestrator.submit("task", &config()).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed { stage: Stage::Coding, ref failure, .. } if failure.kind == FailureKind::Auth
    ));

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].status, MessageStatus::Error);
    assert!(messages[0].error.as_deref().unwrap().starts_with("Coding model"));
    assert!(messages.iter().all(|m| m.status != MessageStatus::Generating));
}

/// Test regenerating a response reruns both stages from the preceding user turn.
#[tokio::test]
async fn test_regenerate_response() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis v1"))
        .with_reply(ScriptedReply::text("code v1"))
        .with_reply(ScriptedReply::text("analysis v2"))
        .with_reply(ScriptedReply::text("code v2"));
    let orchestrator = Orchestrator::new(client.clone());

    orchestrator.submit("Build a login form", &config()).await.unwrap();
    let target = orchestrator.messages()[2].id.clone();

    let outcome = orchestrator
        .regenerate_response(&target, &config())
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let requests = client.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[2].prompt, "Build a login form");

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 6);
    let superseded = orchestrator.message(&target).unwrap();
    assert_eq!(superseded.status, MessageStatus::Stopped);
    assert_eq!(superseded.content, SUPERSEDED_CONTENT);
    assert_eq!(messages[3].content, "Build a login form");
    assert_eq!(messages[4].content, "analysis v2");
    assert_eq!(messages[5].content, "code v2");
    assert!(!orchestrator.is_generating());
}

/// Test regeneration is a no-op while a run is active.
#[tokio::test]
async fn test_regenerate_while_generating() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code"))
        .with_reply(ScriptedReply::text("next").held());
    let orchestrator = Orchestrator::new(client.clone());

    orchestrator.submit("first", &config()).await.unwrap();
    let target = orchestrator.messages()[1].id.clone();

    let run = spawn_submit(&orchestrator, "second");
    client.wait_for_calls(3).await;

    let outcome = orchestrator
        .regenerate_response(&target, &config())
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Ignored(IgnoreReason::Busy));
    assert_eq!(
        orchestrator.message(&target).unwrap().status,
        MessageStatus::Complete
    );

    orchestrator.stop_generation();
    run.await.unwrap().unwrap();
}

/// Test a saved chat can be reopened and continued.
#[tokio::test]
async fn test_archive_and_reopen() {
    let temp = tempdir().unwrap();
    let archive = ChatArchive::new(temp.path());

    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code"))
        .with_reply(ScriptedReply::text("analysis 2"))
        .with_reply(ScriptedReply::text("code 2"));
    let orchestrator = Orchestrator::new(client);

    orchestrator.submit("Build a login form", &config()).await.unwrap();
    let saved = orchestrator.conversation();
    archive.save(&saved).unwrap();

    orchestrator.start_new_chat();
    assert!(orchestrator.messages().is_empty());

    let summaries = archive.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].title, "Build a login form");

    orchestrator
        .open_conversation(archive.load(&saved.id).unwrap())
        .unwrap();
    assert_eq!(orchestrator.conversation_id(), saved.id);
    assert_eq!(orchestrator.messages().len(), 3);

    orchestrator.submit("Add validation", &config()).await.unwrap();
    assert_eq!(orchestrator.messages().len(), 6);
}

/// Test dropping a running submit closes the session.
#[tokio::test]
async fn test_dropped_submit_closes_session() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("never arrives").held())
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code"));
    let orchestrator = Orchestrator::new(client.clone());
    orchestrator.set_input("task");

    let timed_out =
        tokio::time::timeout(Duration::from_millis(50), orchestrator.submit("task", &config())).await;
    assert!(timed_out.is_err());

    assert!(!orchestrator.is_generating());
    assert!(orchestrator.input().is_empty());
    let statuses: Vec<_> = orchestrator.messages().iter().map(|m| m.status).collect();
    assert_eq!(statuses, vec![MessageStatus::Complete, MessageStatus::Stopped]);
    assert_eq!(orchestrator.messages()[1].content, STOPPED_CONTENT);

    let next = orchestrator.submit("again", &config()).await.unwrap();
    assert!(next.is_completed());
    assert_eq!(orchestrator.messages().len(), 5);
}

/// Test dropping a running regeneration closes the session and settles the target.
#[tokio::test]
async fn test_dropped_regenerate_settles_target() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code"))
        .with_reply(ScriptedReply::text("never arrives").held());
    let orchestrator = Orchestrator::new(client.clone());

    orchestrator.submit("task", &config()).await.unwrap();
    let target = orchestrator.messages()[2].id.clone();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        orchestrator.regenerate_response(&target, &config()),
    )
    .await;
    assert!(timed_out.is_err());

    assert!(!orchestrator.is_generating());
    let superseded = orchestrator.message(&target).unwrap();
    assert_eq!(superseded.status, MessageStatus::Stopped);
    assert_eq!(superseded.content, SUPERSEDED_CONTENT);
    assert!(orchestrator
        .messages()
        .iter()
        .all(|m| m.status.is_terminal()));
}

/// Test regeneration leaves the target alone when the preceding user turn is blank.
#[tokio::test]
async fn test_regenerate_blank_user_turn_is_ignored() {
    let client = ScriptedClient::new();
    let orchestrator = Orchestrator::new(client.clone());

    let response = Message::assistant("coder", "precious code");
    let target = response.id.clone();
    orchestrator
        .open_conversation(saved_chat(vec![Message::user("   "), response]))
        .unwrap();

    let outcome = orchestrator
        .regenerate_response(&target, &config())
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Ignored(IgnoreReason::EmptyPrompt));

    let message = orchestrator.message(&target).unwrap();
    assert_eq!(message.status, MessageStatus::Complete);
    assert_eq!(message.content, "precious code");
    assert_eq!(orchestrator.messages().len(), 2);
    assert_eq!(client.call_count(), 0);
}

/// Test regenerating a response with no user turn before it does nothing.
#[tokio::test]
async fn test_regenerate_without_preceding_user() {
    let client = ScriptedClient::new();
    let orchestrator = Orchestrator::new(client.clone());

    let greeting = Message::assistant("coder", "Hello! What shall we build?");
    let target = greeting.id.clone();
    orchestrator
        .open_conversation(saved_chat(vec![greeting, Message::user("A login form")]))
        .unwrap();

    let outcome = orchestrator
        .regenerate_response(&target, &config())
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Ignored(IgnoreReason::NoPrecedingUser));

    let message = orchestrator.message(&target).unwrap();
    assert_eq!(message.status, MessageStatus::Complete);
    assert_eq!(message.content, "Hello! What shall we build?");
    assert_eq!(orchestrator.messages().len(), 2);
    assert!(!orchestrator.is_generating());
    assert_eq!(client.call_count(), 0);
}

/// Test the target shows the regenerating placeholder while the new run is in flight.
#[tokio::test]
async fn test_regenerate_target_pending_while_running() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis v1"))
        .with_reply(ScriptedReply::text("code v1"))
        .with_reply(ScriptedReply::text("analysis v2").held())
        .with_reply(ScriptedReply::text("code v2"));
    let orchestrator = Orchestrator::new(client.clone());

    orchestrator.submit("task", &config()).await.unwrap();
    let target = orchestrator.messages()[2].id.clone();

    let run = {
        let orchestrator = orchestrator.clone();
        let target = target.clone();
        tokio::spawn(async move { orchestrator.regenerate_response(&target, &config()).await })
    };
    client.wait_for_calls(3).await;

    assert!(orchestrator.is_generating());
    let pending = orchestrator.message(&target).unwrap();
    assert_eq!(pending.status, MessageStatus::Pending);
    assert_eq!(pending.content, REGENERATING_PLACEHOLDER);
    assert!(pending.error.is_none());
    let generating: Vec<_> = orchestrator
        .messages()
        .into_iter()
        .filter(|m| m.status == MessageStatus::Generating)
        .collect();
    assert_eq!(generating.len(), 1);
    assert_eq!(generating[0].content, THINKING_PLACEHOLDER);

    client.release();
    assert!(run.await.unwrap().unwrap().is_completed());
    assert_eq!(
        orchestrator.message(&target).unwrap().content,
        SUPERSEDED_CONTENT
    );
}

/// Test stopping a regeneration mid-run.
#[tokio::test]
async fn test_stop_during_regenerate() {
    let client = ScriptedClient::new()
        .with_reply(ScriptedReply::text("analysis"))
        .with_reply(ScriptedReply::text("code"))
        .with_reply(ScriptedReply::text("late analysis").held());
    let orchestrator = Orchestrator::new(client.clone());

    orchestrator.submit("task", &config()).await.unwrap();
    let target = orchestrator.messages()[2].id.clone();

    let run = {
        let orchestrator = orchestrator.clone();
        let target = target.clone();
        tokio::spawn(async move { orchestrator.regenerate_response(&target, &config()).await })
    };
    client.wait_for_calls(3).await;

    assert!(orchestrator.stop_generation());
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped { stage: Stage::Thinking });

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2].id, target);
    assert_eq!(messages[2].status, MessageStatus::Stopped);
    assert_eq!(messages[2].content, SUPERSEDED_CONTENT);
    assert_eq!(messages[3].content, "task");
    assert_eq!(messages[4].status, MessageStatus::Stopped);
    assert_eq!(messages[4].content, STOPPED_CONTENT);
    assert!(!orchestrator.is_generating());

    client.release();
    tokio::task::yield_now().await;
    assert_eq!(orchestrator.messages()[4].content, STOPPED_CONTENT);
}
