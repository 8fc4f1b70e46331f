use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::api::SearchHit;
use crate::core::backend::testing::{hit, ScriptedBackend, StreamScript};
use crate::core::message::{Domain, Role};
use crate::core::storage::{BlobStore, MemoryBlobStore};

struct Fixture {
    backend: Arc<ScriptedBackend>,
    monitor: Arc<ConnectivityMonitor>,
    sessions: Arc<SessionStore>,
    preferences: Arc<PreferencesStore>,
    client: StreamingChatClient,
}

fn settings() -> ExchangeSettings {
    ExchangeSettings {
        replay: ReplayPacing::immediate(5),
        offline: ReplayPacing::immediate(4),
        ..ExchangeSettings::default()
    }
}

fn fixture(backend: ScriptedBackend) -> Fixture {
    fixture_with(backend, settings())
}

fn fixture_with(backend: ScriptedBackend, settings: ExchangeSettings) -> Fixture {
    let backend = Arc::new(backend);
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let monitor = Arc::new(ConnectivityMonitor::new(
        backend.clone(),
        Duration::from_secs(2),
        Duration::from_secs(10),
    ));
    let sessions = Arc::new(SessionStore::load(blobs.clone()));
    let preferences = Arc::new(PreferencesStore::load(blobs));
    let retrieval = Arc::new(RetrievalMerger::new(backend.clone(), 0.60));
    let client = StreamingChatClient::new(
        backend.clone(),
        monitor.clone(),
        sessions.clone(),
        preferences.clone(),
        retrieval,
        settings,
    );
    Fixture {
        backend,
        monitor,
        sessions,
        preferences,
        client,
    }
}

async fn drain(stream: &mut ChatStream) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }
    events
}

fn reply_text(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Chunk(chunk) => Some(chunk.as_str()),
            _ => None,
        })
        .collect()
}

async fn wait_until_idle(client: &StreamingChatClient, session_id: &str) {
    for _ in 0..100 {
        if !client.is_busy(session_id) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("exchange for {session_id} never finished");
}

#[tokio::test]
async fn hello_exchange_commits_and_auto_titles() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::frames(&[
        "data: Hi\n\n",
        "data:  there\n\n",
        "data: [DONE]\n\n",
    ])));
    let session = fx.sessions.create(None, "Mistral-7B");
    assert_eq!(session.messages.len(), 1);

    let mut stream = fx.client.send(&session.id, "Hello").expect("send");
    let events = drain(&mut stream).await;
    assert_eq!(stream.phase(), ExchangePhase::Committed);

    match &events[0] {
        ChatEvent::Decision(decision) => {
            assert_eq!(decision.domain, Domain::General);
            assert_eq!(decision.model, "Mistral-7B");
            assert_eq!(decision.confidence, 0.85);
            assert_eq!(decision.reason, "Routed via local rules (Style: normal)");
        }
        other => panic!("expected decision first, got {other:?}"),
    }
    assert!(!events
        .iter()
        .any(|event| matches!(event, ChatEvent::Context(_))));
    assert_eq!(reply_text(&events), "Hi there");
    assert_eq!(
        events.last(),
        Some(&ChatEvent::Finished(ExchangeOutcome::Committed))
    );

    let committed = fx.sessions.get(&session.id).expect("session");
    assert_eq!(committed.title, "Hello");
    assert_eq!(committed.messages.len(), 3);
    let roles: Vec<_> = committed.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    let reply = &committed.messages[2];
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.model_used.as_deref(), Some("Mistral-7B"));
    assert_eq!(reply.domain, Some(Domain::General));
    assert_eq!(committed.last_message, "Hi there");

    // "Hello" is a greeting, so no retrieval call was made.
    assert_eq!(fx.backend.calls(), 1);
    let requests = fx.backend.stream_requests();
    assert_eq!(requests[0].text, "Hello");
    assert_eq!(requests[0].system, None);
    assert!(!fx.client.is_busy(&session.id));
}

#[tokio::test]
async fn only_the_first_exchange_sets_the_title() {
    let fx = fixture(
        ScriptedBackend::new().with_stream(StreamScript::frames(&["data: ok\n\n"])),
    );
    let session = fx.sessions.create(None, "Mistral-7B");

    let long = "Please help me plan a vegetable garden for spring";
    let (_, outcome) = fx
        .client
        .send(&session.id, long)
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(outcome, ExchangeOutcome::Committed);
    let title = fx.sessions.get(&session.id).expect("session").title;
    assert_eq!(title, "Please help me plan a vegetabl...");

    fx.client
        .send(&session.id, "And what about tomatoes?")
        .expect("send")
        .collect_reply()
        .await;
    let after = fx.sessions.get(&session.id).expect("session");
    assert_eq!(after.title, title);
    assert_eq!(after.messages.len(), 5);
}

#[tokio::test]
async fn auto_title_can_be_disabled() {
    let fx = fixture(
        ScriptedBackend::new().with_stream(StreamScript::frames(&["data: ok\n\n"])),
    );
    fx.preferences
        .update(|prefs| prefs.set_field("auto-title", "off"))
        .expect("pref");
    let session = fx.sessions.create(Some("Pinned"), "Mistral-7B");

    fx.client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(fx.sessions.get(&session.id).expect("session").title, "Pinned");
}

#[test]
fn titles_are_truncated_by_grapheme() {
    assert_eq!(derive_title("Hello"), "Hello");
    assert_eq!(derive_title(&"a".repeat(30)), "a".repeat(30));
    assert_eq!(derive_title(&"a".repeat(31)), format!("{}...", "a".repeat(30)));

    let family = "👨‍👩‍👧";
    let title = derive_title(&family.repeat(31));
    assert_eq!(title, format!("{}...", family.repeat(30)));
}

#[tokio::test]
async fn offline_round_trip_makes_no_network_calls() {
    let fx = fixture(ScriptedBackend::new());
    fx.backend.set_healthy(false);
    assert!(fx.monitor.probe().await.is_offline());
    let calls_after_probe = fx.backend.calls();

    let session = fx.sessions.create(None, "Mistral-7B");
    let mut stream = fx
        .client
        .send(&session.id, "Tell me about the weather")
        .expect("send");
    let events = drain(&mut stream).await;

    assert_eq!(fx.backend.calls(), calls_after_probe);
    match &events[0] {
        ChatEvent::Decision(decision) => assert_eq!(decision.model, OFFLINE_MODEL),
        other => panic!("expected decision first, got {other:?}"),
    }
    let reply = reply_text(&events);
    assert!(reply.starts_with("[Mistral-7B DEMO MODE - NORMAL]"));
    assert!(reply.contains("127.0.0.1:8000"));
    let chunks = events
        .iter()
        .filter(|event| matches!(event, ChatEvent::Chunk(_)))
        .count();
    assert!(chunks > 1);
    assert_eq!(
        events.last(),
        Some(&ChatEvent::Finished(ExchangeOutcome::Committed))
    );

    let committed = fx.sessions.get(&session.id).expect("session");
    assert_eq!(committed.messages.len(), 3);
    assert_eq!(committed.messages[2].content, reply);
    assert_eq!(committed.messages[2].model_used.as_deref(), Some(OFFLINE_MODEL));
}

#[tokio::test]
async fn mid_stream_drop_leaves_session_unchanged() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::DropAfter(vec![
        b"data: Hel".to_vec(),
        b"lo\n\ndata: wor".to_vec(),
    ])));
    let session = fx.sessions.create(None, "Mistral-7B");
    let before = fx.sessions.get(&session.id).expect("session");

    let mut stream = fx
        .client
        .send(&session.id, "Write me a poem about rivers")
        .expect("send");
    let events = drain(&mut stream).await;
    assert_eq!(stream.phase(), ExchangePhase::Failed);

    assert!(events.contains(&ChatEvent::Chunk("Hello".to_string())));
    assert!(reply_text(&events).contains("CORE OFFLINE"));
    assert_eq!(
        events.last(),
        Some(&ChatEvent::Finished(ExchangeOutcome::Failed(
            "the connection could not be completed".to_string()
        )))
    );

    assert_eq!(fx.sessions.get(&session.id).expect("session"), before);
    assert!(fx.monitor.is_offline());
    assert!(fx.monitor.should_skip_probe());
}

#[tokio::test]
async fn refused_stream_fails_with_status_summary() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::Refuse(503)));
    let session = fx.sessions.create(None, "Mistral-7B");

    let (reply, outcome) = fx
        .client
        .send(&session.id, "Summarize my week")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(
        outcome,
        ExchangeOutcome::Failed("the backend answered with HTTP 503".to_string())
    );
    assert!(reply.contains("HTTP 503"));
    assert_eq!(fx.sessions.get(&session.id).expect("session").messages.len(), 1);
}

#[tokio::test]
async fn second_send_while_in_flight_is_busy() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::Hang(Vec::new())));
    let first = fx.sessions.create(None, "Mistral-7B");
    let second = fx.sessions.create(None, "Mistral-7B");

    let stream = fx.client.send(&first.id, "Hello").expect("send");
    assert!(fx.client.is_busy(&first.id));
    assert!(matches!(
        fx.client.send(&first.id, "Hello again"),
        Err(SendError::Busy(_))
    ));

    let other = fx.client.send(&second.id, "Hello").expect("other session");

    drop(stream);
    wait_until_idle(&fx.client, &first.id).await;
    assert!(fx.client.send(&first.id, "Retry").is_ok());
    drop(other);
}

#[tokio::test]
async fn dropping_the_stream_discards_the_exchange() {
    let fx = fixture(
        ScriptedBackend::new().with_stream(StreamScript::Hang(vec![b"data: partial\n\n".to_vec()])),
    );
    let session = fx.sessions.create(None, "Mistral-7B");
    let before = fx.sessions.get(&session.id).expect("session");

    let mut stream = fx.client.send(&session.id, "Hello").expect("send");
    assert!(matches!(
        stream.next_event().await,
        Some(ChatEvent::Decision(_))
    ));
    assert_eq!(
        stream.next_event().await,
        Some(ChatEvent::Chunk("partial".to_string()))
    );
    assert_eq!(stream.phase(), ExchangePhase::Streaming);

    drop(stream);
    wait_until_idle(&fx.client, &session.id).await;
    assert_eq!(fx.sessions.get(&session.id).expect("session"), before);
}

#[tokio::test]
async fn cancel_ends_the_event_stream() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::Hang(Vec::new())));
    let session = fx.sessions.create(None, "Mistral-7B");

    let mut stream = fx.client.send(&session.id, "Hello").expect("send");
    stream.cancel();
    let events = drain(&mut stream).await;
    assert!(!events
        .iter()
        .any(|event| matches!(event, ChatEvent::Finished(_))));
    assert_eq!(fx.sessions.get(&session.id).expect("session").messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_stream_times_out() {
    let fx = fixture_with(
        ScriptedBackend::new().with_stream(StreamScript::Hang(vec![b"data: slow\n\n".to_vec()])),
        ExchangeSettings {
            idle_timeout: Duration::from_secs(120),
            ..settings()
        },
    );
    let session = fx.sessions.create(None, "Mistral-7B");

    let (reply, outcome) = fx
        .client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert!(reply.starts_with("slow"));
    assert_eq!(
        outcome,
        ExchangeOutcome::Failed("the backend stopped responding".to_string())
    );
    assert_eq!(fx.sessions.get(&session.id).expect("session").messages.len(), 1);
    assert!(fx.monitor.is_offline());
}

#[tokio::test]
async fn retrieved_context_is_announced_and_attached() {
    let fx = fixture(
        ScriptedBackend::new()
            .with_hits(vec![
                hit("Monthly budget is 500", Some(0.9)),
                hit("Unrelated note", Some(0.4)),
            ])
            .with_stream(StreamScript::frames(&["data: About 500.\n\ndata: [DONE]\n\n"])),
    );
    let session = fx.sessions.create(None, "Mistral-7B");

    let mut stream = fx
        .client
        .send(&session.id, "What is my monthly budget?")
        .expect("send");
    let events = drain(&mut stream).await;

    let contexts: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Context(items) => Some(items),
            _ => None,
        })
        .collect();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].len(), 1);
    assert_eq!(contexts[0][0].content, "Monthly budget is 500");
    assert!(matches!(events[1], ChatEvent::Context(_)));

    let request = &fx.backend.stream_requests()[0];
    assert_eq!(
        request.system.as_deref(),
        Some("Relevant context:\nMonthly budget is 500")
    );

    let committed = fx.sessions.get(&session.id).expect("session");
    let attached = committed.messages[2]
        .context_used
        .as_ref()
        .expect("context attached");
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].relevance_score, Some(0.9));
}

#[tokio::test]
async fn retrieval_can_be_turned_off() {
    let fx = fixture_with(
        ScriptedBackend::new()
            .with_hits(vec![hit("Monthly budget is 500", Some(0.9))])
            .with_stream(StreamScript::frames(&["data: ok\n\n"])),
        ExchangeSettings {
            use_retrieval: false,
            ..settings()
        },
    );
    let session = fx.sessions.create(None, "Mistral-7B");
    fx.client
        .send(&session.id, "What is my monthly budget?")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(fx.backend.calls(), 1);
    assert_eq!(fx.backend.stream_requests()[0].system, None);
}

#[tokio::test]
async fn error_frames_are_skipped() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::frames(&[
        "data: [error] upstream hiccup\n\n",
        "data: still here\n\n",
        "data: [DONE]\n\n",
    ])));
    let session = fx.sessions.create(None, "Mistral-7B");

    let (reply, outcome) = fx
        .client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(reply, "still here");
    assert_eq!(outcome, ExchangeOutcome::Committed);
}

#[tokio::test]
async fn empty_reply_commits_placeholder() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::frames(&["data: [DONE]\n\n"])));
    let session = fx.sessions.create(None, "Mistral-7B");

    let (reply, _) = fx
        .client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(reply, EMPTY_REPLY_PLACEHOLDER);
    let committed = fx.sessions.get(&session.id).expect("session");
    assert_eq!(committed.messages[2].content, EMPTY_REPLY_PLACEHOLDER);
}

#[tokio::test]
async fn one_shot_reply_is_replayed_in_chunks() {
    let fx = fixture(ScriptedBackend::new().with_reply("Hello from the one-shot path"));
    fx.preferences
        .update(|prefs| prefs.set_field("streaming", "off"))
        .expect("pref");
    let session = fx.sessions.create(None, "Mistral-7B");

    let mut stream = fx.client.send(&session.id, "Hello").expect("send");
    let events = drain(&mut stream).await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Chunk(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .collect();
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 5));
    assert_eq!(chunks.concat(), "Hello from the one-shot path");

    let requests = fx.backend.chat_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].style, "normal");
    assert_eq!(requests[0].model_override.as_deref(), Some("Mistral-7B"));
    assert!(fx.backend.stream_requests().is_empty());
    assert_eq!(
        fx.sessions.get(&session.id).expect("session").messages[2].content,
        "Hello from the one-shot path"
    );
}

#[tokio::test]
async fn one_shot_context_merges_hits_and_memory_ids_once() {
    let fx = fixture(
        ScriptedBackend::new()
            .with_hits(vec![SearchHit {
                id: Some("m1".to_string()),
                ..hit("Monthly budget is 500", Some(0.9))
            }])
            .with_reply("About 500.")
            .with_memory_ids(&["m1", "0123456789abcdef"]),
    );
    fx.preferences
        .update(|prefs| prefs.set_field("streaming", "off"))
        .expect("pref");
    let session = fx.sessions.create(None, "Mistral-7B");

    let mut stream = fx
        .client
        .send(&session.id, "What is my monthly budget?")
        .expect("send");
    let events = drain(&mut stream).await;

    let contexts: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Context(items) => Some(items.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(contexts.len(), 1, "events={events:?}");
    let announced: Vec<_> = contexts[0].iter().map(|item| item.content.as_str()).collect();
    assert_eq!(announced, vec!["Monthly budget is 500", "Ref: 01234567..."]);
    assert!(matches!(events[1], ChatEvent::Context(_)));
    assert!(matches!(events[2], ChatEvent::Chunk(_)));

    assert_eq!(
        fx.backend.chat_requests()[0].system.as_deref(),
        Some("Relevant context:\nMonthly budget is 500")
    );
    let committed = fx.sessions.get(&session.id).expect("session");
    assert_eq!(committed.messages[2].context_used.as_ref(), Some(&contexts[0]));
}

#[tokio::test(start_paused = true)]
async fn silent_one_shot_reply_times_out() {
    let fx = fixture_with(
        ScriptedBackend::new().with_reply("never delivered"),
        ExchangeSettings {
            idle_timeout: Duration::from_secs(120),
            ..settings()
        },
    );
    fx.backend.set_chat_hangs(true);
    fx.preferences
        .update(|prefs| prefs.set_field("streaming", "off"))
        .expect("pref");
    let session = fx.sessions.create(None, "Mistral-7B");

    let (_, outcome) = fx
        .client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(
        outcome,
        ExchangeOutcome::Failed("the backend stopped responding".to_string())
    );
    assert_eq!(fx.sessions.get(&session.id).expect("session").messages.len(), 1);
    assert!(fx.monitor.is_offline());
}

#[tokio::test]
async fn phase_is_idle_until_the_exchange_starts() {
    let fx = fixture(ScriptedBackend::new().with_stream(StreamScript::frames(&["data: ok\n\n"])));
    let session = fx.sessions.create(None, "Mistral-7B");

    let mut stream = fx.client.send(&session.id, "Hello").expect("send");
    assert_eq!(stream.phase(), ExchangePhase::Idle);
    drain(&mut stream).await;
    assert_eq!(stream.phase(), ExchangePhase::Committed);
}

#[tokio::test]
async fn send_rejects_blank_text_and_unknown_sessions() {
    let fx = fixture(ScriptedBackend::new());
    let session = fx.sessions.create(None, "Mistral-7B");
    assert!(matches!(
        fx.client.send(&session.id, "   "),
        Err(SendError::EmptyMessage)
    ));
    assert!(matches!(
        fx.client.send("missing", "Hello"),
        Err(SendError::SessionNotFound(_))
    ));
    assert_eq!(fx.backend.calls(), 0);
}

#[tokio::test]
async fn success_after_outage_restores_online_state() {
    let fx = fixture(
        ScriptedBackend::new().with_stream(StreamScript::frames(&["data: back\n\n"])),
    );
    fx.monitor.mark_offline();
    // Cooldown active: the exchange answers locally.
    let session = fx.sessions.create(None, "Mistral-7B");
    fx.client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(fx.backend.calls(), 0);

    fx.monitor.mark_online();
    let (reply, outcome) = fx
        .client
        .send(&session.id, "Hello")
        .expect("send")
        .collect_reply()
        .await;
    assert_eq!(reply, "back");
    assert_eq!(outcome, ExchangeOutcome::Committed);
    assert!(!fx.monitor.is_offline());
}
