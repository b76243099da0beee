//! Relay integration tests against scripted providers and a recording store.

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;

use haven::conversation::{ConversationMessage, PromptPolicy, Role};
use haven::relay::{ChatRequest, RelayError, RelayOutcome, RelayStream, StreamEnd};

mod common;
use common::{RecordingStore, Script, ScriptedProvider, delta_frame, done_frame, test_relay};

const SECOND: u64 = 1_000;

fn turn(conversation_id: &str, text: &str) -> ChatRequest {
    ChatRequest::new(conversation_id, vec![ConversationMessage::user(text)], "u1")
}

fn expect_stream(outcome: RelayOutcome) -> RelayStream {
    match outcome {
        RelayOutcome::Streaming(stream) => stream,
        RelayOutcome::Throttled(notice) => panic!("unexpected throttle: {}", notice.message),
    }
}

/// Drain the deltas and wait for the background task.
async fn drain(stream: RelayStream) -> (String, StreamEnd) {
    let RelayStream { deltas, completion } = stream;
    let chunks: Vec<Bytes> = deltas.collect().await;
    let text = chunks
        .iter()
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<String>();
    (text, completion.await.unwrap())
}

#[tokio::test]
async fn test_deltas_delivered_and_persisted_in_order() {
    let provider = ScriptedProvider::replying(&["Hel", "lo", " wor", "ld"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "Hello world");
    assert!(end.is_clean());
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        store.messages(),
        vec![
            ("c1".to_string(), Role::User, "hi".to_string()),
            ("c1".to_string(), Role::Assistant, "Hello world".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let mut malformed = delta_frame("a").to_vec();
    malformed.extend_from_slice(b"data: {not json}\n\n");
    malformed.extend_from_slice(b": keep-alive\n\n");
    malformed.extend_from_slice(b"data: {\"choices\":[]}\n\n");
    let provider = ScriptedProvider::new(Script::Chunks(vec![
        Bytes::from(malformed),
        delta_frame("b"),
        done_frame(),
    ]));
    let store = RecordingStore::new();
    let relay = test_relay(provider, store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "ab");
    assert_eq!(
        end,
        StreamEnd::Completed {
            content: "ab".to_string()
        }
    );
    assert_eq!(store.messages()[1].2, "ab");
}

#[tokio::test]
async fn test_frames_split_across_reads() {
    let whole = delta_frame("Hello");
    let (head, tail) = whole.split_at(11);
    let provider = ScriptedProvider::new(Script::Chunks(vec![
        Bytes::copy_from_slice(head),
        Bytes::copy_from_slice(tail),
        done_frame(),
    ]));
    let store = RecordingStore::new();
    let relay = test_relay(provider, store);

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "Hello");
    assert!(end.is_clean());
}

#[tokio::test]
async fn test_truncated_reply_is_not_persisted() {
    let provider = ScriptedProvider::new(Script::ChunksThenError(vec![delta_frame("Par")]));
    let store = RecordingStore::new();
    let relay = test_relay(provider, store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "Par");
    assert_eq!(
        end,
        StreamEnd::Truncated {
            delivered: "Par".to_string()
        }
    );
    // Only the user message made it.
    assert_eq!(
        store.messages(),
        vec![("c1".to_string(), Role::User, "hi".to_string())]
    );
}

#[tokio::test]
async fn test_stream_without_done_marker_is_truncated() {
    let provider = ScriptedProvider::new(Script::Chunks(vec![delta_frame("almost")]));
    let store = RecordingStore::new();
    let relay = test_relay(provider, store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "almost");
    assert!(!end.is_clean());
    assert_eq!(store.messages().len(), 1);
}

#[tokio::test]
async fn test_throttle_short_circuits() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store.clone());

    for t in 0..5 {
        let outcome = relay.relay_at(turn("c1", "hi"), t * SECOND).await.unwrap();
        drain(expect_stream(outcome)).await;
    }
    let calls_before = provider.calls();
    let stored_before = store.messages().len();

    let outcome = relay.relay_at(turn("c1", "one more"), 5 * SECOND).await.unwrap();
    let RelayOutcome::Throttled(notice) = outcome else {
        panic!("sixth turn inside the window must be throttled");
    };

    assert_eq!(notice.kind, "throttle");
    assert_eq!(
        notice.message,
        "Take a few moments to breathe and think. I'll be right here when you're ready."
    );
    assert_eq!(provider.calls(), calls_before);
    assert_eq!(store.messages().len(), stored_before);
}

#[tokio::test]
async fn test_scenario_u1() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store);

    for t in 0..5 {
        let outcome = relay.relay_at(turn("c1", "hi"), t * SECOND).await.unwrap();
        assert!(matches!(outcome, RelayOutcome::Streaming(_)), "t={t}s");
    }
    assert!(matches!(
        relay.relay_at(turn("c1", "hi"), 5 * SECOND).await.unwrap(),
        RelayOutcome::Throttled(_)
    ));
    assert!(matches!(
        relay.relay_at(turn("c1", "hi"), 121 * SECOND).await.unwrap(),
        RelayOutcome::Streaming(_)
    ));
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_identity_falls_back_to_conversation() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider, store);

    let anonymous = |conversation: &str| ChatRequest {
        conversation_id: conversation.to_string(),
        messages: vec![ConversationMessage::user("hi")],
        identity: None,
    };

    for t in 0..5 {
        relay.relay_at(anonymous("a"), t).await.unwrap();
    }
    assert!(matches!(
        relay.relay_at(anonymous("a"), 10).await.unwrap(),
        RelayOutcome::Throttled(_)
    ));
    // A different conversation is a different caller.
    assert!(matches!(
        relay.relay_at(anonymous("b"), 10).await.unwrap(),
        RelayOutcome::Streaming(_)
    ));
}

#[tokio::test]
async fn test_upstream_unavailable() {
    let provider = ScriptedProvider::new(Script::Unavailable);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store.clone());

    let err = relay.relay(turn("c1", "hi")).await.unwrap_err();
    assert!(matches!(err, RelayError::Upstream(_)));
    assert_eq!(provider.calls(), 1);
    // The user turn is still recorded.
    assert_eq!(store.wait_for_messages(1).await.len(), 1);
}

#[tokio::test]
async fn test_invalid_request_is_not_admitted() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store.clone());

    let err = relay
        .relay(ChatRequest::new("c1", Vec::new(), "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::InvalidRequest(_)));
    assert_eq!(relay.limiter().tracked_identities(), 0);
    assert_eq!(provider.calls(), 0);
    assert!(store.messages().is_empty());
}

#[tokio::test]
async fn test_store_failure_does_not_interrupt_reply() {
    let provider = ScriptedProvider::replying(&["still ", "here"]);
    let store = RecordingStore::new();
    store.fail_writes();
    let relay = test_relay(provider, store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let (text, end) = drain(expect_stream(outcome)).await;

    assert_eq!(text, "still here");
    assert!(end.is_clean());
    assert!(store.messages().is_empty());
}

#[tokio::test]
async fn test_context_window_and_prompt_selection() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider.clone(), store.clone());

    let mut messages = Vec::new();
    for i in 0..6 {
        messages.push(ConversationMessage::user(format!("question {i}")));
        messages.push(ConversationMessage::assistant(format!("answer {i}")));
    }
    messages.push(ConversationMessage::user("latest"));

    let outcome = relay
        .relay(ChatRequest::new("c1", messages.clone(), "u1"))
        .await
        .unwrap();
    drain(expect_stream(outcome)).await;

    let request = provider.last_request().unwrap();
    assert_eq!(request.messages.len(), 8);
    assert_eq!(request.messages, messages[messages.len() - 8..].to_vec());
    assert_eq!(request.system_prompt, PromptPolicy::default().select(7));
    assert_eq!(store.messages()[0].2, "latest");
}

#[tokio::test]
async fn test_trailing_assistant_message_is_not_stored_as_user() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let store = RecordingStore::new();
    let relay = test_relay(provider, store.clone());

    let messages = vec![
        ConversationMessage::user("hi"),
        ConversationMessage::assistant("hello"),
    ];
    let outcome = relay
        .relay(ChatRequest::new("c1", messages, "u1"))
        .await
        .unwrap();
    drain(expect_stream(outcome)).await;

    assert_eq!(
        store.messages(),
        vec![("c1".to_string(), Role::Assistant, "ok".to_string())]
    );
}

#[tokio::test]
async fn test_slow_store_does_not_delay_reply() {
    let provider = ScriptedProvider::replying(&["Hel", "lo"]);
    let store = RecordingStore::slow(Duration::from_secs(1));
    let relay = test_relay(provider.clone(), store.clone());

    let started = Instant::now();
    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "relay waited {:?} for the store",
        started.elapsed()
    );
    assert_eq!(provider.calls(), 1);

    let RelayStream { deltas, completion } = expect_stream(outcome);
    let chunks: Vec<Bytes> = deltas.collect().await;
    assert_eq!(chunks.concat(), b"Hello");
    assert!(started.elapsed() < Duration::from_millis(500));

    // Completion waits for both writes, user turn first.
    assert!(completion.await.unwrap().is_clean());
    assert_eq!(
        store.messages(),
        vec![
            ("c1".to_string(), Role::User, "hi".to_string()),
            ("c1".to_string(), Role::Assistant, "Hello".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_caller_disconnect_persists_nothing() {
    let provider = ScriptedProvider::new(Script::ChunksThenPending(vec![delta_frame("Par")]));
    let store = RecordingStore::new();
    let relay = test_relay(provider, store.clone());

    let outcome = relay.relay(turn("c1", "hi")).await.unwrap();
    let RelayStream {
        mut deltas,
        completion,
    } = expect_stream(outcome);

    assert_eq!(deltas.next().await.unwrap(), Bytes::from_static(b"Par"));
    drop(deltas);

    let end = tokio::time::timeout(Duration::from_secs(5), completion)
        .await
        .expect("relay kept reading after the caller left")
        .unwrap();
    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(
        store.messages(),
        vec![("c1".to_string(), Role::User, "hi".to_string())]
    );
}
