mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use oai_rt_session::sdk::{TransportOptions, UserTranscript};
use oai_rt_session::{
    ConnectionState, ControlChannel, Error, EventHandlers, HintChannel, PeerState, TranscriptChunk,
    TransportConfig, Voice,
};
use serde_json::json;
use support::{Harness, audio_delta, settle, wait_until};

fn recording_handlers() -> (Arc<EventHandlers>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
    let handlers = EventHandlers::new()
        .on_state(move |s| a.lock().unwrap().push(format!("state:{s}")))
        .on_agent_speaking(move |s| b.lock().unwrap().push(format!("speaking:{s}")))
        .on_error(move |e| c.lock().unwrap().push(format!("error:{e}")));
    (Arc::new(handlers), log)
}

#[tokio::test]
async fn test_connect_walks_states_and_requests_voice() {
    let h = Harness::new();
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));

    transport
        .connect("Be brief.", Voice::Cedar)
        .await
        .expect("connect");

    assert_eq!(transport.state(), ConnectionState::Connected);
    assert_eq!(transport.call_id().as_deref(), Some("rtc_test"));
    assert_eq!(h.broker.requests(), vec![("Be brief.".to_string(), Voice::Cedar)]);
    assert_eq!(h.exchange.offers().len(), 1);

    let peer = h.engine.peer(0);
    assert_eq!(peer.added_tracks(), vec!["mic-0".to_string()]);
    assert!(peer.remote_answer().is_some_and(|a| a.contains("mock-answer")));
    assert_eq!(peer.channel().label(), "oai-events");

    assert_eq!(
        *log.lock().unwrap(),
        vec!["state:connecting".to_string(), "state:connected".to_string()]
    );
}

#[tokio::test]
async fn test_connect_while_connecting_is_ignored() {
    let h = Harness::new();
    h.engine.set_manual_connect(true);
    let transport = h.transport(TransportOptions::new("main"));

    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.connect("first", Voice::Marin).await })
    };
    wait_until("first peer", || h.engine.peers().len() == 1).await;
    assert_eq!(transport.state(), ConnectionState::Connecting);

    transport.connect("second", Voice::Verse).await.expect("ignored connect");
    assert_eq!(h.broker.requests().len(), 1);
    assert_eq!(h.engine.peers().len(), 1);

    wait_until("channel created", || h.engine.peer(0).has_channel()).await;
    wait_until("answer applied", || h.engine.peer(0).remote_answer().is_some()).await;
    h.engine.peer(0).come_up();
    pending.await.expect("join").expect("first connect");
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_connect_times_out_and_releases_everything() {
    let h = Harness::new();
    h.engine.set_manual_connect(true);
    let (handlers, log) = recording_handlers();
    let config = TransportConfig::new().connect_timeout(Duration::from_millis(50));
    let transport = h.transport_with(config, TransportOptions::new("main").handlers(handlers));

    let err = transport.connect("hi", Voice::Marin).await.unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert_eq!(h.engine.live_captures(), 0);
    assert_eq!(h.engine.open_channels(), 0);
    assert!(h.engine.peer(0).is_closed());
    assert!(matches!(transport.last_error().as_deref(), Some(Error::Timeout(_))));
    let log = log.lock().unwrap();
    assert_eq!(log.last().map(String::as_str), Some("error:Connection timed out after 50ms"));
}

#[tokio::test]
async fn test_timeout_covers_a_stalled_capture() {
    let h = Harness::new();
    h.engine.stall_capture();
    let config = TransportConfig::new().connect_timeout(Duration::from_millis(50));
    let transport = h.transport_with(config, TransportOptions::new("main"));

    let err = tokio::time::timeout(Duration::from_secs(1), transport.connect("hi", Voice::Marin))
        .await
        .expect("connect settles within its own timeout")
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(h.engine.peer(0).is_closed());
    assert_eq!(h.engine.live_captures(), 0);
    assert!(h.exchange.offers().is_empty());
}

#[tokio::test]
async fn test_dropped_connect_releases_the_attempt() {
    let h = Harness::new();
    h.engine.set_manual_connect(true);
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), transport.connect("first", Voice::Marin)).await;

    assert!(abandoned.is_err());
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert_eq!(h.engine.live_captures(), 0);
    assert!(h.engine.peer(0).is_closed());
    assert!(transport.last_error().is_none());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["state:connecting".to_string(), "state:disconnected".to_string()]
    );

    h.engine.set_manual_connect(false);
    transport.connect("second", Voice::Marin).await.expect("second connect");
    assert!(transport.is_connected());
    assert_eq!(h.broker.requests().len(), 2);
    assert_eq!(h.engine.live_captures(), 1);
}

#[tokio::test]
async fn test_capture_denied_closes_peer() {
    let h = Harness::new();
    h.engine.deny_capture("permission denied");
    let transport = h.transport(TransportOptions::new("main"));

    let err = transport.connect("hi", Voice::Marin).await.unwrap_err();

    assert!(matches!(err, Error::Capture(ref m) if m == "permission denied"));
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(h.engine.peer(0).is_closed());
    assert!(h.exchange.offers().is_empty());
}

#[tokio::test]
async fn test_broker_rejection_creates_no_peer() {
    let h = Harness::new();
    h.broker.reject_with("quota exceeded");
    let transport = h.transport(TransportOptions::new("main"));

    let err = transport.connect("hi", Voice::Marin).await.unwrap_err();

    assert!(matches!(err, Error::Credential(ref m) if m == "quota exceeded"));
    assert!(h.engine.peers().is_empty());
    assert_eq!(h.engine.live_captures(), 0);
    assert_eq!(transport.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let h = Harness::new();
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));

    transport.disconnect();
    transport.connect("hi", Voice::Marin).await.expect("connect");
    transport.disconnect();
    transport.disconnect();

    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(h.engine.peer(0).is_closed());
    assert!(h.engine.peer(0).channel().is_closed());
    assert_eq!(h.engine.live_captures(), 0);
    assert_eq!(h.engine.detached.load(std::sync::atomic::Ordering::SeqCst), 1);
    let disconnects = log
        .lock()
        .unwrap()
        .iter()
        .filter(|l| *l == "state:disconnected")
        .count();
    assert_eq!(disconnects, 1);
    assert!(!transport.send_event(&oai_rt_session::ClientEvent::response_create()));
}

#[tokio::test]
async fn test_reconnect_after_disconnect_uses_fresh_resources() {
    let h = Harness::new();
    let transport = h.transport(TransportOptions::new("main"));

    transport.connect("one", Voice::Marin).await.expect("first");
    transport.disconnect();
    transport.connect("two", Voice::Marin).await.expect("second");

    assert_eq!(h.engine.peers().len(), 2);
    assert!(h.engine.peer(0).is_closed());
    assert!(!h.engine.peer(1).is_closed());
    assert_eq!(h.engine.live_captures(), 1);
}

#[tokio::test]
async fn test_remote_error_keeps_connection() {
    let h = Harness::new();
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));
    transport.connect("hi", Voice::Marin).await.expect("connect");

    h.engine.peer(0).channel().inject(&json!({
        "type": "error",
        "event_id": "evt_err",
        "error": { "type": "invalid_request_error", "code": "bad_value", "message": "Nope" }
    }));

    wait_until("error handler", || {
        log.lock().unwrap().iter().any(|l| l.starts_with("error:"))
    })
    .await;
    assert!(transport.is_connected());
    assert!(matches!(
        transport.last_error().as_deref(),
        Some(Error::Remote(e)) if e.message == "Nope"
    ));
}

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let h = Harness::new();
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));
    transport.connect("hi", Voice::Marin).await.expect("connect");

    let channel = h.engine.peer(0).channel();
    channel.inject_raw("{not json");
    channel.inject_raw("[1, 2, 3]");
    channel.inject(&audio_delta());

    wait_until("speaking", || transport.agent_speaking()).await;
    assert!(transport.is_connected());
    assert!(!log.lock().unwrap().iter().any(|l| l.starts_with("error:")));
}

#[tokio::test]
async fn test_speaking_follows_audio_and_barge_in() {
    let h = Harness::new();
    let (handlers, log) = recording_handlers();
    let transport = h.transport(TransportOptions::new("main").handlers(handlers));
    transport.connect("hi", Voice::Marin).await.expect("connect");
    let channel = h.engine.peer(0).channel();

    channel.inject(&audio_delta());
    channel.inject(&audio_delta());
    wait_until("speaking", || transport.agent_speaking()).await;

    channel.inject(&json!({
        "type": "input_audio_buffer.speech_started",
        "event_id": "evt_vad",
        "audio_start_ms": 1200,
        "item_id": "item_user"
    }));
    wait_until("barge-in", || !transport.agent_speaking()).await;

    let speaking: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.starts_with("speaking:"))
        .cloned()
        .collect();
    assert_eq!(speaking, vec!["speaking:true".to_string(), "speaking:false".to_string()]);
}

#[tokio::test]
async fn test_transcripts_carry_final_flag() {
    let h = Harness::new();
    let chunks: Arc<Mutex<Vec<TranscriptChunk>>> = Arc::default();
    let users: Arc<Mutex<Vec<UserTranscript>>> = Arc::default();
    let (c, u) = (Arc::clone(&chunks), Arc::clone(&users));
    let handlers = EventHandlers::new()
        .on_transcript(move |chunk| c.lock().unwrap().push(chunk))
        .on_user_transcript(move |t| u.lock().unwrap().push(t));
    let transport = h.transport(TransportOptions::new("main").handlers(Arc::new(handlers)));
    transport.connect("hi", Voice::Marin).await.expect("connect");
    let channel = h.engine.peer(0).channel();

    channel.inject(&json!({
        "type": "response.output_audio_transcript.delta",
        "response_id": "resp_1", "item_id": "item_1", "delta": "Hello "
    }));
    channel.inject(&json!({
        "type": "response.audio_transcript.done",
        "response_id": "resp_1", "item_id": "item_1", "transcript": "Hello there."
    }));
    channel.inject(&json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "item_user", "transcript": "Next slide please"
    }));

    wait_until("user transcript", || !users.lock().unwrap().is_empty()).await;
    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "Hello ");
    assert!(!chunks[0].is_final);
    assert_eq!(chunks[1].text, "Hello there.");
    assert!(chunks[1].is_final);
    assert_eq!(users.lock().unwrap()[0].transcript, "Next slide please");
}

#[tokio::test]
async fn test_unknown_events_reach_raw_handler_only() {
    let h = Harness::new();
    let kinds: Arc<Mutex<Vec<String>>> = Arc::default();
    let k = Arc::clone(&kinds);
    let handlers = EventHandlers::new().on_raw_event(move |e| k.lock().unwrap().push(e.kind().to_string()));
    let transport = h.transport(TransportOptions::new("main").handlers(Arc::new(handlers)));
    transport.connect("hi", Voice::Marin).await.expect("connect");

    let channel = h.engine.peer(0).channel();
    channel.inject(&json!({ "type": "rate_limits.updated", "rate_limits": [] }));
    channel.inject(&audio_delta());

    wait_until("two events", || kinds.lock().unwrap().len() == 2).await;
    assert_eq!(kinds.lock().unwrap()[1], "response.output_audio.delta");
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_remote_close_releases_everything() {
    let h = Harness::new();
    let transport = h.transport(TransportOptions::new("main"));
    transport.connect("hi", Voice::Marin).await.expect("connect");
    h.engine.peer(0).channel().inject(&audio_delta());
    wait_until("speaking", || transport.agent_speaking()).await;

    h.engine.peer(0).channel().remote_close();

    wait_until("disconnected", || transport.state() == ConnectionState::Disconnected).await;
    assert!(!transport.agent_speaking());
    assert!(h.engine.peer(0).is_closed());
    assert_eq!(h.engine.live_captures(), 0);
}

#[tokio::test]
async fn test_peer_failure_releases_everything() {
    let h = Harness::new();
    let transport = h.transport(TransportOptions::new("main"));
    transport.connect("hi", Voice::Marin).await.expect("connect");

    h.engine.peer(0).set_state(PeerState::Failed);

    wait_until("disconnected", || transport.state() == ConnectionState::Disconnected).await;
    assert!(h.engine.peer(0).channel().is_closed());
    assert_eq!(h.engine.live_captures(), 0);
}

#[tokio::test]
async fn test_remote_track_attaches_to_playback() {
    let h = Harness::new();
    let transport = h.transport(TransportOptions::new("main"));
    transport.connect("hi", Voice::Marin).await.expect("connect");

    h.engine.peer(0).push_remote_track("agent-audio");

    wait_until("attached", || !h.engine.attached.lock().unwrap().is_empty()).await;
    assert_eq!(*h.engine.attached.lock().unwrap(), vec!["agent-audio".to_string()]);
}

#[tokio::test]
async fn test_messages_before_link_up_are_replayed() {
    let h = Harness::new();
    h.engine.set_manual_connect(true);
    let transport = h.transport(TransportOptions::new("main"));
    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.connect("hi", Voice::Marin).await })
    };
    wait_until("answer applied", || {
        h.engine.peers().first().is_some_and(|p| p.remote_answer().is_some())
    })
    .await;

    let peer = h.engine.peer(0);
    peer.channel().open();
    peer.channel().inject(&audio_delta());
    peer.set_state(PeerState::Connected);
    pending.await.expect("join").expect("connect");

    wait_until("speaking", || transport.agent_speaking()).await;
}

#[tokio::test]
async fn test_hint_is_dropped_while_disconnected() {
    let h = Harness::new();
    let transport = h.transport(TransportOptions::new("main"));
    let hints = HintChannel::new(transport.clone());

    assert!(!hints.send_hint("Now on slide 2"));

    transport.connect("hi", Voice::Marin).await.expect("connect");
    assert!(hints.send_hint("Now on slide 2"));
    settle().await;

    let sent = h.engine.peer(0).channel().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["type"], "conversation.item.create");
    assert_eq!(sent[0]["item"]["role"], "user");
    assert_eq!(sent[0]["item"]["content"][0]["text"], "[CONTEXT UPDATE] Now on slide 2");
}
