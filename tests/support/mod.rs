#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oai_rt_session::sdk::{Collaborators, TransportOptions};
use oai_rt_session::transport::SdpAnswer;
use oai_rt_session::{
    CaptureStream, ChannelEvent, ControlChannel, ControlChannelHandle, CredentialBroker, Error,
    MediaEngine, MediaTrack, Navigation, PeerConnection, PeerState, PeerTransportManager,
    PlaybackSink, Result, SdpExchange, SessionDescriptor, TransportConfig, Voice,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

pub struct MockChannel {
    label: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockChannel {
    fn new(label: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            label: label.to_string(),
            events: tx,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        (channel, rx)
    }

    pub fn open(&self) {
        let _ = self.events.send(ChannelEvent::Open);
    }

    pub fn inject(&self, event: &Value) {
        self.inject_raw(&event.to_string());
    }

    pub fn inject_raw(&self, text: &str) {
        let _ = self.events.send(ChannelEvent::Message(text.to_string()));
    }

    pub fn remote_close(&self) {
        let _ = self.events.send(ChannelEvent::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).expect("sent text is JSON"))
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Drain what was sent so far.
    pub fn take_sent(&self) -> Vec<Value> {
        let sent = self.sent();
        self.sent.lock().unwrap().clear();
        sent
    }
}

impl ControlChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockPeer {
    state: watch::Sender<PeerState>,
    remote_tx: mpsc::UnboundedSender<MediaTrack>,
    remote_rx: Mutex<Option<mpsc::UnboundedReceiver<MediaTrack>>>,
    channel: Mutex<Option<Arc<MockChannel>>>,
    added: Mutex<Vec<String>>,
    answer: Mutex<Option<String>>,
    closed: AtomicBool,
    auto_connect: bool,
}

impl MockPeer {
    fn new(auto_connect: bool) -> Arc<Self> {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: watch::channel(PeerState::New).0,
            remote_tx,
            remote_rx: Mutex::new(Some(remote_rx)),
            channel: Mutex::new(None),
            added: Mutex::new(Vec::new()),
            answer: Mutex::new(None),
            closed: AtomicBool::new(false),
            auto_connect,
        })
    }

    pub fn channel(&self) -> Arc<MockChannel> {
        self.channel.lock().unwrap().clone().expect("control channel was created")
    }

    pub fn has_channel(&self) -> bool {
        self.channel.lock().unwrap().is_some()
    }

    pub fn set_state(&self, state: PeerState) {
        self.state.send_replace(state);
    }

    /// Complete the link by hand when auto-connect is off.
    pub fn come_up(&self) {
        self.set_state(PeerState::Connected);
        self.channel().open();
    }

    pub fn push_remote_track(&self, id: &str) {
        let _ = self.remote_tx.send(MediaTrack::new(id, Arc::new(())));
    }

    pub fn added_tracks(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn remote_answer(&self) -> Option<String> {
        self.answer.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn add_track(&self, track: MediaTrack) -> Result<()> {
        self.added.lock().unwrap().push(track.id);
        Ok(())
    }

    async fn create_control_channel(&self, label: &str) -> Result<ControlChannelHandle> {
        let (channel, events) = MockChannel::new(label);
        *self.channel.lock().unwrap() = Some(Arc::clone(&channel));
        Ok(ControlChannelHandle { channel, events })
    }

    async fn create_offer(&self) -> Result<String> {
        self.set_state(PeerState::Connecting);
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-offer\r\n".to_string())
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        *self.answer.lock().unwrap() = Some(sdp.to_string());
        if self.auto_connect {
            self.set_state(PeerState::Connected);
            if let Some(channel) = self.channel.lock().unwrap().as_ref() {
                channel.open();
            }
        }
        Ok(())
    }

    fn state_changes(&self) -> watch::Receiver<PeerState> {
        self.state.subscribe()
    }

    fn take_remote_tracks(&self) -> Option<mpsc::UnboundedReceiver<MediaTrack>> {
        self.remote_rx.lock().unwrap().take()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.send_replace(PeerState::Closed);
    }
}

struct MockCapture {
    id: String,
    live: Arc<AtomicUsize>,
    stopped: bool,
}

impl CaptureStream for MockCapture {
    fn tracks(&self) -> Vec<MediaTrack> {
        vec![MediaTrack::new(self.id.clone(), Arc::new(()))]
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct MockPlayback {
    attached: Arc<Mutex<Vec<String>>>,
    detached: Arc<AtomicUsize>,
}

impl PlaybackSink for MockPlayback {
    fn attach(&mut self, track: MediaTrack) {
        self.attached.lock().unwrap().push(track.id);
    }

    fn detach(&mut self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockEngine {
    peers: Mutex<Vec<Arc<MockPeer>>>,
    live_captures: Arc<AtomicUsize>,
    captures: AtomicUsize,
    capture_error: Mutex<Option<String>>,
    manual_connect: AtomicBool,
    stall_capture: AtomicBool,
    pub attached: Arc<Mutex<Vec<String>>>,
    pub detached: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Peers created from now on wait for `MockPeer::come_up`.
    pub fn set_manual_connect(&self, manual: bool) {
        self.manual_connect.store(manual, Ordering::SeqCst);
    }

    /// Capture requests from now on never resolve.
    pub fn stall_capture(&self) {
        self.stall_capture.store(true, Ordering::SeqCst);
    }

    pub fn deny_capture(&self, reason: &str) {
        *self.capture_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().unwrap().clone()
    }

    pub fn peer(&self, idx: usize) -> Arc<MockPeer> {
        Arc::clone(&self.peers.lock().unwrap()[idx])
    }

    pub fn live_captures(&self) -> usize {
        self.live_captures.load(Ordering::SeqCst)
    }

    pub fn open_channels(&self) -> usize {
        self.peers()
            .iter()
            .filter(|p| p.has_channel() && !p.channel().is_closed())
            .count()
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_peer(&self) -> Result<Arc<dyn PeerConnection>> {
        let peer = MockPeer::new(!self.manual_connect.load(Ordering::SeqCst));
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }

    async fn acquire_capture(&self) -> Result<Box<dyn CaptureStream>> {
        if self.stall_capture.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = self.capture_error.lock().unwrap().clone() {
            return Err(Error::Capture(reason));
        }
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        self.live_captures.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCapture {
            id: format!("mic-{n}"),
            live: Arc::clone(&self.live_captures),
            stopped: false,
        }))
    }

    fn playback_sink(&self) -> Box<dyn PlaybackSink> {
        Box::new(MockPlayback {
            attached: Arc::clone(&self.attached),
            detached: Arc::clone(&self.detached),
        })
    }
}

#[derive(Default)]
pub struct MockBroker {
    requests: Mutex<Vec<(String, Voice)>>,
    reject: Mutex<Option<String>>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_with(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.to_string());
    }

    pub fn requests(&self) -> Vec<(String, Voice)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialBroker for MockBroker {
    async fn request(&self, instructions: &str, voice: Voice) -> Result<SessionDescriptor> {
        self.requests.lock().unwrap().push((instructions.to_string(), voice));
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Err(Error::Credential(reason));
        }
        Ok(serde_json::from_value(serde_json::json!({
            "credential": "ek_test",
            "expiresAt": 1_900_000_000,
            "sessionId": "sess_test"
        }))
        .expect("valid descriptor"))
    }
}

#[derive(Default)]
pub struct MockExchange {
    offers: Mutex<Vec<String>>,
}

impl MockExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn offers(&self) -> Vec<String> {
        self.offers.lock().unwrap().clone()
    }
}

#[async_trait]
impl SdpExchange for MockExchange {
    async fn exchange(&self, descriptor: &SessionDescriptor, offer: String) -> Result<SdpAnswer> {
        assert_eq!(descriptor.credential, "ek_test");
        self.offers.lock().unwrap().push(offer);
        Ok(SdpAnswer {
            sdp: "v=0\r\ns=mock-answer\r\n".to_string(),
            call_id: Some("rtc_test".to_string()),
        })
    }
}

/// Host-side deck used as the navigation capability.
pub struct Deck {
    index: AtomicUsize,
    total: usize,
    advanced: AtomicUsize,
    retreated: AtomicUsize,
}

impl Deck {
    pub fn new(index: usize, total: usize) -> Arc<Self> {
        Arc::new(Self {
            index: AtomicUsize::new(index),
            total,
            advanced: AtomicUsize::new(0),
            retreated: AtomicUsize::new(0),
        })
    }

    pub fn advanced(&self) -> usize {
        self.advanced.load(Ordering::SeqCst)
    }

    pub fn retreated(&self) -> usize {
        self.retreated.load(Ordering::SeqCst)
    }
}

impl Navigation for Deck {
    fn advance(&self) {
        self.advanced.fetch_add(1, Ordering::SeqCst);
        self.index.fetch_add(1, Ordering::SeqCst);
    }

    fn retreat(&self) {
        self.retreated.fetch_add(1, Ordering::SeqCst);
        self.index.fetch_sub(1, Ordering::SeqCst);
    }

    fn jump_to(&self, index: usize) {
        self.index.store(index, Ordering::SeqCst);
    }

    fn current_index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    fn total_count(&self) -> usize {
        self.total
    }
}

pub struct Harness {
    pub engine: Arc<MockEngine>,
    pub broker: Arc<MockBroker>,
    pub exchange: Arc<MockExchange>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            engine: MockEngine::new(),
            broker: MockBroker::new(),
            exchange: MockExchange::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            engine: self.engine.clone(),
            broker: self.broker.clone(),
            exchange: self.exchange.clone(),
        }
    }

    pub fn transport(&self, options: TransportOptions) -> PeerTransportManager {
        self.transport_with(TransportConfig::new(), options)
    }

    pub fn transport_with(&self, config: TransportConfig, options: TransportOptions) -> PeerTransportManager {
        PeerTransportManager::new(config, self.collaborators(), options)
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let spawned tasks drain queued messages.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn response_done(calls: &[(&str, &str)]) -> Value {
    let output: Vec<Value> = calls
        .iter()
        .map(|(name, call_id)| {
            serde_json::json!({
                "type": "function_call",
                "id": format!("item_{call_id}"),
                "status": "completed",
                "name": name,
                "call_id": call_id,
                "arguments": "{}"
            })
        })
        .collect();
    serde_json::json!({
        "type": "response.done",
        "event_id": "evt_done",
        "response": { "id": "resp_1", "status": "completed", "output": output }
    })
}

pub fn audio_delta() -> Value {
    serde_json::json!({
        "type": "response.output_audio.delta",
        "event_id": "evt_audio",
        "response_id": "resp_1",
        "item_id": "item_1",
        "delta": "AAAA"
    })
}
