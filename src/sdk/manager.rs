use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};

use super::dispatcher::Dispatcher;
use super::handle::{ConnectionHandle, ConnectionState, EventSink};
use super::handlers::EventHandlers;
use super::tools::ToolBridge;
use crate::config::{ControlMode, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::codec;
use crate::protocol::models::Voice;
use crate::transport::{
    ChannelEvent, ControlChannelHandle, CredentialBroker, MediaEngine, MediaTrack, PeerState,
    SdpExchange, ws,
};

/// The outside world one transport talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn MediaEngine>,
    pub broker: Arc<dyn CredentialBroker>,
    pub exchange: Arc<dyn SdpExchange>,
}

/// Per-instance behavior of a transport.
pub struct TransportOptions {
    label: String,
    handlers: Arc<EventHandlers>,
    tools: Option<Arc<ToolBridge>>,
    speak_first: bool,
}

impl TransportOptions {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handlers: Arc::new(EventHandlers::default()),
            tools: None,
            speak_first: false,
        }
    }

    #[must_use]
    pub fn handlers(mut self, handlers: Arc<EventHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Answer function calls from completed responses with this bridge.
    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolBridge>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Ask for a response as soon as the link is up.
    #[must_use]
    pub const fn speak_first(mut self, speak_first: bool) -> Self {
        self.speak_first = speak_first;
        self
    }
}

/// Owns the lifecycle of one realtime transport.
///
/// Cloning yields another handle to the same transport.
#[derive(Clone)]
pub struct PeerTransportManager {
    inner: Arc<Inner>,
}

struct Slot {
    /// Bumped on every connect and teardown; stale work compares against it.
    attempt: u64,
    handle: ConnectionHandle,
    cancel: Option<watch::Sender<bool>>,
}

pub(crate) struct Inner {
    label: Arc<str>,
    collaborators: Collaborators,
    config: TransportConfig,
    handlers: Arc<EventHandlers>,
    tools: Option<Arc<ToolBridge>>,
    speak_first: bool,
    state_tx: watch::Sender<ConnectionState>,
    speaking_tx: watch::Sender<bool>,
    last_error: Mutex<Option<Arc<Error>>>,
    slot: Mutex<Slot>,
}

/// Inbound side of a link that came up.
pub(crate) struct LinkStreams {
    pub(crate) events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub(crate) backlog: Vec<String>,
    pub(crate) peer_state: watch::Receiver<PeerState>,
    pub(crate) remote_tracks: Option<mpsc::UnboundedReceiver<MediaTrack>>,
}

impl PeerTransportManager {
    #[must_use]
    pub fn new(config: TransportConfig, collaborators: Collaborators, options: TransportOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (speaking_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                label: options.label.into(),
                collaborators,
                config,
                handlers: options.handlers,
                tools: options.tools,
                speak_first: options.speak_first,
                state_tx,
                speaking_tx,
                last_error: Mutex::new(None),
                slot: Mutex::new(Slot {
                    attempt: 0,
                    handle: ConnectionHandle::default(),
                    cancel: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    #[must_use]
    pub fn agent_speaking(&self) -> bool {
        *self.inner.speaking_tx.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.inner.speaking_tx.subscribe()
    }

    /// The most recent connect failure or remote error.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Call id of the live call, when the endpoint reported one.
    #[must_use]
    pub fn call_id(&self) -> Option<String> {
        self.inner.lock_slot().handle.call_id().map(str::to_owned)
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Negotiate a new link.
    ///
    /// Ignored with a warning unless the transport is `Disconnected`. Any
    /// failure releases everything acquired so far before returning.
    ///
    /// # Errors
    /// Returns the failure that aborted the attempt, or `Error::Cancelled` if a
    /// `disconnect` superseded it.
    pub async fn connect(&self, instructions: &str, voice: Voice) -> Result<()> {
        let inner = &self.inner;
        let (attempt, mut cancelled) = {
            let mut slot = inner.lock_slot();
            let state = *inner.state_tx.borrow();
            if state != ConnectionState::Disconnected {
                tracing::warn!(session = %inner.label, %state, "connect ignored: transport is busy");
                return Ok(());
            }
            slot.attempt += 1;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            slot.cancel = Some(cancel_tx);
            inner.state_tx.send_replace(ConnectionState::Connecting);
            (slot.attempt, cancel_rx)
        };
        inner.handlers.state(ConnectionState::Connecting);
        tracing::info!(session = %inner.label, attempt, %voice, "Connecting");

        let mut guard = AttemptGuard { inner, attempt, armed: true };
        let timeout = inner.config.connect_timeout;
        let result = tokio::select! {
            biased;
            _ = cancelled.changed() => Err(Error::Cancelled),
            res = tokio::time::timeout(timeout, inner.negotiate(attempt, instructions, voice)) => {
                res.unwrap_or(Err(Error::Timeout(timeout))).map_err(normalize)
            }
        };

        let outcome = match result.and_then(|streams| inner.go_live(attempt, streams)) {
            Ok(()) => Ok(()),
            Err(err) => {
                inner.fail(attempt, &err);
                Err(err)
            }
        };
        guard.armed = false;
        outcome
    }

    /// Release every resource and return to `Disconnected`. Safe to call at any time.
    pub fn disconnect(&self) {
        if self.inner.teardown(None) {
            tracing::info!(session = %self.inner.label, "Disconnected");
        }
    }

    /// Encode and send one event if the link is up.
    pub fn send_event(&self, event: &ClientEvent) -> bool {
        self.inner.send_for(None, event)
    }
}

impl EventSink for PeerTransportManager {
    fn send_event(&self, event: &ClientEvent) -> bool {
        self.inner.send_for(None, event)
    }
}

impl std::fmt::Debug for PeerTransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransportManager")
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.lock_slot().attempt == attempt
    }

    /// Hand resources to the slot, or release them if the attempt is stale.
    #[allow(clippy::result_large_err)]
    fn stage(&self, attempt: u64, resources: ConnectionHandle) -> Result<()> {
        let mut slot = self.lock_slot();
        if slot.attempt != attempt {
            drop(slot);
            resources.release();
            return Err(Error::Cancelled);
        }
        slot.handle.absorb(resources);
        Ok(())
    }

    async fn negotiate(&self, attempt: u64, instructions: &str, voice: Voice) -> Result<LinkStreams> {
        let Collaborators { engine, broker, exchange } = &self.collaborators;

        let descriptor = broker.request(instructions, voice).await?;
        tracing::debug!(session = %self.label, ?descriptor, "Credential issued");

        let peer = engine.create_peer().await?;
        self.stage(attempt, ConnectionHandle::with_peer(Arc::clone(&peer)))?;
        let mut peer_state = peer.state_changes();
        let remote_tracks = peer.take_remote_tracks();

        let capture = engine.acquire_capture().await?;
        let tracks = capture.tracks();
        self.stage(attempt, ConnectionHandle::with_capture(capture))?;
        for track in tracks {
            peer.add_track(track).await?;
        }

        let mut events = None;
        if let ControlMode::DataChannel { label } = &self.config.control {
            let ControlChannelHandle { channel, events: rx } = peer.create_control_channel(label).await?;
            self.stage(attempt, ConnectionHandle::with_channel(channel))?;
            events = Some(rx);
        }
        self.stage(attempt, ConnectionHandle::with_playback(engine.playback_sink()))?;

        let offer = peer.create_offer().await?;
        let answer = exchange.exchange(&descriptor, offer).await?;
        peer.set_remote_answer(&answer.sdp).await?;
        tracing::debug!(session = %self.label, call_id = ?answer.call_id, "Remote answer applied");

        if let ControlMode::Sideband { url } = &self.config.control {
            let call_id = answer.call_id.as_deref().ok_or_else(|| {
                Error::Negotiation("endpoint returned no call id for the sideband channel".to_string())
            })?;
            let ControlChannelHandle { channel, events: rx } =
                ws::connect_sideband(url, &descriptor.credential, call_id)
                    .await
                    .map_err(|e| Error::Negotiation(format!("sideband: {e}")))?;
            self.stage(attempt, ConnectionHandle::with_channel(channel))?;
            events = Some(rx);
        }
        self.stage(
            attempt,
            ConnectionHandle { call_id: answer.call_id, ..ConnectionHandle::default() },
        )?;

        let mut events = events
            .ok_or_else(|| Error::Negotiation("no control channel configured".to_string()))?;
        let backlog = await_link_up(&mut peer_state, &mut events).await?;

        Ok(LinkStreams { events, backlog, peer_state, remote_tracks })
    }

    #[allow(clippy::result_large_err)]
    fn go_live(self: &Arc<Self>, attempt: u64, streams: LinkStreams) -> Result<()> {
        let dispatcher = Dispatcher::new(
            Link { inner: Arc::downgrade(self), attempt, label: Arc::clone(&self.label) },
            Arc::clone(&self.handlers),
            self.tools.clone(),
        );
        {
            let mut slot = self.lock_slot();
            if slot.attempt != attempt {
                return Err(Error::Cancelled);
            }
            slot.cancel = None;
            self.state_tx.send_replace(ConnectionState::Connected);
            let task = tokio::spawn(dispatcher.run(streams, self.speak_first));
            slot.handle.absorb(ConnectionHandle::with_task(task));
        }
        tracing::info!(session = %self.label, attempt, "Connected");
        self.handlers.state(ConnectionState::Connected);
        Ok(())
    }

    fn fail(&self, attempt: u64, err: &Error) {
        if matches!(err, Error::Cancelled) {
            tracing::debug!(session = %self.label, attempt, "Connect superseded");
            self.teardown(Some(attempt));
            return;
        }
        if !self.is_current(attempt) {
            return;
        }
        tracing::warn!(session = %self.label, attempt, error = %err, "Connect failed");
        self.record_error(err);
        self.teardown(Some(attempt));
        self.handlers.error(err);
    }

    fn record_error(&self, err: &Error) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(copy_error(err)));
    }

    /// Release the current connection. With `Some(attempt)`, only if that
    /// attempt is still current. Returns whether the state changed.
    fn teardown(&self, attempt: Option<u64>) -> bool {
        let (handle, previous, was_speaking) = {
            let mut slot = self.lock_slot();
            if attempt.is_some_and(|a| a != slot.attempt) {
                return false;
            }
            slot.attempt += 1;
            if let Some(cancel) = slot.cancel.take() {
                let _ = cancel.send(true);
            }
            let handle = std::mem::take(&mut slot.handle);
            let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
            let was_speaking = self.speaking_tx.send_replace(false);
            (handle, previous, was_speaking)
        };

        handle.release();

        if was_speaking {
            self.handlers.agent_speaking(false);
        }
        if previous == ConnectionState::Disconnected {
            return false;
        }
        self.handlers.state(ConnectionState::Disconnected);
        true
    }

    fn send_for(&self, attempt: Option<u64>, event: &ClientEvent) -> bool {
        let channel = {
            let slot = self.lock_slot();
            if attempt.is_some_and(|a| a != slot.attempt)
                || *self.state_tx.borrow() != ConnectionState::Connected
            {
                tracing::debug!(session = %self.label, kind = event.kind(), "Not connected; event dropped");
                return false;
            }
            slot.handle.channel.clone()
        };
        let Some(channel) = channel else {
            return false;
        };
        let text = match codec::encode(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session = %self.label, kind = event.kind(), error = %e, "Failed to encode event");
                return false;
            }
        };
        match channel.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session = %self.label, kind = event.kind(), error = %e, "Failed to send event");
                false
            }
        }
    }

    fn set_speaking(&self, attempt: u64, speaking: bool) {
        let changed = {
            let slot = self.lock_slot();
            if slot.attempt != attempt {
                return;
            }
            self.speaking_tx.send_replace(speaking) != speaking
        };
        if changed {
            self.handlers.agent_speaking(speaking);
        }
    }

    fn attach_playback(&self, attempt: u64, track: MediaTrack) {
        let mut slot = self.lock_slot();
        if slot.attempt != attempt {
            return;
        }
        match slot.handle.playback.as_mut() {
            Some(sink) => {
                tracing::debug!(session = %self.label, track = %track.id, "Attaching remote audio");
                sink.attach(track);
            }
            None => tracing::warn!(session = %self.label, track = %track.id, "No playback sink for remote audio"),
        }
    }
}

/// Best-effort copy for errors that do not implement `Clone`.
fn copy_error(err: &Error) -> Error {
    match err {
        Error::Credential(m) => Error::Credential(m.clone()),
        Error::Capture(m) => Error::Capture(m.clone()),
        Error::Negotiation(m) => Error::Negotiation(m.clone()),
        Error::Timeout(d) => Error::Timeout(*d),
        Error::Protocol(m) => Error::Protocol(m.clone()),
        Error::Remote(e) => Error::Remote(e.clone()),
        Error::Cancelled => Error::Cancelled,
        Error::UnknownPersona(id) => Error::UnknownPersona(id.clone()),
        Error::Config(m) => Error::Config(m.clone()),
        Error::ConnectionClosed => Error::ConnectionClosed,
        Error::WebSocket(_) | Error::Http(_) => Error::Negotiation(err.to_string()),
        Error::Serialization(_) => Error::Protocol(err.to_string()),
        Error::Url(_) | Error::Header(_) => Error::Config(err.to_string()),
    }
}

/// Fold library errors into the connect failure they stand for, so the
/// caller sees the same variant that `last_error` records.
fn normalize(err: Error) -> Error {
    match err {
        Error::WebSocket(_) | Error::Http(_) => Error::Negotiation(err.to_string()),
        Error::Serialization(_) => Error::Protocol(err.to_string()),
        Error::Url(_) | Error::Header(_) => Error::Config(err.to_string()),
        other => other,
    }
}

/// Releases an attempt whose `connect` future was dropped before it settled.
struct AttemptGuard<'a> {
    inner: &'a Inner,
    attempt: u64,
    armed: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.inner.teardown(Some(self.attempt)) {
            tracing::debug!(session = %self.inner.label, attempt = self.attempt, "Connect abandoned");
        }
    }
}

/// Wait for the peer to connect and the control channel to open.
///
/// Messages that arrive first are returned so the dispatcher can replay them.
async fn await_link_up(
    peer_state: &mut watch::Receiver<PeerState>,
    events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
) -> Result<Vec<String>> {
    let mut peer_up = false;
    let mut channel_open = false;
    let mut backlog = Vec::new();
    loop {
        let state = *peer_state.borrow_and_update();
        if state == PeerState::Connected {
            peer_up = true;
        } else if state.is_terminal() {
            return Err(Error::Negotiation(format!("peer connection {state:?} before the link came up")));
        }
        if peer_up && channel_open {
            return Ok(backlog);
        }

        tokio::select! {
            changed = peer_state.changed() => {
                if changed.is_err() {
                    return Err(Error::Negotiation("peer connection dropped".to_string()));
                }
            }
            event = events.recv() => match event {
                Some(ChannelEvent::Open) => channel_open = true,
                Some(ChannelEvent::Message(text)) => backlog.push(text),
                Some(ChannelEvent::Closed) | None => {
                    return Err(Error::Negotiation("control channel closed during negotiation".to_string()));
                }
            },
        }
    }
}

/// The dispatcher's view of its transport, valid for one attempt only.
#[derive(Clone)]
pub(crate) struct Link {
    inner: Weak<Inner>,
    attempt: u64,
    label: Arc<str>,
}

impl Link {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_speaking(&self, speaking: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_speaking(self.attempt, speaking);
        }
    }

    pub(crate) fn attach_playback(&self, track: MediaTrack) {
        if let Some(inner) = self.inner.upgrade() {
            inner.attach_playback(self.attempt, track);
        }
    }

    pub(crate) fn record_error(&self, err: &Error) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.is_current(self.attempt) {
                inner.record_error(err);
            }
        }
    }

    /// Tear the link down after a remote close or peer failure.
    pub(crate) fn terminate(&self, reason: &str) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.teardown(Some(self.attempt)) {
                tracing::info!(session = %self.label, reason, "Connection closed");
            }
        }
    }
}

impl EventSink for Link {
    fn send_event(&self, event: &ClientEvent) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.send_for(Some(self.attempt), event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn library_errors() -> Vec<Error> {
        vec![
            serde_json::from_str::<serde_json::Value>("{").unwrap_err().into(),
            url::Url::parse("not a url").unwrap_err().into(),
            reqwest::header::HeaderValue::from_str("ek\nbad").unwrap_err().into(),
            tokio_tungstenite::tungstenite::Error::ConnectionClosed.into(),
        ]
    }

    #[test]
    fn library_errors_fold_into_connect_kinds() {
        let kinds: Vec<ErrorKind> = library_errors().into_iter().map(|e| normalize(e).kind()).collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::Protocol, ErrorKind::Other, ErrorKind::Other, ErrorKind::Negotiation]
        );
    }

    #[test]
    fn recorded_copy_matches_returned_error() {
        for err in library_errors() {
            let recorded = copy_error(&err);
            let returned = normalize(err);
            assert_eq!(std::mem::discriminant(&recorded), std::mem::discriminant(&returned));
            assert_eq!(recorded.to_string(), returned.to_string());
        }
    }

    #[test]
    fn domain_errors_pass_through() {
        let err = normalize(Error::Credential("quota".to_string()));
        assert!(matches!(err, Error::Credential(ref m) if m == "quota"));
    }
}
