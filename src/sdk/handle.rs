use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::protocol::client_events::ClientEvent;
use crate::transport::{CaptureStream, ControlChannel, PeerConnection, PlaybackSink};

/// Lifecycle of one transport.
///
/// Legal paths are `Disconnected -> Connecting -> Connected -> Disconnected`
/// and `Disconnected -> Connecting -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Anything that can put a client event on the wire.
///
/// Returns whether the event was handed to an open channel.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: &ClientEvent) -> bool;
}

/// Every resource of one connection attempt.
///
/// Fields fill in as negotiation proceeds; [`ConnectionHandle::release`] tears
/// down whatever is present and is the only way resources are freed.
#[derive(Default)]
pub struct ConnectionHandle {
    pub(crate) peer: Option<Arc<dyn PeerConnection>>,
    pub(crate) channel: Option<Arc<dyn ControlChannel>>,
    pub(crate) capture: Option<Box<dyn CaptureStream>>,
    pub(crate) playback: Option<Box<dyn PlaybackSink>>,
    pub(crate) tasks: Vec<JoinHandle<()>>,
    pub(crate) call_id: Option<String>,
}

impl ConnectionHandle {
    #[must_use]
    pub(crate) fn with_peer(peer: Arc<dyn PeerConnection>) -> Self {
        Self { peer: Some(peer), ..Self::default() }
    }

    #[must_use]
    pub(crate) fn with_capture(capture: Box<dyn CaptureStream>) -> Self {
        Self { capture: Some(capture), ..Self::default() }
    }

    #[must_use]
    pub(crate) fn with_channel(channel: Arc<dyn ControlChannel>) -> Self {
        Self { channel: Some(channel), ..Self::default() }
    }

    #[must_use]
    pub(crate) fn with_playback(playback: Box<dyn PlaybackSink>) -> Self {
        Self { playback: Some(playback), ..Self::default() }
    }

    #[must_use]
    pub(crate) fn with_task(task: JoinHandle<()>) -> Self {
        Self { tasks: vec![task], ..Self::default() }
    }

    /// Move every resource of `other` into `self`.
    pub(crate) fn absorb(&mut self, mut other: Self) {
        if let Some(peer) = other.peer.take() {
            self.peer = Some(peer);
        }
        if let Some(channel) = other.channel.take() {
            self.channel = Some(channel);
        }
        if let Some(capture) = other.capture.take() {
            self.capture = Some(capture);
        }
        if let Some(playback) = other.playback.take() {
            self.playback = Some(playback);
        }
        if let Some(call_id) = other.call_id.take() {
            self.call_id = Some(call_id);
        }
        self.tasks.append(&mut other.tasks);
    }

    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peer.is_none()
            && self.channel.is_none()
            && self.capture.is_none()
            && self.playback.is_none()
            && self.tasks.is_empty()
    }

    /// Close the channel, stop capture, close the peer, detach playback, stop tasks.
    pub fn release(mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.detach();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.peer.is_some())
            .field("channel", &self.channel.as_ref().map(|c| c.label().to_string()))
            .field("capture", &self.capture.is_some())
            .field("playback", &self.playback.is_some())
            .field("tasks", &self.tasks.len())
            .field("call_id", &self.call_id)
            .finish()
    }
}
