//! Boundaries to the outside world.
//!
//! The media stack (peer connection, microphone, speaker) is supplied by the host
//! through [`MediaEngine`]; HTTP collaborators live in [`rest`]; the optional
//! WebSocket sideband control channel lives in [`ws`].

pub mod rest;
pub mod ws;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::Result;

pub use rest::{
    ClientSecretBroker, CredentialBroker, HttpCredentialBroker, HttpSdpExchange, SdpAnswer,
    SdpExchange, SessionDescriptor,
};

/// Transport-level state reported by a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// States after which the peer will not carry media again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Events delivered by a control channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed,
}

/// Bidirectional message channel carrying protocol events next to the media.
pub trait ControlChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Queue one text message; does not wait for delivery.
    ///
    /// # Errors
    /// Returns an error if the channel is closed.
    #[allow(clippy::result_large_err)]
    fn send_text(&self, text: String) -> Result<()>;

    /// Close the channel. Calling this more than once has no further effect.
    fn close(&self);
}

/// A control channel together with its inbound event stream.
pub struct ControlChannelHandle {
    pub channel: Arc<dyn ControlChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl fmt::Debug for ControlChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannelHandle")
            .field("label", &self.channel.label())
            .finish_non_exhaustive()
    }
}

/// An audio track handed between the media engine and the peer connection.
///
/// `inner` is opaque to this crate; engines downcast it to their own track type.
#[derive(Clone)]
pub struct MediaTrack {
    pub id: String,
    pub inner: Arc<dyn Any + Send + Sync>,
}

impl MediaTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { id: id.into(), inner }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Local microphone capture.
pub trait CaptureStream: Send {
    fn tracks(&self) -> Vec<MediaTrack>;

    /// Stop every track. Must be safe to call twice.
    fn stop(&mut self);
}

/// Where remote audio ends up.
pub trait PlaybackSink: Send {
    fn attach(&mut self, track: MediaTrack);
    fn detach(&mut self);
}

/// One negotiated peer transport (ICE/DTLS/SRTP live behind this).
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: MediaTrack) -> Result<()>;

    async fn create_control_channel(&self, label: &str) -> Result<ControlChannelHandle>;

    /// Create and apply the local description, returning its SDP.
    async fn create_offer(&self) -> Result<String>;

    async fn set_remote_answer(&self, sdp: &str) -> Result<()>;

    fn state_changes(&self) -> watch::Receiver<PeerState>;

    /// Remote tracks as they arrive. Yields `Some` only on the first call.
    fn take_remote_tracks(&self) -> Option<mpsc::UnboundedReceiver<MediaTrack>>;

    fn close(&self);
}

/// Factory for peers, capture and playback.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_peer(&self) -> Result<Arc<dyn PeerConnection>>;

    /// Acquire the microphone.
    ///
    /// # Errors
    /// Returns `Error::Capture` if permission is denied or no device is available.
    async fn acquire_capture(&self) -> Result<Box<dyn CaptureStream>>;

    fn playback_sink(&self) -> Box<dyn PlaybackSink>;
}
