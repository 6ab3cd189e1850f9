#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod sdk;
pub mod transport;

pub use config::{ControlMode, TransportConfig};
pub use error::{Error, ErrorKind, Result, ServerError};
pub use protocol::client_events::ClientEvent;
pub use protocol::server_events::ServerEvent;
pub use protocol::models::{Item, SessionUpdate, Tool, Voice};
pub use sdk::{
    AuditionManager, ConnectionState, EventHandlers, GreetingStyle, HintChannel, Navigation,
    PeerTransportManager, Persona, PersonaCatalog, PresentationMode, Realtime, RealtimeBuilder,
    SessionCoordinator, Sessions, SlideContext, SlideSummary, ToolBridge, ToolRegistry,
    TranscriptChunk,
};
pub use transport::{
    CaptureStream, ChannelEvent, ControlChannel, ControlChannelHandle, CredentialBroker,
    MediaEngine, MediaTrack, PeerConnection, PeerState, PlaybackSink, SdpAnswer, SdpExchange,
    SessionDescriptor,
};
