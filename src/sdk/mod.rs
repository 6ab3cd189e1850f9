//! Session orchestration over the realtime transport.
//!
//! [`PeerTransportManager`] owns one connection; [`SessionCoordinator`] and
//! [`AuditionManager`] build the main session and persona previews on top of it.

mod audition;
mod builder;
mod coordinator;
mod dispatcher;
mod handle;
mod handlers;
mod hints;
pub mod instructions;
mod manager;
pub mod persona;
mod tools;
pub mod voice;

pub use audition::{AuditionHandle, AuditionManager};
pub use builder::{Realtime, RealtimeBuilder, Sessions};
pub use coordinator::SessionCoordinator;
pub use handle::{ConnectionHandle, ConnectionState, EventSink};
pub use handlers::{
    ErrorHandler, EventHandlers, RawEventHandler, SpeakingHandler, StateHandler,
    TranscriptHandler, UserTranscriptHandler,
};
pub use hints::{CONTEXT_MARKER, HintChannel};
pub use instructions::{
    DefaultInstructions, InstructionContext, InstructionSynthesizer, PresentationMode,
    SlideContext, SlideSummary,
};
pub use manager::{Collaborators, PeerTransportManager, TransportOptions};
pub use persona::{GreetingStyle, Persona, PersonaCatalog};
pub use tools::{
    NEXT_SLIDE, Navigation, PREVIOUS_SLIDE, PendingFunctionCall, ToolBridge, ToolContext,
    ToolDefinition, ToolOutcome, ToolRegistry,
};
pub use voice::{TranscriptChunk, UserTranscript};
