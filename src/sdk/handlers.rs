use crate::Error;
use crate::protocol::server_events::ServerEvent;

use super::ConnectionState;
use super::voice::{TranscriptChunk, UserTranscript};

pub type StateHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
pub type SpeakingHandler = Box<dyn Fn(bool) + Send + Sync>;
pub type TranscriptHandler = Box<dyn Fn(TranscriptChunk) + Send + Sync>;
pub type UserTranscriptHandler = Box<dyn Fn(UserTranscript) + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;
pub type RawEventHandler = Box<dyn Fn(&ServerEvent) + Send + Sync>;

/// Observer callbacks for one session.
///
/// Handlers run inline on the dispatcher task, in event order, and must not block.
#[derive(Default)]
pub struct EventHandlers {
    pub on_state: Option<StateHandler>,
    pub on_agent_speaking: Option<SpeakingHandler>,
    pub on_transcript: Option<TranscriptHandler>,
    pub on_user_transcript: Option<UserTranscriptHandler>,
    pub on_error: Option<ErrorHandler>,
    pub on_raw_event: Option<RawEventHandler>,
}

impl EventHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_state<F>(mut self, handler: F) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on_state = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_agent_speaking<F>(mut self, handler: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_agent_speaking = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_transcript<F>(mut self, handler: F) -> Self
    where
        F: Fn(TranscriptChunk) + Send + Sync + 'static,
    {
        self.on_transcript = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_user_transcript<F>(mut self, handler: F) -> Self
    where
        F: Fn(UserTranscript) + Send + Sync + 'static,
    {
        self.on_user_transcript = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Called with every decoded inbound event before it is routed.
    #[must_use]
    pub fn on_raw_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.on_raw_event = Some(Box::new(handler));
        self
    }

    pub(crate) fn state(&self, state: ConnectionState) {
        if let Some(handler) = &self.on_state {
            handler(state);
        }
    }

    pub(crate) fn agent_speaking(&self, speaking: bool) {
        if let Some(handler) = &self.on_agent_speaking {
            handler(speaking);
        }
    }

    pub(crate) fn transcript(&self, chunk: TranscriptChunk) {
        if let Some(handler) = &self.on_transcript {
            handler(chunk);
        }
    }

    pub(crate) fn user_transcript(&self, transcript: UserTranscript) {
        if let Some(handler) = &self.on_user_transcript {
            handler(transcript);
        }
    }

    pub(crate) fn error(&self, err: &Error) {
        if let Some(handler) = &self.on_error {
            handler(err);
        }
    }

    pub(crate) fn raw_event(&self, event: &ServerEvent) {
        if let Some(handler) = &self.on_raw_event {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_state", &self.on_state.is_some())
            .field("on_agent_speaking", &self.on_agent_speaking.is_some())
            .field("on_transcript", &self.on_transcript.is_some())
            .field("on_user_transcript", &self.on_user_transcript.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_raw_event", &self.on_raw_event.is_some())
            .finish()
    }
}
