use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::models::{ArbitraryJson, Item, Response, Session};
use crate::error::ServerError;

/// Inbound control-channel events.
///
/// Kinds this crate does not model (or payloads that do not fit the modelled
/// shape) deserialize to `Unknown` with the raw JSON kept for logging.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Error {
        event_id: String,
        error: ServerError,
    },
    SessionCreated {
        event_id: String,
        session: Session,
    },
    SessionUpdated {
        event_id: String,
        session: Session,
    },
    ResponseCreated {
        event_id: String,
        response: Response,
    },
    ResponseOutputAudioDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        delta: String,
    },
    ResponseOutputAudioDone {
        event_id: String,
        response_id: String,
        item_id: String,
    },
    ResponseOutputAudioTranscriptDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        delta: String,
    },
    ResponseOutputAudioTranscriptDone {
        event_id: String,
        response_id: String,
        item_id: String,
        transcript: String,
    },
    InputAudioBufferSpeechStarted {
        event_id: String,
        audio_start_ms: u32,
        item_id: String,
    },
    InputAudioBufferSpeechStopped {
        event_id: String,
        audio_end_ms: u32,
        item_id: String,
    },
    InputAudioTranscriptionCompleted {
        event_id: String,
        item_id: String,
        transcript: String,
    },
    ResponseOutputItemDone {
        event_id: String,
        response_id: String,
        item: Item,
    },
    ResponseDone {
        event_id: String,
        response: Response,
    },
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        event_id: String,
        error: ServerError,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        event_id: String,
        session: Session,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        event_id: String,
        session: Session,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        event_id: String,
        response: Response,
    },
    #[serde(rename = "response.output_audio.delta", alias = "response.audio.delta")]
    ResponseOutputAudioDelta {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        response_id: String,
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_audio.done", alias = "response.audio.done")]
    ResponseOutputAudioDone {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        response_id: String,
        #[serde(default)]
        item_id: String,
    },
    #[serde(
        rename = "response.output_audio_transcript.delta",
        alias = "response.audio_transcript.delta"
    )]
    ResponseOutputAudioTranscriptDelta {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        response_id: String,
        #[serde(default)]
        item_id: String,
        delta: String,
    },
    #[serde(
        rename = "response.output_audio_transcript.done",
        alias = "response.audio_transcript.done"
    )]
    ResponseOutputAudioTranscriptDone {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        response_id: String,
        #[serde(default)]
        item_id: String,
        transcript: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        audio_start_ms: u32,
        #[serde(default)]
        item_id: String,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        audio_end_ms: u32,
        #[serde(default)]
        item_id: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        item_id: String,
        transcript: String,
    },
    #[serde(rename = "response.output_item.done")]
    ResponseOutputItemDone {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        response_id: String,
        item: Item,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        event_id: String,
        response: Response,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => Self::SessionCreated { event_id, session },
            ServerEventRepr::SessionUpdated { event_id, session } => Self::SessionUpdated { event_id, session },
            ServerEventRepr::ResponseCreated { event_id, response } => Self::ResponseCreated { event_id, response },
            ServerEventRepr::ResponseOutputAudioDelta { event_id, response_id, item_id, delta } => Self::ResponseOutputAudioDelta { event_id, response_id, item_id, delta },
            ServerEventRepr::ResponseOutputAudioDone { event_id, response_id, item_id } => Self::ResponseOutputAudioDone { event_id, response_id, item_id },
            ServerEventRepr::ResponseOutputAudioTranscriptDelta { event_id, response_id, item_id, delta } => Self::ResponseOutputAudioTranscriptDelta { event_id, response_id, item_id, delta },
            ServerEventRepr::ResponseOutputAudioTranscriptDone { event_id, response_id, item_id, transcript } => Self::ResponseOutputAudioTranscriptDone { event_id, response_id, item_id, transcript },
            ServerEventRepr::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id },
            ServerEventRepr::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id },
            ServerEventRepr::InputAudioTranscriptionCompleted { event_id, item_id, transcript } => Self::InputAudioTranscriptionCompleted { event_id, item_id, transcript },
            ServerEventRepr::ResponseOutputItemDone { event_id, response_id, item } => Self::ResponseOutputItemDone { event_id, response_id, item },
            ServerEventRepr::ResponseDone { event_id, response } => Self::ResponseDone { event_id, response },
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let repr = match self {
            Self::Unknown(value) => return value.serialize(serializer),
            Self::Error { event_id, error } => ServerEventRepr::Error { event_id: event_id.clone(), error: error.clone() },
            Self::SessionCreated { event_id, session } => ServerEventRepr::SessionCreated { event_id: event_id.clone(), session: session.clone() },
            Self::SessionUpdated { event_id, session } => ServerEventRepr::SessionUpdated { event_id: event_id.clone(), session: session.clone() },
            Self::ResponseCreated { event_id, response } => ServerEventRepr::ResponseCreated { event_id: event_id.clone(), response: response.clone() },
            Self::ResponseOutputAudioDelta { event_id, response_id, item_id, delta } => ServerEventRepr::ResponseOutputAudioDelta { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), delta: delta.clone() },
            Self::ResponseOutputAudioDone { event_id, response_id, item_id } => ServerEventRepr::ResponseOutputAudioDone { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone() },
            Self::ResponseOutputAudioTranscriptDelta { event_id, response_id, item_id, delta } => ServerEventRepr::ResponseOutputAudioTranscriptDelta { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), delta: delta.clone() },
            Self::ResponseOutputAudioTranscriptDone { event_id, response_id, item_id, transcript } => ServerEventRepr::ResponseOutputAudioTranscriptDone { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), transcript: transcript.clone() },
            Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStarted { event_id: event_id.clone(), audio_start_ms: *audio_start_ms, item_id: item_id.clone() },
            Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStopped { event_id: event_id.clone(), audio_end_ms: *audio_end_ms, item_id: item_id.clone() },
            Self::InputAudioTranscriptionCompleted { event_id, item_id, transcript } => ServerEventRepr::InputAudioTranscriptionCompleted { event_id: event_id.clone(), item_id: item_id.clone(), transcript: transcript.clone() },
            Self::ResponseOutputItemDone { event_id, response_id, item } => ServerEventRepr::ResponseOutputItemDone { event_id: event_id.clone(), response_id: response_id.clone(), item: item.clone() },
            Self::ResponseDone { event_id, response } => ServerEventRepr::ResponseDone { event_id: event_id.clone(), response: response.clone() },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ServerEvent: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerEvent {
    /// Wire name of the event kind; `Unknown` reports the raw `type` field.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Error { .. } => "error",
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::ResponseCreated { .. } => "response.created",
            Self::ResponseOutputAudioDelta { .. } => "response.output_audio.delta",
            Self::ResponseOutputAudioDone { .. } => "response.output_audio.done",
            Self::ResponseOutputAudioTranscriptDelta { .. } => "response.output_audio_transcript.delta",
            Self::ResponseOutputAudioTranscriptDone { .. } => "response.output_audio_transcript.done",
            Self::InputAudioBufferSpeechStarted { .. } => "input_audio_buffer.speech_started",
            Self::InputAudioBufferSpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            Self::InputAudioTranscriptionCompleted { .. } => "conversation.item.input_audio_transcription.completed",
            Self::ResponseOutputItemDone { .. } => "response.output_item.done",
            Self::ResponseDone { .. } => "response.done",
            Self::Unknown(value) => value.get("type").and_then(|v| v.as_str()).unwrap_or("<untyped>"),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        macro_rules! extract {
            ($($variant:ident),*) => {
                match self {
                    $(Self::$variant { event_id, .. } => Some(event_id.as_str()),)*
                    Self::Unknown(value) => value.get("event_id").and_then(|v| v.as_str()),
                }
            };
        }
        extract!(
            Error, SessionCreated, SessionUpdated, ResponseCreated,
            ResponseOutputAudioDelta, ResponseOutputAudioDone,
            ResponseOutputAudioTranscriptDelta, ResponseOutputAudioTranscriptDone,
            InputAudioBufferSpeechStarted, InputAudioBufferSpeechStopped,
            InputAudioTranscriptionCompleted, ResponseOutputItemDone, ResponseDone
        )
    }
}
