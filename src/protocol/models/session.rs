use serde::{Deserialize, Serialize};

use super::{Tool, ToolChoice, Voice};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Realtime,
    Transcription,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputAudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<InputAudioTranscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputAudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputAudioConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputAudioConfig>,
}

/// Session shape used when minting a client secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,
}

impl SessionConfig {
    #[must_use]
    pub fn realtime(model: impl Into<String>) -> Self {
        Self {
            kind: SessionKind::Realtime,
            model: model.into(),
            instructions: None,
            audio: None,
        }
    }
}

/// Partial session update; only set fields are sent.
///
/// The endpoint forbids changing `model` or `voice` once a session is live,
/// so neither appears here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SessionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,
}

impl SessionUpdate {
    #[must_use]
    pub fn instructions(instructions: impl Into<String>) -> Self {
        Self {
            kind: Some(SessionKind::Realtime),
            instructions: Some(instructions.into()),
            ..Self::default()
        }
    }
}

/// Server-side view of a session as echoed in `session.created` / `session.updated`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub instructions: Option<String>,
}
