use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ArbitraryJson, ItemStatus, Role};

/// Manual (de)serialization preserves unknown variants as raw JSON while keeping
/// strong typing for known items.
#[derive(Debug, Clone)]
pub enum Item {
    Message {
        id: Option<String>,
        status: Option<ItemStatus>,
        role: Role,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        id: Option<String>,
        status: Option<ItemStatus>,
        name: String,
        call_id: String,
        arguments: String,
    },
    FunctionCallOutput {
        id: Option<String>,
        call_id: String,
        output: String,
    },
    Unknown(ArbitraryJson),
}

impl Item {
    /// A user-role text message with no id or status.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message {
            id: None,
            status: None,
            role: Role::User,
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    #[must_use]
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            id: None,
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Message { .. } => "message",
            Self::FunctionCall { .. } => "function_call",
            Self::FunctionCallOutput { .. } => "function_call_output",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ItemRepr {
    Message {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        status: Option<ItemStatus>,
        role: Role,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        status: Option<ItemStatus>,
        name: String,
        call_id: String,
        #[serde(default)]
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        output: String,
    },
}

impl From<ItemRepr> for Item {
    fn from(repr: ItemRepr) -> Self {
        match repr {
            ItemRepr::Message {
                id,
                status,
                role,
                content,
            } => Self::Message {
                id,
                status,
                role,
                content,
            },
            ItemRepr::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            } => Self::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            },
            ItemRepr::FunctionCallOutput {
                id,
                call_id,
                output,
            } => Self::FunctionCallOutput {
                id,
                call_id,
                output,
            },
        }
    }
}

impl Serialize for Item {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::Message {
                id,
                status,
                role,
                content,
            } => {
                let mut state = serializer.serialize_struct("Item", 5)?;
                state.serialize_field("type", "message")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                if let Some(value) = status {
                    state.serialize_field("status", value)?;
                }
                state.serialize_field("role", role)?;
                state.serialize_field("content", content)?;
                state.end()
            }
            Self::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            } => {
                let mut state = serializer.serialize_struct("Item", 6)?;
                state.serialize_field("type", "function_call")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                if let Some(value) = status {
                    state.serialize_field("status", value)?;
                }
                state.serialize_field("name", name)?;
                state.serialize_field("call_id", call_id)?;
                state.serialize_field("arguments", arguments)?;
                state.end()
            }
            Self::FunctionCallOutput {
                id,
                call_id,
                output,
            } => {
                let mut state = serializer.serialize_struct("Item", 4)?;
                state.serialize_field("type", "function_call_output")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                state.serialize_field("call_id", call_id)?;
                state.serialize_field("output", output)?;
                state.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ItemRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse Item: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

/// Manual (de)serialization preserves unknown variants as raw JSON while keeping
/// strong typing for known parts.
#[derive(Debug, Clone)]
pub enum ContentPart {
    InputText {
        text: String,
    },
    OutputText {
        text: String,
    },
    OutputAudio {
        transcript: Option<String>,
    },
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPartRepr {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "output_text", alias = "text")]
    OutputText { text: String },
    #[serde(rename = "output_audio", alias = "audio")]
    OutputAudio {
        #[serde(default)]
        transcript: Option<String>,
    },
}

impl From<ContentPartRepr> for ContentPart {
    fn from(repr: ContentPartRepr) -> Self {
        match repr {
            ContentPartRepr::InputText { text } => Self::InputText { text },
            ContentPartRepr::OutputText { text } => Self::OutputText { text },
            ContentPartRepr::OutputAudio { transcript } => Self::OutputAudio { transcript },
        }
    }
}

impl Serialize for ContentPart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::InputText { text } => {
                let mut state = serializer.serialize_struct("ContentPart", 2)?;
                state.serialize_field("type", "input_text")?;
                state.serialize_field("text", text)?;
                state.end()
            }
            Self::OutputText { text } => {
                let mut state = serializer.serialize_struct("ContentPart", 2)?;
                state.serialize_field("type", "output_text")?;
                state.serialize_field("text", text)?;
                state.end()
            }
            Self::OutputAudio { transcript } => {
                let mut state = serializer.serialize_struct("ContentPart", 2)?;
                state.serialize_field("type", "output_audio")?;
                if let Some(value) = transcript {
                    state.serialize_field("transcript", value)?;
                }
                state.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ContentPartRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ContentPart: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}
