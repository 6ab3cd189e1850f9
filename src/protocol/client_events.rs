use serde::{Deserialize, Serialize};
use super::models::{Item, SessionUpdate};

/// Events this crate writes to the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: Box<SessionUpdate>,
    },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: Box<Item>,
    },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
}

impl ClientEvent {
    #[must_use]
    pub fn session_update(update: SessionUpdate) -> Self {
        Self::SessionUpdate {
            event_id: None,
            session: Box::new(update),
        }
    }

    #[must_use]
    pub fn item_create(item: Item) -> Self {
        Self::ConversationItemCreate {
            event_id: None,
            previous_item_id: None,
            item: Box::new(item),
        }
    }

    /// Request a response using the session's defaults.
    #[must_use]
    pub const fn response_create() -> Self {
        Self::ResponseCreate { event_id: None }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate { .. } => "response.create",
        }
    }
}
