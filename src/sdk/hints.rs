use super::handle::ConnectionState;
use super::manager::PeerTransportManager;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::Item;

/// Prefix that marks a user-role item as context rather than speech.
pub const CONTEXT_MARKER: &str = "[CONTEXT UPDATE]";

/// Fire-and-forget context injection.
///
/// A hint is a user-role item that is never followed by `response.create`, so
/// the model absorbs it without starting a turn.
#[derive(Clone, Debug)]
pub struct HintChannel {
    transport: PeerTransportManager,
}

impl HintChannel {
    #[must_use]
    pub const fn new(transport: PeerTransportManager) -> Self {
        Self { transport }
    }

    /// Send a hint. Silently dropped unless connected.
    pub fn send_hint(&self, text: &str) -> bool {
        if self.transport.state() != ConnectionState::Connected {
            tracing::debug!(session = %self.transport.label(), "Hint dropped: not connected");
            return false;
        }
        self.transport
            .send_event(&ClientEvent::item_create(Item::user_text(wrap(text))))
    }
}

fn wrap(text: &str) -> String {
    format!("{CONTEXT_MARKER} {}", text.trim())
}
