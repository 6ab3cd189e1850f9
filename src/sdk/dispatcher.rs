use std::sync::Arc;

use tokio::sync::mpsc;

use super::handle::EventSink;
use super::handlers::EventHandlers;
use super::manager::{Link, LinkStreams};
use super::tools::{PendingFunctionCall, ToolBridge};
use super::voice::{TranscriptChunk, UserTranscript};
use crate::Error;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::codec;
use crate::protocol::server_events::ServerEvent;
use crate::transport::{ChannelEvent, MediaTrack};

/// Routes inbound control-channel messages for one live link.
///
/// Runs as a single task, so messages are handled strictly in arrival order
/// and each handler completes before the next message is read.
pub(crate) struct Dispatcher {
    link: Link,
    handlers: Arc<EventHandlers>,
    tools: Option<Arc<ToolBridge>>,
}

impl Dispatcher {
    pub(crate) const fn new(
        link: Link,
        handlers: Arc<EventHandlers>,
        tools: Option<Arc<ToolBridge>>,
    ) -> Self {
        Self { link, handlers, tools }
    }

    pub(crate) async fn run(self, streams: LinkStreams, speak_first: bool) {
        let LinkStreams { mut events, backlog, mut peer_state, mut remote_tracks } = streams;

        if speak_first {
            self.link.send_event(&ClientEvent::response_create());
        }
        for text in backlog {
            self.handle_message(&text);
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ChannelEvent::Message(text)) => self.handle_message(&text),
                    Some(ChannelEvent::Open) => {}
                    Some(ChannelEvent::Closed) | None => {
                        self.link.terminate("control channel closed");
                        return;
                    }
                },
                changed = peer_state.changed() => {
                    let state = *peer_state.borrow_and_update();
                    if changed.is_err() || state.is_terminal() {
                        self.link.terminate("peer connection lost");
                        return;
                    }
                }
                track = next_track(&mut remote_tracks) => match track {
                    Some(track) => self.link.attach_playback(track),
                    None => remote_tracks = None,
                },
            }
        }
    }

    pub(crate) fn handle_message(&self, text: &str) {
        let event = match codec::decode(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(session = %self.link.label(), error = %e, "Dropping malformed control message");
                return;
            }
        };
        self.handlers.raw_event(&event);

        match event {
            ServerEvent::SessionCreated { session, .. } => {
                tracing::debug!(session = %self.link.label(), id = ?session.id, "Session created");
            }
            ServerEvent::SessionUpdated { .. } => {
                tracing::debug!(session = %self.link.label(), "Session updated");
            }
            ServerEvent::ResponseCreated { response, .. } => {
                tracing::debug!(session = %self.link.label(), response_id = %response.id, "Response started");
            }
            ServerEvent::ResponseOutputAudioDelta { .. } => self.link.set_speaking(true),
            ServerEvent::ResponseOutputAudioDone { .. } => self.link.set_speaking(false),
            ServerEvent::ResponseOutputAudioTranscriptDelta { response_id, item_id, delta, .. } => {
                self.handlers.transcript(TranscriptChunk {
                    response_id,
                    item_id,
                    text: delta,
                    is_final: false,
                });
            }
            ServerEvent::ResponseOutputAudioTranscriptDone { response_id, item_id, transcript, .. } => {
                self.handlers.transcript(TranscriptChunk {
                    response_id,
                    item_id,
                    text: transcript,
                    is_final: true,
                });
            }
            ServerEvent::InputAudioTranscriptionCompleted { item_id, transcript, .. } => {
                self.handlers.user_transcript(UserTranscript { item_id, transcript });
            }
            // The endpoint handles barge-in itself; only local state changes.
            ServerEvent::InputAudioBufferSpeechStarted { .. } => self.link.set_speaking(false),
            ServerEvent::InputAudioBufferSpeechStopped { .. } => {
                tracing::debug!(session = %self.link.label(), "User stopped speaking");
            }
            // Informational only. Function calls are acted on at response.done,
            // once the response is closed and a new one may be requested.
            ServerEvent::ResponseOutputItemDone { item, .. } => {
                tracing::debug!(session = %self.link.label(), %item, "Output item done");
            }
            ServerEvent::ResponseDone { response, .. } => {
                self.link.set_speaking(false);
                let calls = PendingFunctionCall::harvest(&response);
                if calls.is_empty() {
                    return;
                }
                match &self.tools {
                    Some(tools) => tools.dispatch_batch(&self.link, &calls),
                    None => tracing::warn!(
                        session = %self.link.label(),
                        count = calls.len(),
                        "Function calls received but no tools are registered"
                    ),
                }
            }
            ServerEvent::Error { error, .. } => {
                tracing::warn!(session = %self.link.label(), %error, "Realtime endpoint reported an error");
                let err = Error::Remote(error);
                self.link.record_error(&err);
                self.handlers.error(&err);
            }
            ServerEvent::Unknown(value) => {
                tracing::debug!(
                    session = %self.link.label(),
                    kind = value.get("type").and_then(|v| v.as_str()).unwrap_or("<untyped>"),
                    "Ignoring unrecognized event"
                );
            }
        }
    }
}

async fn next_track(rx: &mut Option<mpsc::UnboundedReceiver<MediaTrack>>) -> Option<MediaTrack> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
