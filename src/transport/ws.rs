use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use reqwest::header::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use url::Url;

use super::{ChannelEvent, ControlChannel, ControlChannelHandle};
use crate::error::{Error, Result};

const SIDEBAND_LABEL: &str = "sideband";

/// Open a sideband control channel to an already-negotiated call.
///
/// The channel is addressed by `call_id` and authorised with the ephemeral
/// credential used for the SDP exchange. `Open` is the first event delivered.
///
/// # Errors
/// Returns an error if the URL is invalid or the handshake fails.
pub async fn connect_sideband(
    base: &Url,
    credential: &str,
    call_id: &str,
) -> Result<ControlChannelHandle> {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("call_id", call_id);

    let mut auth_header = HeaderValue::from_str(&format!("Bearer {credential}"))?;
    auth_header.set_sensitive(true);

    let mut req = url.as_str().into_client_request()?;
    req.headers_mut().insert(reqwest::header::AUTHORIZATION, auth_header);
    let (stream, _) = connect_async(req).await?;

    tracing::info!(call_id, "Sideband control channel connected");
    Ok(spawn_channel(stream))
}

/// Drive an established WebSocket as a [`ControlChannel`].
#[must_use]
pub fn spawn_channel<S>(stream: WebSocketStream<S>) -> ControlChannelHandle
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                tracing::debug!("Sideband write failed: {e}");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let pong_tx = out_tx.clone();
    tokio::spawn(async move {
        let _ = evt_tx.send(ChannelEvent::Open);
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if evt_tx.send(ChannelEvent::Message(text.as_str().to_owned())).is_err() {
                        break;
                    }
                }
                Ok(Message::Ping(payload)) => {
                    tracing::debug!("Received Ping, sending Pong");
                    let _ = pong_tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Sideband closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Sideband read failed: {e}");
                    break;
                }
            }
        }
        let _ = evt_tx.send(ChannelEvent::Closed);
    });

    let channel = WsControlChannel {
        tx: out_tx,
        closed: AtomicBool::new(false),
    };
    ControlChannelHandle {
        channel: Arc::new(channel),
        events: evt_rx,
    }
}

struct WsControlChannel {
    tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

impl ControlChannel for WsControlChannel {
    fn label(&self) -> &str {
        SIDEBAND_LABEL
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Close(None));
        }
    }
}
