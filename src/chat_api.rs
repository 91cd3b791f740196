//! Chat channel over the course message-app WebSocket.
//!
//! The socket lives on its own thread with a single-threaded tokio runtime;
//! the UI thread talks to it through channels and polls for events.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const HEARTBEAT: &str = "heartbeat";
const MESSAGE: &str = "message";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not connected")]
    NotConnected,
    #[error("encoding frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message { username: String, text: String },
    Closed,
    Error(String),
}

/// What the chat session needs from a transport.
pub trait ChatTransport {
    /// Drops any current connection and joins `channel`.
    fn connect(&mut self, channel: &str);
    fn send(&mut self, text: &str, username: &str, channel: &str) -> Result<(), ChatError>;
    fn disconnect(&mut self);
    fn poll_event(&mut self) -> Option<ChannelEvent>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    key: String,
}

pub fn encode_frame(text: &str, username: &str, channel: &str, key: &str) -> Result<String, ChatError> {
    Ok(serde_json::to_string(&Frame {
        kind: MESSAGE.to_string(),
        data: text.to_string(),
        username: username.to_string(),
        channel: Some(channel.to_string()),
        key: key.to_string(),
    })?)
}

/// Only chat messages for `channel` get through; heartbeats, other
/// channels and malformed frames yield `None`.
pub fn decode_frame(raw: &str, channel: &str) -> Option<ChannelEvent> {
    let frame: Frame = match serde_json::from_str(raw) {
        Ok(f) => f,
        Err(err) => {
            tracing::debug!(%err, "ignoring malformed chat frame");
            return None;
        }
    };
    if frame.kind == HEARTBEAT || frame.channel.as_deref() != Some(channel) {
        return None;
    }
    (frame.kind == MESSAGE).then(|| ChannelEvent::Message {
        username: frame.username,
        text: frame.data,
    })
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

struct Link {
    out: UnboundedSender<String>,
    events: Receiver<ChannelEvent>,
    open: Arc<AtomicBool>,
}

pub struct WebSocketChannel {
    url: String,
    api_key: String,
    link: Option<Link>,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            link: None,
        }
    }
}

fn run_socket(
    url: String,
    channel_name: String,
    mut out_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    events: Sender<ChannelEvent>,
    open: Arc<AtomicBool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            let _ = events.send(ChannelEvent::Error(err.to_string()));
            return;
        }
    };
    runtime.block_on(async move {
        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "chat connect failed");
                let _ = events.send(ChannelEvent::Error(err.to_string()));
                let _ = events.send(ChannelEvent::Closed);
                return;
            }
        };
        tracing::info!(channel = %channel_name, "chat socket open");
        open.store(true, Ordering::SeqCst);
        let _ = events.send(ChannelEvent::Opened);
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                out = out_rx.recv() => match out {
                    Some(text) => {
                        if let Err(err) = write.send(Message::Text(text)).await {
                            let _ = events.send(ChannelEvent::Error(err.to_string()));
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        if let Some(event) = decode_frame(&raw, &channel_name) {
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(%err, "chat socket error");
                        let _ = events.send(ChannelEvent::Error(err.to_string()));
                        break;
                    }
                },
            }
        }
        open.store(false, Ordering::SeqCst);
        let _ = events.send(ChannelEvent::Closed);
        tracing::info!(channel = %channel_name, "chat socket closed");
    });
}

impl ChatTransport for WebSocketChannel {
    fn connect(&mut self, channel_name: &str) {
        self.disconnect();
        let (out, out_rx) = unbounded_channel();
        let (events_tx, events) = channel();
        let open = Arc::new(AtomicBool::new(false));
        let url = self.url.clone();
        let name = channel_name.to_string();
        let flag = open.clone();
        std::thread::spawn(move || run_socket(url, name, out_rx, events_tx, flag));
        self.link = Some(Link { out, events, open });
    }

    fn send(&mut self, text: &str, username: &str, channel_name: &str) -> Result<(), ChatError> {
        let link = self
            .link
            .as_ref()
            .filter(|l| l.open.load(Ordering::SeqCst))
            .ok_or(ChatError::NotConnected)?;
        let frame = encode_frame(text, username, channel_name, &self.api_key)?;
        link.out.send(frame).map_err(|_| ChatError::NotConnected)
    }

    /// Dropping the outgoing sender makes the socket thread close and exit.
    fn disconnect(&mut self) {
        self.link = None;
    }

    fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.link.as_ref()?.events.try_recv().ok()
    }
}
