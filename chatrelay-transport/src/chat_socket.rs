/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Text-frame WebSocket connection to the chat service.
//!
//! The service speaks JSON over text frames only, so [`ChatSocket`] exposes
//! exactly that: send a text frame, receive text frames from a channel, close.
//! The upgrade request can carry extra headers (session cookie, `Origin`) and
//! a refused upgrade is reported with its HTTP status, which is how an expired
//! cookie shows up.
//!
//! ```no_run
//! use chatrelay_transport::{ChatSocket, SocketFrame};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (socket, mut frames) =
//!     ChatSocket::connect("wss://chat.example:8443/", &[("Cookie", "session=abc")]).await?;
//! socket.send_text(r#"{"channel":"message","data":"hi"}"#.to_string()).await?;
//!
//! while let Some(SocketFrame::Text(text)) = frames.recv().await {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_QUEUE: usize = 100;

/// Why the upgrade to a WebSocket did not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The service answered the upgrade with a non-101 status.
    #[error("upgrade rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// Bad URL or header; nothing was sent.
    #[error("invalid upgrade request: {0}")]
    InvalidRequest(String),

    /// DNS, TCP, TLS or protocol failure.
    #[error("could not reach chat service: {0}")]
    Network(String),
}

impl HandshakeError {
    /// The HTTP status of a rejected upgrade.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            HandshakeError::Rejected { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for HandshakeError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => HandshakeError::Rejected {
                status: response.status().as_u16(),
            },
            tungstenite::Error::Url(e) => HandshakeError::InvalidRequest(e.to_string()),
            other => HandshakeError::Network(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("socket is closed")]
    Closed,
    #[error("failed to write frame: {0}")]
    Write(String),
}

/// Delivered on the frame channel returned by [`ChatSocket::connect`].
///
/// The channel closing means the connection is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    /// Read failure. Always the last item before the channel closes.
    Error(String),
}

/// Write half of a chat connection. Clones share the same socket.
#[derive(Clone)]
pub struct ChatSocket {
    sink: Arc<Mutex<SplitSink<Stream, Message>>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChatSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSocket")
            .field("open", &self.is_open())
            .finish()
    }
}

impl ChatSocket {
    /// Open a connection, adding `headers` to the upgrade request.
    ///
    /// A header given here replaces any `tungstenite` would generate.
    pub async fn connect(
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<(Self, mpsc::Receiver<SocketFrame>), HandshakeError> {
        let request = upgrade_request(url, headers)?;
        debug!("Opening WebSocket to {url}");

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        info!("WebSocket to {url} open (HTTP {})", response.status());

        let (sink, source) = stream.split();
        let closed = Arc::new(AtomicBool::new(false));
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE);
        tokio::spawn(read_frames(source, frames_tx, closed.clone()));

        let socket = Self {
            sink: Arc::new(Mutex::new(sink)),
            closed,
        };
        Ok((socket, frames_rx))
    }

    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| SendError::Write(e.to_string()))
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Send a close frame. Only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.sink.lock().await.send(Message::Close(None)).await {
            warn!("Failed to send close frame: {e}");
        }
    }
}

fn upgrade_request(url: &str, headers: &[(&str, &str)]) -> Result<Request, HandshakeError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| HandshakeError::InvalidRequest(format!("'{url}': {e}")))?;
    for (name, value) in headers {
        let name_bytes = name.as_bytes();
        let name = HeaderName::from_bytes(name_bytes)
            .map_err(|e| HandshakeError::InvalidRequest(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HandshakeError::InvalidRequest(format!("value of '{name}': {e}")))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

/// Forward text frames until the peer closes, the read fails, or the
/// receiving side goes away.
async fn read_frames(
    mut source: SplitStream<Stream>,
    frames: mpsc::Sender<SocketFrame>,
    closed: Arc<AtomicBool>,
) {
    while let Some(item) = source.next().await {
        match item {
            Ok(Message::Text(text)) => {
                if frames.send(SocketFrame::Text(text)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("Peer closed WebSocket: {frame:?}");
                break;
            }
            Ok(other) => trace!("Ignoring non-text frame ({} bytes)", other.len()),
            Err(e) => {
                // Errors after our own close are the expected teardown.
                if !closed.load(Ordering::Acquire) {
                    warn!("WebSocket read failed: {e}");
                    let _ = frames.send(SocketFrame::Error(e.to_string())).await;
                }
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
    trace!("WebSocket reader finished");
}
