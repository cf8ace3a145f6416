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

//! Protocol client for the remote chat service.
//!
//! Owns at most one WebSocket connection and presents it as a stream of
//! [`ClientEvent`]s plus a few commands (match, send, disconnect).  Media of
//! any kind is out of scope; this is the text-chat protocol only.
//!
//! Each [`connect()`](ProtocolClient::connect) spawns one connection task.
//! That task owns the socket, the decode loop and the keep-alive interval,
//! so all three stop together on every exit path: local disconnect, the
//! stranger leaving, the service closing the socket, or a read failure.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chatrelay_client::{ClientEvent, Credential, ProtocolClient, ProtocolClientOptions};
//!
//! # async fn example() {
//! let mut client = ProtocolClient::new(
//!     ProtocolClientOptions {
//!         server_url: "wss://chat.example:8443/".into(),
//!         origin: "https://chat.example".into(),
//!         credential: Credential::new("cf_clearance=..."),
//!         heartbeat_interval: Duration::from_secs(30),
//!     },
//!     Arc::new(|event: ClientEvent| println!("{event:?}")),
//! );
//!
//! if client.connect().wait().await.is_ok() {
//!     client.start_matching(&[], true);
//! }
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatrelay_transport::{ChatSocket, SocketFrame};
use chatrelay_types::packet::{ActivityReason, Heartbeat, MatchRequest, UserStatus};
use chatrelay_types::{MessageEvent, MessageSender, Packet};
use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::constants::HEARTBEAT_INTERVAL_SECS;
use crate::credential::Credential;
use crate::error::ClientError;
use crate::events::{ClientEvent, DisconnectReason, EventCallback};

/// Configuration for [`ProtocolClient`].
#[derive(Debug, Clone)]
pub struct ProtocolClientOptions {
    /// WebSocket endpoint of the chat service.
    pub server_url: String,

    /// Value of the `Origin` handshake header.
    pub origin: String,

    /// Sent as the `Cookie` handshake header.
    pub credential: Credential,

    /// Period of the keep-alive `heartbeat` packet. Zero falls back to the
    /// service default of 30 seconds.
    pub heartbeat_interval: Duration,
}

enum Command {
    Send(Packet),
    Close,
}

/// Outcome of one [`ProtocolClient::connect`] call.
///
/// Dropping it is fine; the same outcome is also reported through the event
/// callback.
#[must_use = "await `wait()` to learn whether the handshake succeeded"]
pub struct ConnectAttempt {
    outcome: oneshot::Receiver<Result<(), ClientError>>,
}

impl ConnectAttempt {
    /// Resolves once the handshake succeeded, failed, or was aborted.
    pub async fn wait(self) -> Result<(), ClientError> {
        self.outcome.await.unwrap_or(Err(ClientError::Aborted))
    }
}

/// A client for one chat connection.
///
/// Commands never block and never fail: packets for a connection that is not
/// open are dropped, which is how the service's own web client behaves.
pub struct ProtocolClient {
    options: ProtocolClientOptions,
    on_event: EventCallback,
    connected: Arc<AtomicBool>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("server_url", &self.options.server_url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ProtocolClient {
    /// Create a client. Nothing happens on the network until
    /// [`connect()`](Self::connect).
    pub fn new(options: ProtocolClientOptions, on_event: EventCallback) -> Self {
        Self {
            options,
            on_event,
            connected: Arc::new(AtomicBool::new(false)),
            commands: None,
            task: None,
        }
    }

    /// Open the connection.
    ///
    /// Must be called from within a Tokio runtime.  Only one connection task
    /// may be alive per client; a second call while one is running settles
    /// immediately with [`ClientError::AlreadyConnecting`].
    pub fn connect(&mut self) -> ConnectAttempt {
        let (done_tx, done_rx) = oneshot::channel();
        let attempt = ConnectAttempt { outcome: done_rx };

        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            let _ = done_tx.send(Err(ClientError::AlreadyConnecting));
            return attempt;
        }

        // A fresh flag per attempt, so a previous task winding down cannot
        // clear the state of this one.
        self.connected = Arc::new(AtomicBool::new(false));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            url: self.options.server_url.clone(),
            origin: self.options.origin.clone(),
            cookie: self.options.credential.cookie().to_string(),
            heartbeat_interval: if self.options.heartbeat_interval.is_zero() {
                Duration::from_secs(HEARTBEAT_INTERVAL_SECS)
            } else {
                self.options.heartbeat_interval
            },
            on_event: self.on_event.clone(),
            connected: self.connected.clone(),
        };

        self.commands = Some(command_tx);
        self.task = Some(tokio::spawn(connection.run(command_rx, done_tx)));
        attempt
    }

    /// Ask the service for a text-chat stranger.
    pub fn start_matching(&self, interests: &[String], prefer_same_country: bool) {
        self.send_packet(Packet::Match(MatchRequest::text(
            interests.to_vec(),
            prefer_same_country,
        )));
        (self.on_event)(ClientEvent::Waiting);
    }

    /// Send a chat line to the stranger.
    ///
    /// The local echo is emitted even when the connection is not open, so the
    /// caller's view reflects what the user tried to say.
    pub fn send_message(&self, text: &str) {
        self.send_packet(Packet::Message(text.to_string()));
        (self.on_event)(ClientEvent::Message(MessageEvent::new(
            MessageSender::You,
            text,
        )));
    }

    /// Tell the service the user went idle (`WindowBlur`) or came back.
    pub fn report_activity(&self, reason: ActivityReason) {
        let status = UserStatus::now(reason);
        let packet = match reason {
            ActivityReason::WindowBlur => Packet::UserAfk(status),
            ActivityReason::WindowFocus => Packet::UserActive(status),
        };
        self.send_packet(packet);
    }

    /// Close the connection. Safe to call at any time, any number of times.
    ///
    /// A pending [`ConnectAttempt`] settles with [`ClientError::Aborted`].
    /// No event is emitted for a disconnect we asked for.
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Release);
        if let Some(commands) = self.commands.take() {
            debug!("Disconnecting from {}", self.options.server_url);
            let _ = commands.send(Command::Close);
        }
        self.task = None;
    }

    /// Whether the WebSocket is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send_packet(&self, packet: Packet) {
        if !self.is_connected() {
            debug!("Dropping {} packet: not connected", packet.channel());
            return;
        }
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Send(packet));
        }
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    StrangerLeft,
}

/// State moved into the connection task.
struct Connection {
    url: String,
    origin: String,
    cookie: String,
    heartbeat_interval: Duration,
    on_event: EventCallback,
    connected: Arc<AtomicBool>,
}

impl Connection {
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        done: oneshot::Sender<Result<(), ClientError>>,
    ) {
        let headers = [
            ("Cookie", self.cookie.as_str()),
            ("Origin", self.origin.as_str()),
        ];

        let (socket, mut inbound) = tokio::select! {
            result = ChatSocket::connect(&self.url, &headers) => match result {
                Ok(connection) => connection,
                Err(e) => {
                    let err = ClientError::from(e);
                    warn!("Connection to {} failed: {err}", self.url);
                    (self.on_event)(ClientEvent::Error(err.clone()));
                    let _ = done.send(Err(err));
                    return;
                }
            },
            () = wait_for_close(&mut commands) => {
                debug!("Connect to {} aborted", self.url);
                let _ = done.send(Err(ClientError::Aborted));
                return;
            }
        };

        self.connected.store(true, Ordering::Release);
        info!("WebSocket established with {}", self.url);
        (self.on_event)(ClientEvent::TransportConnected);
        let _ = done.send(Ok(()));

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.send(&socket, Packet::Heartbeat(Heartbeat::now())).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Send(packet)) => self.send(&socket, packet).await,
                    Some(Command::Close) | None => {
                        self.close(&socket).await;
                        break;
                    }
                },
                frame = inbound.recv() => match frame {
                    Some(SocketFrame::Text(text)) => {
                        if self.dispatch(&text) == Flow::StrangerLeft {
                            self.close(&socket).await;
                            self.connected.store(false, Ordering::Release);
                            (self.on_event)(ClientEvent::Disconnected(
                                DisconnectReason::StrangerLeft,
                            ));
                            break;
                        }
                    }
                    Some(SocketFrame::Error(reason)) => {
                        (self.on_event)(ClientEvent::Error(ClientError::Transport(reason)));
                    }
                    None => {
                        info!("WebSocket to {} closed", self.url);
                        self.connected.store(false, Ordering::Release);
                        (self.on_event)(ClientEvent::Disconnected(
                            DisconnectReason::ConnectionClosed,
                        ));
                        break;
                    }
                },
            }
        }

        self.connected.store(false, Ordering::Release);
        debug!("Connection task for {} finished", self.url);
    }

    /// Decode one frame and emit the matching event.
    fn dispatch(&self, text: &str) -> Flow {
        let packet = match Packet::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to parse packet ({e}): {text}");
                return Flow::Continue;
            }
        };
        trace!("Received {} packet", packet.channel());

        let event = match packet {
            Packet::PeopleOnline(count) => ClientEvent::PeopleOnline(count),
            Packet::Heartbeat(heartbeat) => ClientEvent::Heartbeat(heartbeat.timestamp),
            Packet::SelfCountry(country) => {
                info!("Detected country: {}", country.country_name);
                ClientEvent::SelfCountry(country)
            }
            Packet::Connected => ClientEvent::Matched,
            Packet::PeerCountry(country) => ClientEvent::PeerCountry(country),
            Packet::Typing(typing) => ClientEvent::Typing(typing),
            Packet::Message(text) => {
                ClientEvent::Message(MessageEvent::new(MessageSender::Stranger, text))
            }
            Packet::Disconnect => {
                info!("Stranger disconnected");
                return Flow::StrangerLeft;
            }
            Packet::Match(_) | Packet::UserAfk(_) | Packet::UserActive(_) => {
                debug!("Ignoring outbound-only packet on inbound side");
                return Flow::Continue;
            }
        };
        (self.on_event)(event);
        Flow::Continue
    }

    async fn send(&self, socket: &ChatSocket, packet: Packet) {
        let channel = packet.channel();
        match packet.encode() {
            Ok(text) => {
                if let Err(e) = socket.send_text(text).await {
                    warn!("Failed to send {channel} packet: {e}");
                } else {
                    trace!("Sent {channel} packet");
                }
            }
            Err(e) => warn!("Failed to encode {channel} packet: {e}"),
        }
    }

    async fn close(&self, socket: &ChatSocket) {
        debug!("Closing WebSocket to {}", self.url);
        socket.close().await;
    }
}

/// Resolves when a close is requested or the client handle is gone.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Close => return,
            Command::Send(packet) => {
                debug!("Dropping {} packet: handshake pending", packet.channel());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<ClientEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: EventCallback =
            Arc::new(move |event: ClientEvent| sink.lock().unwrap().push(event));
        (callback, events)
    }

    fn options(url: &str) -> ProtocolClientOptions {
        ProtocolClientOptions {
            server_url: url.to_string(),
            origin: "http://localhost".to_string(),
            credential: Credential::new("test=1"),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_client_not_connected_initially() {
        let (callback, _) = recorder();
        let client = ProtocolClient::new(options("ws://127.0.0.1:1/"), callback);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_send_without_connection_still_echoes() {
        let (callback, events) = recorder();
        let client = ProtocolClient::new(options("ws://127.0.0.1:1/"), callback);
        client.send_message("hello?");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ClientEvent::Message(message) => {
                assert_eq!(message.sender, MessageSender::You);
                assert_eq!(message.text, "hello?");
            }
            other => panic!("Expected local echo, got {other:?}"),
        }
    }

    #[test]
    fn test_start_matching_emits_waiting() {
        let (callback, events) = recorder();
        let client = ProtocolClient::new(options("ws://127.0.0.1:1/"), callback);
        client.start_matching(&["music".to_string()], false);
        assert_eq!(*events.lock().unwrap(), vec![ClientEvent::Waiting]);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (callback, events) = recorder();
        let mut client = ProtocolClient::new(options("ws://127.0.0.1:1/"), callback);
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error() {
        let (callback, events) = recorder();
        let mut client = ProtocolClient::new(options("ws://127.0.0.1:1/"), callback);

        let result = client.connect().wait().await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert!(!client.is_connected());
        assert!(matches!(
            events.lock().unwrap().as_slice(),
            [ClientEvent::Error(ClientError::Transport(_))]
        ));
    }

    #[tokio::test]
    async fn test_disconnect_settles_pending_connect() {
        // Accepts TCP but never answers the upgrade, so the handshake hangs.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let _hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let (callback, events) = recorder();
        let mut client = ProtocolClient::new(options(&url), callback);
        let attempt = client.connect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.disconnect();

        let result = tokio::time::timeout(Duration::from_secs(2), attempt.wait())
            .await
            .expect("connect attempt must settle");
        assert_eq!(result, Err(ClientError::Aborted));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_connect_while_pending_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let _hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let (callback, _) = recorder();
        let mut client = ProtocolClient::new(options(&url), callback);
        let first = client.connect();
        let second = client.connect();
        assert_eq!(second.wait().await, Err(ClientError::AlreadyConnecting));

        client.disconnect();
        assert_eq!(first.wait().await, Err(ClientError::Aborted));
    }
}
