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

//! In-process stand-in for the chat service.

#![allow(dead_code)]

use std::time::Duration;

use chatrelay_types::Packet;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct MockChatServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

/// Server side of one accepted client connection.
pub struct MockConnection {
    pub cookie: Option<String>,
    pub origin: Option<String>,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MockChatServer {
    pub async fn start() -> Self {
        Self::start_with(None).await
    }

    /// A server that refuses every upgrade with `status`.
    pub async fn rejecting(status: u16) -> Self {
        Self::start_with(Some(status)).await
    }

    async fn start_with(reject: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(serve(stream, reject, conn_tx));
            }
        });

        Self { url, connections }
    }

    /// Wait for the next client to complete its handshake.
    pub async fn accept(&mut self) -> MockConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a client")
            .expect("server stopped")
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    reject: Option<u16>,
    conn_tx: mpsc::UnboundedSender<MockConnection>,
) {
    let (headers_tx, headers_rx) = oneshot::channel();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let _ = headers_tx.send((header("cookie"), header("origin")));
        match reject {
            Some(status) => {
                let mut response = ErrorResponse::new(Some("rejected".to_string()));
                *response.status_mut() = StatusCode::from_u16(status).unwrap();
                Err(response)
            }
            None => Ok(resp),
        }
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (cookie, origin) = headers_rx.await.unwrap_or_default();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let _ = conn_tx.send(MockConnection {
        cookie,
        origin,
        outbound: out_tx,
        inbound: in_rx,
    });

    let (mut sink, mut frames) = ws.split();
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    break;
                }
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = frames.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = in_tx.send(text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

impl MockConnection {
    pub fn send_packet(&self, packet: &Packet) {
        self.send_raw(&packet.encode().unwrap());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.outbound.send(Message::Text(text.to_string()));
    }

    /// Close the socket from the service side.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    /// Next frame from the client, or `None` once it closed the socket.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .map(|text| Packet::decode(&text).expect("client sent an undecodable frame"))
    }

    pub async fn next_non_heartbeat(&mut self) -> Option<Packet> {
        loop {
            match self.next_packet().await {
                Some(Packet::Heartbeat(_)) => continue,
                other => return other,
            }
        }
    }

    /// Count frames until the client closes, failing if it never does.
    pub async fn drain_until_closed(&mut self) -> usize {
        let mut frames = 0;
        while self.next_packet().await.is_some() {
            frames += 1;
        }
        frames
    }

    /// Collect every frame received within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<Packet> {
        let mut packets = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(text)) = tokio::time::timeout_at(deadline, self.inbound.recv()).await {
            packets.push(Packet::decode(&text).expect("client sent an undecodable frame"));
        }
        packets
    }
}
