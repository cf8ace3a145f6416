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

//! Typed events emitted by the protocol client.
//!
//! Each [`ProtocolClient`](crate::ProtocolClient) reports everything that
//! happens on its connection through one callback taking a [`ClientEvent`].
//! The session layer tags these with the session id before handing them to
//! the coordinator.

use std::sync::Arc;

use chatrelay_types::packet::{PeerCountry, SelfCountry};
use chatrelay_types::MessageEvent;

use crate::error::ClientError;

/// Why a connection ended without us asking for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The service sent a `disconnect` packet: the stranger left.
    StrangerLeft,
    /// The socket was closed by the service or the network.
    ConnectionClosed,
}

/// Events emitted by a protocol client.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    // === Connection Events ===
    /// The WebSocket handshake succeeded. Not the same as being matched.
    TransportConnected,

    /// A match request was sent; the service is looking for a stranger.
    Waiting,

    /// The service paired us with a stranger (`connected` channel).
    Matched,

    /// The connection ended on the remote side.
    Disconnected(DisconnectReason),

    /// Handshake rejection or socket failure.
    Error(ClientError),

    // === Chat Events ===
    /// A chat line, either from the stranger or echoed from `send_message`.
    Message(MessageEvent),

    /// The stranger started or stopped typing.
    Typing(bool),

    // === Service Info ===
    PeopleOnline(u64),

    SelfCountry(SelfCountry),

    PeerCountry(PeerCountry),

    /// Heartbeat echoed by the service, milliseconds since the epoch.
    Heartbeat(i64),
}

/// Callback receiving every event of one client.
pub type EventCallback = Arc<dyn Fn(ClientEvent) + Send + Sync>;
