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

//! Wire packets exchanged with the remote chat service.
//!
//! Every frame is a JSON object `{"channel": <tag>, "data": <payload>}` where
//! the payload shape is fixed by the channel tag.  Decoding happens in two
//! steps: the envelope is parsed first, then the payload is interpreted
//! according to the tag.  Unknown tags and mismatched payloads are reported as
//! [`DecodeError`] so callers can drop the frame and carry on.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Channel tags used on the wire.
pub mod channel {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const PEOPLE_ONLINE: &str = "peopleOnline";
    pub const SELF_COUNTRY: &str = "selfCountry";
    pub const MATCH: &str = "match";
    pub const CONNECTED: &str = "connected";
    pub const PEER_COUNTRY: &str = "peerCountry";
    pub const USER_AFK: &str = "userAFK";
    pub const USER_ACTIVE: &str = "userActive";
    pub const TYPING: &str = "typing";
    pub const MESSAGE: &str = "message";
    pub const DISCONNECT: &str = "disconnect";
}

/// Reasons a text frame could not be turned into a [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON object with a `channel` field.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The channel tag is not part of the protocol.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// The channel is known but its payload has the wrong shape.
    #[error("invalid payload for channel '{channel}': {reason}")]
    InvalidPayload { channel: String, reason: String },
}

/// Keep-alive payload, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: i64,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Country detected for our own connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfCountry {
    pub country: String,
    pub country_name: String,
    pub available: bool,
}

/// Country of the matched stranger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCountry {
    pub country: String,
    pub country_name: String,
}

/// Chat mode requested when matching. Only text chat is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchParams {
    pub interests: Vec<String>,
    pub prefer_same_country: bool,
}

/// Body of the `match` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub data: ChatMode,
    pub params: MatchParams,
}

impl MatchRequest {
    pub fn text(interests: Vec<String>, prefer_same_country: bool) -> Self {
        Self {
            data: ChatMode::Text,
            params: MatchParams {
                interests,
                prefer_same_country,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityReason {
    WindowBlur,
    WindowFocus,
}

/// Body of the `userAFK` / `userActive` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub timestamp: i64,
    pub reason: ActivityReason,
}

impl UserStatus {
    pub fn now(reason: ActivityReason) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            reason,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Heartbeat(Heartbeat),
    PeopleOnline(u64),
    SelfCountry(SelfCountry),
    Match(MatchRequest),
    /// The service matched us with a stranger.
    Connected,
    PeerCountry(PeerCountry),
    UserAfk(UserStatus),
    UserActive(UserStatus),
    Typing(bool),
    Message(String),
    /// The stranger left the chat.
    Disconnect,
}

#[derive(Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: Value,
}

impl Packet {
    /// The channel tag this packet travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Packet::Heartbeat(_) => channel::HEARTBEAT,
            Packet::PeopleOnline(_) => channel::PEOPLE_ONLINE,
            Packet::SelfCountry(_) => channel::SELF_COUNTRY,
            Packet::Match(_) => channel::MATCH,
            Packet::Connected => channel::CONNECTED,
            Packet::PeerCountry(_) => channel::PEER_COUNTRY,
            Packet::UserAfk(_) => channel::USER_AFK,
            Packet::UserActive(_) => channel::USER_ACTIVE,
            Packet::Typing(_) => channel::TYPING,
            Packet::Message(_) => channel::MESSAGE,
            Packet::Disconnect => channel::DISCONNECT,
        }
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let Envelope { channel, data } = envelope;

        let packet = match channel.as_str() {
            channel::HEARTBEAT => Packet::Heartbeat(payload(&channel, data)?),
            channel::PEOPLE_ONLINE => Packet::PeopleOnline(payload(&channel, data)?),
            channel::SELF_COUNTRY => Packet::SelfCountry(payload(&channel, data)?),
            channel::MATCH => Packet::Match(payload(&channel, data)?),
            // The service attaches an arbitrary list here; only the signal matters.
            channel::CONNECTED => Packet::Connected,
            channel::PEER_COUNTRY => Packet::PeerCountry(payload(&channel, data)?),
            channel::USER_AFK => Packet::UserAfk(payload(&channel, data)?),
            channel::USER_ACTIVE => Packet::UserActive(payload(&channel, data)?),
            channel::TYPING => Packet::Typing(payload(&channel, data)?),
            channel::MESSAGE => Packet::Message(payload(&channel, data)?),
            channel::DISCONNECT => Packet::Disconnect,
            _ => return Err(DecodeError::UnknownChannel(channel)),
        };
        Ok(packet)
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn payload<T: DeserializeOwned>(channel: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|e| DecodeError::InvalidPayload {
        channel: channel.to_string(),
        reason: e.to_string(),
    })
}

impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("channel", self.channel())?;
        match self {
            Packet::Heartbeat(heartbeat) => map.serialize_entry("data", heartbeat)?,
            Packet::PeopleOnline(count) => map.serialize_entry("data", count)?,
            Packet::SelfCountry(country) => map.serialize_entry("data", country)?,
            Packet::Match(request) => map.serialize_entry("data", request)?,
            Packet::Connected => map.serialize_entry("data", &[(); 0])?,
            Packet::PeerCountry(country) => map.serialize_entry("data", country)?,
            Packet::UserAfk(status) | Packet::UserActive(status) => {
                map.serialize_entry("data", status)?
            }
            Packet::Typing(typing) => map.serialize_entry("data", typing)?,
            Packet::Message(text) => map.serialize_entry("data", text)?,
            Packet::Disconnect => {}
        }
        map.end()
    }
}
