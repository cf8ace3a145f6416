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

//! Messages exchanged between the relay coordinator and its control surface.
//!
//! The control surface can be any bidirectional event channel; these types
//! define the JSON contract (`{"type": "...", ...}`) independent of transport.

use serde::{Deserialize, Serialize};

use crate::chat::MessageSender;

/// Returned when a control message names a session slot that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session id {0}, expected 1 or 2")]
pub struct InvalidSessionId(pub u8);

/// One of the two session slots owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SessionId {
    First,
    Second,
}

impl SessionId {
    pub const ALL: [SessionId; 2] = [SessionId::First, SessionId::Second];

    /// The slot this one relays to.
    pub fn partner(self) -> Self {
        match self {
            SessionId::First => SessionId::Second,
            SessionId::Second => SessionId::First,
        }
    }

    /// Zero-based position in the coordinator's arena.
    pub fn index(self) -> usize {
        match self {
            SessionId::First => 0,
            SessionId::Second => 1,
        }
    }
}

impl TryFrom<u8> for SessionId {
    type Error = InvalidSessionId;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SessionId::First),
            2 => Ok(SessionId::Second),
            other => Err(InvalidSessionId(other)),
        }
    }
}

impl From<SessionId> for u8 {
    fn from(id: SessionId) -> Self {
        match id {
            SessionId::First => 1,
            SessionId::Second => 2,
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Waiting,
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Connect,
    Disconnect,
}

/// Progress of the external credential provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieStatus {
    Retrieving,
    Ready,
    Error,
}

/// Commands accepted from the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlCommand {
    /// Announce interest in a slot; answered with its current status.
    Spawn { id: SessionId },

    #[serde(rename_all = "camelCase")]
    Action {
        client_id: SessionId,
        action: ConnectionAction,
    },

    /// Replace a slot's transform configuration.
    #[serde(rename_all = "camelCase")]
    Settings {
        client_id: SessionId,
        gender: bool,
        offset: i64,
    },

    Relay { enabled: bool },

    /// Send text as ourselves on one session. Ignored unless it is connected.
    #[serde(rename_all = "camelCase")]
    Message { client_id: SessionId, text: String },

    /// Send text on every connected session.
    Broadcast { text: String },
}

/// Events published to the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlEvent {
    Status {
        id: SessionId,
        status: SessionStatus,
    },
    Message {
        id: SessionId,
        sender: MessageSender,
        text: String,
    },
    Relay {
        enabled: bool,
    },
    CookieStatus {
        status: CookieStatus,
    },
    /// The session's log was wiped by a disconnect resync.
    LogCleared {
        id: SessionId,
    },
    Typing {
        id: SessionId,
        typing: bool,
    },
    PeopleOnline {
        id: SessionId,
        count: u64,
    },
    #[serde(rename_all = "camelCase")]
    PeerCountry {
        id: SessionId,
        country: String,
        country_name: String,
    },
}
