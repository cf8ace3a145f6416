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

//! Chat log types shared between the relay engine and its control surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a line of a session's chat log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    /// Text we sent to the stranger.
    You,
    /// Text the stranger sent to us.
    Stranger,
    /// Status lines produced locally.
    System,
}

impl std::fmt::Display for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageSender::You => write!(f, "you"),
            MessageSender::Stranger => write!(f, "stranger"),
            MessageSender::System => write!(f, "system"),
        }
    }
}

/// A chat message travelling through a protocol client, either decoded from
/// the service or originated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub text: String,
    pub sender: MessageSender,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(sender: MessageSender, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

/// One line of a session's in-memory chat log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sender: MessageSender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(sender: MessageSender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
