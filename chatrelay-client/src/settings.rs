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

//! Runtime settings shared by the coordinator and its sessions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ORIGIN, DEFAULT_SERVER_URL, HEARTBEAT_INTERVAL_SECS};
use crate::credential::Credential;
use crate::protocol_client::ProtocolClientOptions;

/// What happens to the partner session when one session loses its stranger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Reset both sessions and clear both logs.
    #[default]
    Synchronized,
    /// Only the affected session resets.
    Independent,
}

impl fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectPolicy::Synchronized => write!(f, "synchronized"),
            DisconnectPolicy::Independent => write!(f, "independent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown disconnect policy '{0}' (expected 'synchronized' or 'independent')")]
pub struct UnknownDisconnectPolicy(pub String);

impl FromStr for DisconnectPolicy {
    type Err = UnknownDisconnectPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synchronized" | "sync" => Ok(DisconnectPolicy::Synchronized),
            "independent" => Ok(DisconnectPolicy::Independent),
            _ => Err(UnknownDisconnectPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// WebSocket endpoint of the chat service.
    pub server_url: String,
    /// `Origin` header presented during the handshake.
    pub origin: String,
    /// Interests sent with every match request.
    pub interests: Vec<String>,
    pub prefer_same_country: bool,
    pub heartbeat_interval_secs: u64,
    /// Initial state of the relay toggle.
    pub relay_enabled: bool,
    pub disconnect_policy: DisconnectPolicy,
    /// Reconnect the reset sessions right after a stranger leaves.
    pub auto_rematch: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            interests: Vec::new(),
            prefer_same_country: true,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            relay_enabled: true,
            disconnect_policy: DisconnectPolicy::default(),
            auto_rematch: false,
        }
    }
}

impl RelaySettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Options for a fresh protocol client using `credential`.
    pub fn client_options(&self, credential: Credential) -> ProtocolClientOptions {
        ProtocolClientOptions {
            server_url: self.server_url.clone(),
            origin: self.origin.clone(),
            credential,
            heartbeat_interval: self.heartbeat_interval(),
        }
    }
}
