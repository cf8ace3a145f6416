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

use chatrelay_transport::HandshakeError;

/// Failures reported by a [`ProtocolClient`](crate::ProtocolClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The service answered the upgrade request with a non-success status,
    /// typically because the credential expired.
    #[error("handshake rejected with HTTP {status}")]
    HandshakeRejected { status: u16 },

    /// Socket-level failure while connecting or reading.
    #[error("transport error: {0}")]
    Transport(String),

    /// `disconnect()` was called before the handshake completed.
    #[error("connect attempt aborted")]
    Aborted,

    /// `connect()` was called while a connection task is still alive.
    #[error("a connection is already active on this client")]
    AlreadyConnecting,
}

impl From<HandshakeError> for ClientError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Rejected { status } => ClientError::HandshakeRejected { status },
            other => ClientError::Transport(other.to_string()),
        }
    }
}
