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

//! Shared types for the chatrelay stranger relay.
//!
//! This crate defines the wire contract with the remote chat service
//! ([`packet`]) and the contract between the relay coordinator and whatever
//! control surface drives it ([`control`], [`chat`]).  It carries no
//! networking code.

pub mod chat;
pub mod control;
pub mod packet;

pub use chat::{LogEntry, MessageEvent, MessageSender};
pub use control::{
    ConnectionAction, ControlCommand, ControlEvent, CookieStatus, InvalidSessionId, SessionId,
    SessionStatus,
};
pub use packet::{DecodeError, Packet};
