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

//! Relay engine for two simultaneous anonymous text chats.
//!
//! The crate is layered bottom-up:
//!
//! * [`transform`] rewrites stranger text (gender tokens, numbers);
//! * [`ProtocolClient`] owns one WebSocket connection to the chat service and
//!   reports it as [`ClientEvent`]s;
//! * [`Session`] is one chat slot with its status, log and transform
//!   settings;
//! * [`Coordinator`] owns both slots, relays stranger text between them and
//!   keeps them in sync when a stranger leaves.
//!
//! # Outline of usage
//!
//! ```no_run
//! use chatrelay_client::{Coordinator, RelaySettings};
//! use chatrelay_types::{ConnectionAction, ControlCommand, SessionId};
//!
//! # async fn example() {
//! let (coordinator, handle) = Coordinator::new(RelaySettings::default(), "cf_clearance=...");
//! let mut events = handle.subscribe();
//! tokio::spawn(coordinator.run());
//!
//! for id in SessionId::ALL {
//!     handle.send(ControlCommand::Action { client_id: id, action: ConnectionAction::Connect });
//! }
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod constants;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod events;
pub mod protocol_client;
pub mod session;
pub mod settings;
pub mod transform;

pub use coordinator::{Coordinator, CoordinatorHandle, CredentialUpdate};
pub use credential::Credential;
pub use error::ClientError;
pub use events::{ClientEvent, DisconnectReason, EventCallback};
pub use protocol_client::{ConnectAttempt, ProtocolClient, ProtocolClientOptions};
pub use session::{Session, SessionEvent, SessionSignal};
pub use settings::{DisconnectPolicy, RelaySettings};
pub use transform::TransformConfig;
