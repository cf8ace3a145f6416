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

//! One chat slot: a protocol client plus its status, log and transform
//! settings.
//!
//! A session never talks to its partner.  Anything that concerns both slots
//! (relaying, disconnect resync) is reported upward as a [`SessionSignal`]
//! and handled by the coordinator.

use std::sync::Arc;

use async_broadcast::Sender;
use chatrelay_types::{ControlEvent, LogEntry, MessageSender, SessionId, SessionStatus};
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;

use crate::constants::{LOG_CONNECTED, LOG_DISCONNECTED, LOG_LOOKING};
use crate::credential::Credential;
use crate::events::{ClientEvent, EventCallback};
use crate::protocol_client::ProtocolClient;
use crate::settings::RelaySettings;
use crate::transform::TransformConfig;

/// A client event tagged with the slot and connect cycle it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub id: SessionId,
    pub epoch: u64,
    pub event: ClientEvent,
}

/// What a session needs the coordinator to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The stranger said something while we were connected.
    StrangerMessage(String),
    /// The stranger is gone (left, socket closed, or transport failure).
    StrangerLost,
}

#[derive(Debug, Clone, Default)]
struct MatchPreferences {
    interests: Vec<String>,
    prefer_same_country: bool,
}

pub struct Session {
    id: SessionId,
    status: SessionStatus,
    transform: TransformConfig,
    log: Vec<LogEntry>,
    epoch: u64,
    preferences: MatchPreferences,
    client: Option<ProtocolClient>,
    events: Sender<ControlEvent>,
}

impl Session {
    pub fn new(id: SessionId, events: Sender<ControlEvent>) -> Self {
        Self {
            id,
            status: SessionStatus::Disconnected,
            transform: TransformConfig::default(),
            log: Vec::new(),
            epoch: 0,
            preferences: MatchPreferences::default(),
            client: None,
            events,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn transform(&self) -> TransformConfig {
        self.transform
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Connect cycle counter. Events from older cycles are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a connect cycle with a fresh credential and protocol client.
    ///
    /// Returns `false` (and does nothing) unless the session is disconnected.
    /// The outcome arrives later as [`SessionEvent`]s on `session_events`.
    pub fn connect(
        &mut self,
        settings: &RelaySettings,
        cookie: &str,
        session_events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> bool {
        if self.status != SessionStatus::Disconnected {
            debug!("Session {} ignoring connect while {}", self.id, self.status);
            return false;
        }

        self.epoch += 1;
        self.preferences = MatchPreferences {
            interests: settings.interests.clone(),
            prefer_same_country: settings.prefer_same_country,
        };

        let (id, epoch, tx) = (self.id, self.epoch, session_events.clone());
        let on_event: EventCallback = Arc::new(move |event: ClientEvent| {
            let _ = tx.send(SessionEvent { id, epoch, event });
        });

        let options = settings.client_options(Credential::new(cookie));
        let mut client = ProtocolClient::new(options, on_event);
        // The outcome is also delivered as an event.
        let _attempt = client.connect();
        self.client = Some(client);

        self.set_status(SessionStatus::Connecting);
        true
    }

    /// Apply one client event from the current cycle.
    pub fn handle_event(&mut self, event: ClientEvent) -> Option<SessionSignal> {
        match event {
            ClientEvent::TransportConnected => {
                if self.status != SessionStatus::Connecting {
                    return None;
                }
                if let Some(client) = &self.client {
                    client.start_matching(
                        &self.preferences.interests,
                        self.preferences.prefer_same_country,
                    );
                }
                self.set_status(SessionStatus::Waiting);
                self.append_log(MessageSender::System, LOG_LOOKING);
                None
            }
            ClientEvent::Matched => {
                if self.status == SessionStatus::Waiting {
                    self.mark_matched();
                }
                None
            }
            ClientEvent::Message(message) => {
                if message.sender != MessageSender::Stranger {
                    // Our own lines are logged by send_message.
                    return None;
                }
                if self.status == SessionStatus::Waiting {
                    self.mark_matched();
                }
                if self.status != SessionStatus::Connected {
                    debug!("Session {} dropping stranger text while {}", self.id, self.status);
                    return None;
                }
                Some(SessionSignal::StrangerMessage(message.text))
            }
            ClientEvent::Typing(typing) => {
                self.publish(ControlEvent::Typing { id: self.id, typing });
                None
            }
            ClientEvent::PeopleOnline(count) => {
                self.publish(ControlEvent::PeopleOnline { id: self.id, count });
                None
            }
            ClientEvent::PeerCountry(country) => {
                info!("Session {} stranger is from {}", self.id, country.country_name);
                self.publish(ControlEvent::PeerCountry {
                    id: self.id,
                    country: country.country,
                    country_name: country.country_name,
                });
                None
            }
            ClientEvent::SelfCountry(country) => {
                debug!("Session {} country: {}", self.id, country.country);
                None
            }
            ClientEvent::Heartbeat(timestamp) => {
                trace!("Session {} heartbeat echo {timestamp}", self.id);
                None
            }
            ClientEvent::Waiting => None,
            ClientEvent::Error(err) => {
                if self.status == SessionStatus::Disconnected {
                    return None;
                }
                warn!("Session {} error: {err}", self.id);
                self.append_log(MessageSender::System, format!("Error: {err}"));
                self.lose_connection()
            }
            ClientEvent::Disconnected(reason) => {
                info!("Session {} disconnected: {reason:?}", self.id);
                self.lose_connection()
            }
        }
    }

    /// Local disconnect. Logs only when the status actually changes.
    pub fn disconnect(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
        if self.status != SessionStatus::Disconnected {
            self.set_status(SessionStatus::Disconnected);
            self.append_log(MessageSender::System, LOG_DISCONNECTED);
        }
    }

    /// Send `text` to the stranger and log it as ours.
    pub fn send_message(&mut self, text: &str) {
        self.send_message_logged_as(text, text.to_string());
    }

    /// Send `text` but record `log_text` in the log.
    pub fn send_message_logged_as(&mut self, text: &str, log_text: String) {
        match &self.client {
            Some(client) if self.status != SessionStatus::Disconnected => client.send_message(text),
            _ => debug!("Session {} not connected, message not sent", self.id),
        }
        self.append_log(MessageSender::You, log_text);
    }

    pub fn append_log(&mut self, sender: MessageSender, text: impl Into<String>) {
        let entry = LogEntry::new(sender, text);
        self.publish(ControlEvent::Message {
            id: self.id,
            sender: entry.sender,
            text: entry.text.clone(),
        });
        self.log.push(entry);
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.publish(ControlEvent::LogCleared { id: self.id });
    }

    pub fn update_transform(&mut self, transform: TransformConfig) {
        info!(
            "Session {} transform: gender inversion {}, number offset {}",
            self.id, transform.gender_inversion, transform.number_offset
        );
        self.transform = transform;
    }

    fn mark_matched(&mut self) {
        self.set_status(SessionStatus::Connected);
        self.append_log(MessageSender::System, LOG_CONNECTED);
    }

    fn lose_connection(&mut self) -> Option<SessionSignal> {
        if self.status == SessionStatus::Disconnected {
            return None;
        }
        let had_stranger = self.status == SessionStatus::Connected;
        self.client = None;
        self.set_status(SessionStatus::Disconnected);
        self.append_log(MessageSender::System, LOG_DISCONNECTED);
        had_stranger.then_some(SessionSignal::StrangerLost)
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        info!("Session {} is now {status}", self.id);
        self.status = status;
        self.publish(ControlEvent::Status { id: self.id, status });
    }

    fn publish(&self, event: ControlEvent) {
        if let Err(e) = self.events.try_broadcast(event) {
            trace!("Control event not delivered: {e}");
        }
    }
}
