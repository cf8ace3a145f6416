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

//! Dual-session relay coordinator.
//!
//! The coordinator owns both [`Session`]s and runs as a single task: one
//! `select!` loop over the control inbox and the sessions' client events.
//! All session state is mutated on that task, so nothing here is locked.
//!
//! Control events fan out through an `async-broadcast` channel in overflow
//! mode.  Subscribers that fall behind lose the oldest events rather than
//! stalling the relay.

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use chatrelay_types::{
    ConnectionAction, ControlCommand, ControlEvent, CookieStatus, MessageSender, SessionId,
    SessionStatus,
};
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;

use crate::constants::{BROADCAST_PREFIX, CONTROL_EVENT_CAPACITY, LOG_DISCONNECTED};
use crate::session::{Session, SessionEvent, SessionSignal};
use crate::settings::{DisconnectPolicy, RelaySettings};
use crate::transform::{self, TransformConfig};

/// Progress reported by whatever obtains the service cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialUpdate {
    Retrieving,
    Ready(String),
    Failed(String),
}

#[derive(Debug)]
enum Input {
    Control(ControlCommand),
    Credential(CredentialUpdate),
}

/// Cheap, cloneable access to a running [`Coordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    inbox: mpsc::UnboundedSender<Input>,
    events: InactiveReceiver<ControlEvent>,
}

impl CoordinatorHandle {
    /// Queue a control command. Returns `false` once the coordinator stopped.
    pub fn send(&self, command: ControlCommand) -> bool {
        self.inbox.send(Input::Control(command)).is_ok()
    }

    pub fn update_credential(&self, update: CredentialUpdate) -> bool {
        self.inbox.send(Input::Credential(update)).is_ok()
    }

    /// Receive every control event published from now on.
    pub fn subscribe(&self) -> Receiver<ControlEvent> {
        self.events.activate_cloned()
    }
}

pub struct Coordinator {
    settings: RelaySettings,
    credential: String,
    relay_enabled: bool,
    sessions: [Session; 2],
    events: Sender<ControlEvent>,
    _keepalive: InactiveReceiver<ControlEvent>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    inbox: mpsc::UnboundedReceiver<Input>,
}

impl Coordinator {
    pub fn new(
        settings: RelaySettings,
        credential: impl Into<String>,
    ) -> (Self, CoordinatorHandle) {
        let (mut events, receiver) = broadcast(CONTROL_EVENT_CAPACITY);
        events.set_overflow(true);
        let keepalive = receiver.deactivate();

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            relay_enabled: settings.relay_enabled,
            settings,
            credential: credential.into(),
            sessions: [
                Session::new(SessionId::First, events.clone()),
                Session::new(SessionId::Second, events.clone()),
            ],
            events,
            _keepalive: keepalive.clone(),
            session_tx,
            session_rx,
            inbox,
        };
        let handle = CoordinatorHandle {
            inbox: inbox_tx,
            events: keepalive,
        };
        (coordinator, handle)
    }

    /// Run until every [`CoordinatorHandle`] is dropped, then disconnect
    /// both sessions.
    pub async fn run(mut self) {
        info!(
            "Relay coordinator started (relay {}, {} disconnects)",
            if self.relay_enabled { "on" } else { "off" },
            self.settings.disconnect_policy
        );
        loop {
            tokio::select! {
                input = self.inbox.recv() => match input {
                    Some(Input::Control(command)) => self.handle_command(command),
                    Some(Input::Credential(update)) => self.handle_credential(update),
                    None => break,
                },
                Some(event) = self.session_rx.recv() => self.handle_session_event(event),
            }
        }
        for session in &mut self.sessions {
            session.disconnect();
        }
        info!("Relay coordinator stopped");
    }

    pub fn session(&self, id: SessionId) -> &Session {
        &self.sessions[id.index()]
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay_enabled
    }

    pub fn handle_command(&mut self, command: ControlCommand) {
        trace!("Control command: {command:?}");
        match command {
            ControlCommand::Spawn { id } => {
                let status = self.session(id).status();
                self.publish(ControlEvent::Status { id, status });
            }
            ControlCommand::Action { client_id, action } => match action {
                ConnectionAction::Connect => self.connect(client_id),
                ConnectionAction::Disconnect => self.disconnect(client_id),
            },
            ControlCommand::Settings {
                client_id,
                gender,
                offset,
            } => self.update_settings(
                client_id,
                TransformConfig {
                    gender_inversion: gender,
                    number_offset: offset,
                },
            ),
            ControlCommand::Relay { enabled } => self.set_relay_enabled(enabled),
            ControlCommand::Message { client_id, text } => self.send_message(client_id, &text),
            ControlCommand::Broadcast { text } => self.broadcast(&text),
        }
    }

    pub fn handle_credential(&mut self, update: CredentialUpdate) {
        let status = match update {
            CredentialUpdate::Retrieving => {
                info!("Retrieving chat service cookie");
                CookieStatus::Retrieving
            }
            CredentialUpdate::Ready(cookie) => {
                info!("Chat service cookie ready");
                self.credential = cookie;
                CookieStatus::Ready
            }
            CredentialUpdate::Failed(reason) => {
                warn!("Failed to obtain chat service cookie: {reason}");
                CookieStatus::Error
            }
        };
        self.publish(ControlEvent::CookieStatus { status });
    }

    /// Apply a client event, dropping it if it belongs to an older cycle.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent { id, epoch, event } = event;
        let session = &mut self.sessions[id.index()];
        if epoch != session.epoch() {
            trace!(
                "Dropping stale event for session {id} (epoch {epoch}, current {})",
                session.epoch()
            );
            return;
        }
        match session.handle_event(event) {
            Some(SessionSignal::StrangerMessage(text)) => self.relay(id, &text),
            Some(SessionSignal::StrangerLost) => self.stranger_lost(id),
            None => {}
        }
    }

    pub fn connect(&mut self, id: SessionId) {
        let Self {
            sessions,
            settings,
            credential,
            session_tx,
            ..
        } = self;
        sessions[id.index()].connect(settings, credential, session_tx);
    }

    pub fn disconnect(&mut self, id: SessionId) {
        self.sessions[id.index()].disconnect();
    }

    /// Send text as ourselves on `id`. Ignored unless that session is connected.
    pub fn send_message(&mut self, id: SessionId, text: &str) {
        let session = &mut self.sessions[id.index()];
        if session.status() != SessionStatus::Connected {
            debug!("Session {id} is {}, message ignored", session.status());
            return;
        }
        session.send_message(text);
    }

    /// Send `text` on every connected session.
    pub fn broadcast(&mut self, text: &str) {
        let logged = format!("{BROADCAST_PREFIX} {text}");
        let mut sent = 0;
        for session in &mut self.sessions {
            if session.status() == SessionStatus::Connected {
                session.send_message_logged_as(text, logged.clone());
                sent += 1;
            }
        }
        info!("{logged} (sent to {sent} session(s))");
    }

    pub fn update_settings(&mut self, id: SessionId, transform: TransformConfig) {
        self.sessions[id.index()].update_transform(transform);
    }

    pub fn set_relay_enabled(&mut self, enabled: bool) {
        info!("Relay {}", if enabled { "enabled" } else { "disabled" });
        self.relay_enabled = enabled;
        self.publish(ControlEvent::Relay { enabled });
    }

    fn relay(&mut self, from: SessionId, text: &str) {
        let source = &mut self.sessions[from.index()];
        let rewritten = transform::apply(text, &source.transform()).into_owned();
        if rewritten != text {
            debug!("Session {from} rewrote \"{text}\" -> \"{rewritten}\"");
        }
        source.append_log(MessageSender::Stranger, rewritten.clone());

        if !self.relay_enabled {
            return;
        }
        let to = from.partner();
        let target = &mut self.sessions[to.index()];
        if target.status() != SessionStatus::Connected {
            debug!("Session {to} is {}, nothing relayed", target.status());
            return;
        }
        debug!("Relaying session {from} -> session {to}");
        target.send_message(&rewritten);
    }

    fn stranger_lost(&mut self, id: SessionId) {
        let affected: Vec<SessionId> = match self.settings.disconnect_policy {
            DisconnectPolicy::Independent => vec![id],
            DisconnectPolicy::Synchronized => {
                info!("Stranger on session {id} left, resetting both sessions");
                for session in &mut self.sessions {
                    session.clear_log();
                    if session.status() == SessionStatus::Disconnected {
                        session.append_log(MessageSender::System, LOG_DISCONNECTED);
                    } else {
                        session.disconnect();
                    }
                }
                SessionId::ALL.to_vec()
            }
        };

        if self.settings.auto_rematch {
            for id in affected {
                info!("Looking for a new stranger on session {id}");
                self.connect(id);
            }
        }
    }

    fn publish(&self, event: ControlEvent) {
        if let Err(e) = self.events.try_broadcast(event) {
            trace!("Control event not delivered: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::events::{ClientEvent, DisconnectReason};
    use chatrelay_types::MessageEvent;

    fn settings(policy: DisconnectPolicy) -> RelaySettings {
        RelaySettings {
            server_url: "ws://127.0.0.1:1/".to_string(),
            disconnect_policy: policy,
            ..Default::default()
        }
    }

    fn feed(coordinator: &mut Coordinator, id: SessionId, event: ClientEvent) {
        let epoch = coordinator.session(id).epoch();
        coordinator.handle_session_event(SessionEvent { id, epoch, event });
    }

    fn bring_up(coordinator: &mut Coordinator, id: SessionId) {
        coordinator.connect(id);
        feed(coordinator, id, ClientEvent::TransportConnected);
        feed(coordinator, id, ClientEvent::Matched);
        assert_eq!(coordinator.session(id).status(), SessionStatus::Connected);
    }

    fn stranger(text: &str) -> ClientEvent {
        ClientEvent::Message(MessageEvent::new(MessageSender::Stranger, text))
    }

    fn sent_by_us(coordinator: &Coordinator, id: SessionId) -> Vec<String> {
        coordinator
            .session(id)
            .log()
            .iter()
            .filter(|e| e.sender == MessageSender::You)
            .map(|e| e.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_relay_applies_offset_of_source() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);
        c.update_settings(
            SessionId::First,
            TransformConfig {
                gender_inversion: false,
                number_offset: 2,
            },
        );

        feed(&mut c, SessionId::First, stranger("my number is 5"));

        let first_log = c.session(SessionId::First).log();
        let last = first_log.last().unwrap();
        assert_eq!(last.sender, MessageSender::Stranger);
        assert_eq!(last.text, "my number is 7");
        assert_eq!(sent_by_us(&c, SessionId::Second), vec!["my number is 7"]);
    }

    #[tokio::test]
    async fn test_relay_disabled_only_logs() {
        let (mut c, handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        let mut events = handle.subscribe();
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);

        c.handle_command(ControlCommand::Relay { enabled: false });
        assert!(!c.relay_enabled());
        feed(&mut c, SessionId::First, stranger("hello"));

        assert_eq!(c.session(SessionId::First).log().last().unwrap().text, "hello");
        assert!(sent_by_us(&c, SessionId::Second).is_empty());

        let mut saw_relay_event = false;
        while let Ok(event) = events.try_recv() {
            if event == (ControlEvent::Relay { enabled: false }) {
                saw_relay_event = true;
            }
        }
        assert!(saw_relay_event);
    }

    #[tokio::test]
    async fn test_relay_skips_partner_not_connected() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);

        feed(&mut c, SessionId::First, stranger("hi"));
        assert!(sent_by_us(&c, SessionId::Second).is_empty());
        assert_eq!(c.session(SessionId::Second).status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_gender_inversion_relayed() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);
        c.handle_command(ControlCommand::Settings {
            client_id: SessionId::Second,
            gender: true,
            offset: 0,
        });

        feed(&mut c, SessionId::Second, stranger("m 21"));
        assert_eq!(sent_by_us(&c, SessionId::First), vec!["f 21"]);
    }

    #[tokio::test]
    async fn test_remote_disconnect_resets_both() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);

        feed(
            &mut c,
            SessionId::First,
            ClientEvent::Disconnected(DisconnectReason::StrangerLeft),
        );

        for id in SessionId::ALL {
            let session = c.session(id);
            assert_eq!(session.status(), SessionStatus::Disconnected);
            assert_eq!(session.log().len(), 1);
            assert_eq!(session.log()[0].text, "Disconnected.");
        }
    }

    #[tokio::test]
    async fn test_synchronized_reset_logs_disconnect_once() {
        let (mut c, handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);
        let mut events = handle.subscribe();

        feed(
            &mut c,
            SessionId::First,
            ClientEvent::Disconnected(DisconnectReason::StrangerLeft),
        );

        let published: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        for id in SessionId::ALL {
            let cleared_at = published
                .iter()
                .position(|e| *e == ControlEvent::LogCleared { id })
                .expect("log cleared");
            let disconnected_after_clear = published[cleared_at..]
                .iter()
                .filter(|e| match e {
                    ControlEvent::Message { id: m, text, .. } => {
                        *m == id && text == LOG_DISCONNECTED
                    }
                    _ => false,
                })
                .count();
            assert_eq!(disconnected_after_clear, 1, "session {id}");
        }
    }

    #[tokio::test]
    async fn test_transport_error_resets_both() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);

        feed(
            &mut c,
            SessionId::Second,
            ClientEvent::Error(ClientError::Transport("reset by peer".into())),
        );
        assert_eq!(c.session(SessionId::First).status(), SessionStatus::Disconnected);
        assert_eq!(c.session(SessionId::Second).status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_independent_policy_keeps_partner() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Independent), "cf=1");
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);
        let partner_log_len = c.session(SessionId::Second).log().len();

        feed(
            &mut c,
            SessionId::First,
            ClientEvent::Disconnected(DisconnectReason::ConnectionClosed),
        );

        assert_eq!(c.session(SessionId::First).status(), SessionStatus::Disconnected);
        assert_eq!(c.session(SessionId::Second).status(), SessionStatus::Connected);
        assert_eq!(c.session(SessionId::Second).log().len(), partner_log_len);
    }

    #[tokio::test]
    async fn test_auto_rematch_reconnects_both() {
        let (mut c, _handle) = Coordinator::new(
            RelaySettings {
                auto_rematch: true,
                ..settings(DisconnectPolicy::Synchronized)
            },
            "cf=1",
        );
        bring_up(&mut c, SessionId::First);
        bring_up(&mut c, SessionId::Second);

        feed(
            &mut c,
            SessionId::Second,
            ClientEvent::Disconnected(DisconnectReason::StrangerLeft),
        );

        for id in SessionId::ALL {
            assert_eq!(c.session(id).status(), SessionStatus::Connecting);
            assert_eq!(c.session(id).epoch(), 2);
        }
    }

    #[tokio::test]
    async fn test_stale_epoch_is_ignored() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);
        c.disconnect(SessionId::First);
        c.connect(SessionId::First);
        assert_eq!(c.session(SessionId::First).epoch(), 2);

        c.handle_session_event(SessionEvent {
            id: SessionId::First,
            epoch: 1,
            event: ClientEvent::TransportConnected,
        });
        assert_eq!(c.session(SessionId::First).status(), SessionStatus::Connecting);
    }

    #[tokio::test]
    async fn test_broadcast_prefixes_log() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        bring_up(&mut c, SessionId::First);

        c.handle_command(ControlCommand::Broadcast {
            text: "hello both".into(),
        });

        assert_eq!(sent_by_us(&c, SessionId::First), vec!["[Broadcast] hello both"]);
        assert!(sent_by_us(&c, SessionId::Second).is_empty());
    }

    #[tokio::test]
    async fn test_message_command_requires_connected() {
        let (mut c, _handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        c.handle_command(ControlCommand::Message {
            client_id: SessionId::First,
            text: "ignored".into(),
        });
        assert!(c.session(SessionId::First).log().is_empty());

        bring_up(&mut c, SessionId::First);
        c.handle_command(ControlCommand::Message {
            client_id: SessionId::First,
            text: "hey".into(),
        });
        assert_eq!(sent_by_us(&c, SessionId::First), vec!["hey"]);
    }

    #[test]
    fn test_spawn_reports_status() {
        let (mut c, handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        let mut events = handle.subscribe();
        c.handle_command(ControlCommand::Spawn { id: SessionId::Second });
        assert_eq!(
            events.try_recv().unwrap(),
            ControlEvent::Status {
                id: SessionId::Second,
                status: SessionStatus::Disconnected
            }
        );
    }

    #[test]
    fn test_credential_updates_forwarded() {
        let (mut c, handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "");
        let mut events = handle.subscribe();
        c.handle_credential(CredentialUpdate::Retrieving);
        c.handle_credential(CredentialUpdate::Ready("cf_clearance=abc".into()));
        c.handle_credential(CredentialUpdate::Failed("timeout".into()));

        let statuses: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            statuses,
            vec![
                ControlEvent::CookieStatus {
                    status: CookieStatus::Retrieving
                },
                ControlEvent::CookieStatus {
                    status: CookieStatus::Ready
                },
                ControlEvent::CookieStatus {
                    status: CookieStatus::Error
                },
            ]
        );
        assert_eq!(c.credential, "cf_clearance=abc");
    }

    #[tokio::test]
    async fn test_run_stops_when_handles_dropped() {
        let (c, handle) = Coordinator::new(settings(DisconnectPolicy::Synchronized), "cf=1");
        let task = tokio::spawn(c.run());
        drop(handle);
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("coordinator should stop")
            .unwrap();
    }
}
