//! In-process transport.
//!
//! [`MemoryChannel`] records what it emits and lets callers inject inbound
//! messages. Channels opened through a [`MemoryHub`] are also relayed to each
//! other the way the chat server fans out `send-message`: every recipient
//! gets the message addressed to the other recipients plus the sender.

use super::events::{IncomingMessage, OutgoingMessage};
use super::{ChannelShared, ConnectionState, Connector, InboundHandler, TransportChannel};
use crate::error::TransportError;
use crate::models::ParticipantId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub struct MemoryChannel {
    identity: ParticipantId,
    shared: ChannelShared,
    sent: Mutex<Vec<OutgoingMessage>>,
    hub: Weak<HubInner>,
}

impl MemoryChannel {
    /// Standalone channel in the given state, not attached to any hub.
    pub fn new(identity: impl Into<ParticipantId>, state: ConnectionState) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.into(),
            shared: ChannelShared::new(state),
            sent: Mutex::new(Vec::new()),
            hub: Weak::new(),
        })
    }

    pub fn connected(identity: impl Into<ParticipantId>) -> Arc<Self> {
        Self::new(identity, ConnectionState::Connected)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.shared.set_state(state);
    }

    /// Simulates an inbound `receive-message`. Returns whether a handler ran.
    pub fn deliver(&self, message: IncomingMessage) -> bool {
        self.shared.deliver(message)
    }

    /// Simulates a raw inbound text frame.
    pub fn deliver_frame(&self, text: &str) {
        self.shared.dispatch_frame(text);
    }

    /// Everything successfully emitted so far, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }
}

impl TransportChannel for MemoryChannel {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn emit(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        if self.shared.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        lock(&self.sent).push(message.clone());
        if let Some(hub) = self.hub.upgrade() {
            hub.relay(&self.identity, message);
        }
        Ok(())
    }

    fn subscribe(&self, handler: InboundHandler) {
        self.shared.subscribe(handler);
    }

    fn unsubscribe(&self) {
        self.shared.unsubscribe();
    }

    fn close(&self) {
        self.shared.close();
    }
}

#[derive(Default)]
struct HubInner {
    peers: Mutex<HashMap<ParticipantId, Weak<MemoryChannel>>>,
}

impl HubInner {
    fn relay(&self, sender: &str, message: &OutgoingMessage) {
        let targets: Vec<(ParticipantId, Arc<MemoryChannel>)> = {
            let peers = lock(&self.peers);
            message
                .recipients
                .iter()
                .filter_map(|r| peers.get(r).and_then(Weak::upgrade).map(|ch| (r.clone(), ch)))
                .collect()
        };
        for (recipient, channel) in targets {
            let mut recipients: Vec<ParticipantId> = message
                .recipients
                .iter()
                .filter(|r| **r != recipient)
                .cloned()
                .collect();
            recipients.push(sender.to_string());
            channel.deliver(IncomingMessage {
                recipients,
                text: message.text.clone(),
                sender: sender.to_string(),
            });
        }
    }
}

/// Routes messages between in-process channels keyed by identity.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connected channel for `identity`, replacing any earlier one.
    pub fn open(&self, identity: &str) -> Arc<MemoryChannel> {
        let channel = Arc::new(MemoryChannel {
            identity: identity.to_string(),
            shared: ChannelShared::new(ConnectionState::Connected),
            sent: Mutex::new(Vec::new()),
            hub: Arc::downgrade(&self.inner),
        });
        lock(&self.inner.peers).insert(identity.to_string(), Arc::downgrade(&channel));
        channel
    }

    /// Most recent channel opened for `identity`, if still alive.
    pub fn channel(&self, identity: &str) -> Option<Arc<MemoryChannel>> {
        lock(&self.inner.peers).get(identity).and_then(Weak::upgrade)
    }
}

impl Connector for MemoryHub {
    fn connect(&self, identity: &str) -> Result<Arc<dyn TransportChannel>, TransportError> {
        let channel: Arc<dyn TransportChannel> = self.open(identity);
        Ok(channel)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (InboundHandler, Arc<Mutex<Vec<IncomingMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: InboundHandler = Arc::new(move |msg: IncomingMessage| lock(&sink).push(msg));
        (handler, seen)
    }

    #[test]
    fn emit_while_disconnected_is_rejected() {
        let channel = MemoryChannel::new("alice", ConnectionState::Disconnected);
        let result = channel.emit(&OutgoingMessage {
            recipients: vec!["bob".into()],
            text: "hi".into(),
        });
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn hub_fans_out_to_each_recipient() {
        let hub = MemoryHub::new();
        let alice = hub.open("alice");
        let bob = hub.open("bob");
        let carol = hub.open("carol");
        let (bob_handler, bob_seen) = collector();
        let (carol_handler, carol_seen) = collector();
        bob.subscribe(bob_handler);
        carol.subscribe(carol_handler);

        alice
            .emit(&OutgoingMessage {
                recipients: vec!["bob".into(), "carol".into()],
                text: "hello".into(),
            })
            .unwrap();

        let bob_seen = lock(&bob_seen);
        assert_eq!(bob_seen.len(), 1);
        assert_eq!(bob_seen[0].recipients, vec!["carol".to_string(), "alice".to_string()]);
        assert_eq!(bob_seen[0].sender, "alice");
        assert_eq!(lock(&carol_seen)[0].recipients, vec!["bob".to_string(), "alice".to_string()]);
    }

    #[test]
    fn closed_peer_receives_nothing() {
        let hub = MemoryHub::new();
        let alice = hub.open("alice");
        let bob = hub.open("bob");
        let (handler, seen) = collector();
        bob.subscribe(handler);
        bob.close();

        alice
            .emit(&OutgoingMessage {
                recipients: vec!["bob".into()],
                text: "anyone?".into(),
            })
            .unwrap();
        assert!(lock(&seen).is_empty());
    }

    #[test]
    fn malformed_frames_are_ignored() {
        let channel = MemoryChannel::connected("alice");
        let (handler, seen) = collector();
        channel.subscribe(handler);
        channel.deliver_frame("not json");
        channel.deliver_frame(
            r#"{"event":"receive-message","data":{"recipients":["bob"],"text":"ok","sender":"bob"}}"#,
        );
        assert_eq!(lock(&seen).len(), 1);
    }
}
