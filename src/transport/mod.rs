//! Transport channel boundary.
//!
//! A channel is bound to one local identity for its whole life:
//! `Disconnected -> Connecting -> Connected -> Disconnected`. Inbound
//! messages reach the subscribed handler only while `Connected`, and
//! outbound emits fail with [`TransportError::NotConnected`] otherwise.

pub mod events;
pub mod memory;
pub mod ws;

use crate::error::TransportError;
use events::{IncomingMessage, InboundEvent, OutgoingMessage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use memory::{MemoryChannel, MemoryHub};
pub use ws::{WsChannel, WsConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub type InboundHandler = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

pub trait TransportChannel: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Emits a `send-message` event. Fire-and-forget: no acknowledgement.
    fn emit(&self, message: &OutgoingMessage) -> Result<(), TransportError>;

    /// Installs the `receive-message` handler, replacing any previous one.
    fn subscribe(&self, handler: InboundHandler);

    fn unsubscribe(&self);

    /// Detaches the handler and moves to `Disconnected`. Idempotent.
    fn close(&self);
}

/// Opens a channel for a given local identity.
pub trait Connector: Send + Sync {
    fn connect(&self, identity: &str) -> Result<Arc<dyn TransportChannel>, TransportError>;
}

/// Stand-in for a channel that could not be opened. Stays `Disconnected`,
/// so emits fail and nothing is delivered; the session keeps working locally.
pub struct OfflineChannel {
    shared: ChannelShared,
}

impl OfflineChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: ChannelShared::new(ConnectionState::Disconnected),
        })
    }
}

impl TransportChannel for OfflineChannel {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn emit(&self, _message: &OutgoingMessage) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
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

/// State and handler slot shared between a channel handle and its driver.
pub(crate) struct ChannelShared {
    state: Mutex<ConnectionState>,
    handler: Mutex<Option<InboundHandler>>,
}

impl ChannelShared {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self {
            state: Mutex::new(state),
            handler: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        if *state != next {
            log::debug!("transport {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Moves to `next` only from `from`; returns whether it did.
    pub(crate) fn transition(&self, from: ConnectionState, next: ConnectionState) -> bool {
        let mut state = lock(&self.state);
        if *state != from {
            return false;
        }
        log::debug!("transport {from:?} -> {next:?}");
        *state = next;
        true
    }

    pub(crate) fn subscribe(&self, handler: InboundHandler) {
        *lock(&self.handler) = Some(handler);
    }

    pub(crate) fn unsubscribe(&self) {
        lock(&self.handler).take();
    }

    pub(crate) fn close(&self) {
        self.unsubscribe();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Hands `message` to the handler if connected and subscribed.
    pub(crate) fn deliver(&self, message: IncomingMessage) -> bool {
        if self.state() != ConnectionState::Connected {
            log::debug!("dropping inbound message while not connected");
            return false;
        }
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn dispatch_frame(&self, text: &str) {
        match events::decode_inbound(text) {
            Ok(InboundEvent::ReceiveMessage(message)) => {
                self.deliver(message);
            }
            Ok(InboundEvent::Unknown(event)) => log::debug!("ignoring '{event}' event"),
            Err(e) => log::warn!("ignoring undecodable frame: {e}"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(count: &Arc<AtomicUsize>) -> InboundHandler {
        let count = count.clone();
        Arc::new(move |_: IncomingMessage| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn incoming() -> IncomingMessage {
        IncomingMessage {
            recipients: vec!["alice".into()],
            text: "hi".into(),
            sender: "bob".into(),
        }
    }

    #[test]
    fn delivery_requires_connected_state() {
        let shared = ChannelShared::new(ConnectionState::Connecting);
        let count = Arc::new(AtomicUsize::new(0));
        shared.subscribe(counting_handler(&count));

        assert!(!shared.deliver(incoming()));
        assert!(shared.transition(ConnectionState::Connecting, ConnectionState::Connected));
        assert!(shared.deliver(incoming()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_detaches_handler() {
        let shared = ChannelShared::new(ConnectionState::Connected);
        let count = Arc::new(AtomicUsize::new(0));
        shared.subscribe(counting_handler(&count));
        shared.close();

        assert_eq!(shared.state(), ConnectionState::Disconnected);
        shared.set_state(ConnectionState::Connected);
        assert!(!shared.deliver(incoming()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn offline_channel_rejects_emits() {
        let channel = OfflineChannel::new();
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(matches!(
            channel.emit(&OutgoingMessage {
                recipients: vec!["bob".into()],
                text: "hi".into(),
            }),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn transition_only_from_expected_state() {
        let shared = ChannelShared::new(ConnectionState::Disconnected);
        assert!(!shared.transition(ConnectionState::Connecting, ConnectionState::Connected));
        assert_eq!(shared.state(), ConnectionState::Disconnected);
    }
}
