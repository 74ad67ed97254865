use crate::conversations::ConversationStore;
use crate::models::{Message, ParticipantId};
use crate::transport::events::{IncomingMessage, OutgoingMessage};
use crate::transport::TransportChannel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connects one transport channel to one conversation store.
///
/// Local sends go out on the channel and into the store; inbound messages go
/// into the store only. Both paths use the store's serialized append.
pub struct MessageRouter {
    store: ConversationStore,
    channel: Arc<dyn TransportChannel>,
    active: Arc<AtomicBool>,
}

impl MessageRouter {
    pub fn attach(store: ConversationStore, channel: Arc<dyn TransportChannel>) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let inbound_store = store.clone();
        let inbound_active = active.clone();
        channel.subscribe(Arc::new(move |incoming: IncomingMessage| {
            if !inbound_active.load(Ordering::SeqCst) {
                log::debug!("ignoring message for a detached session");
                return;
            }
            inbound_store.append_message(
                incoming.recipients,
                Message {
                    sender: incoming.sender,
                    text: incoming.text,
                },
            );
        }));
        Self {
            store,
            channel,
            active,
        }
    }

    /// Emits and appends. A failed emit drops the outbound copy; the local
    /// append still happens.
    pub fn send_message(&self, recipients: Vec<ParticipantId>, text: impl Into<String>) {
        let outgoing = OutgoingMessage {
            recipients,
            text: text.into(),
        };
        if let Err(e) = self.channel.emit(&outgoing) {
            log::warn!("outbound message dropped: {e}");
        }
        let message = Message::new(self.store.local_id(), outgoing.text);
        self.store.append_message(outgoing.recipients, message);
    }

    pub fn channel(&self) -> &Arc<dyn TransportChannel> {
        &self.channel
    }

    /// Stops inbound delivery and closes the channel. Idempotent.
    pub fn detach(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.channel.unsubscribe();
            self.channel.close();
            log::info!("detached transport for {}", self.store.local_id());
        }
    }
}

impl Drop for MessageRouter {
    fn drop(&mut self) {
        self.detach();
    }
}
