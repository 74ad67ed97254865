use crate::contacts::ContactDirectory;
use crate::conversations::{ConversationList, ConversationStore, PersistenceHealth};
use crate::models::{Contact, ParticipantId};
use crate::projector::Projection;
use crate::router::MessageRouter;
use crate::storage::KeyValueStore;
use crate::transport::{ConnectionState, Connector, OfflineChannel, TransportChannel};
use std::sync::Arc;

/// Everything scoped to one local identity: conversation store, contact
/// directory and the routed transport channel. Dropping the session closes
/// the channel.
pub struct Session {
    conversations: ConversationStore,
    contacts: ContactDirectory,
    router: MessageRouter,
}

impl Session {
    /// Loads persisted state for `identity` and attaches a channel. A
    /// connector failure leaves the session offline rather than failing it.
    pub fn start(
        identity: impl Into<ParticipantId>,
        store: Arc<dyn KeyValueStore>,
        connector: &dyn Connector,
    ) -> Self {
        let identity = identity.into();
        let channel = open_channel(connector, &identity);
        let conversations = ConversationStore::load(identity, store.clone());
        let contacts = ContactDirectory::load(store);
        let router = MessageRouter::attach(conversations.clone(), channel);
        Self {
            conversations,
            contacts,
            router,
        }
    }

    /// Replaces the channel with a fresh one from `connector`. The old router
    /// is detached first, so its handler can no longer append.
    pub fn reconnect(&mut self, connector: &dyn Connector) {
        self.router.detach();
        let channel = open_channel(connector, self.identity());
        self.router = MessageRouter::attach(self.conversations.clone(), channel);
    }

    pub fn identity(&self) -> &str {
        self.conversations.local_id()
    }

    pub fn send_message(&self, recipients: Vec<ParticipantId>, text: impl Into<String>) {
        self.router.send_message(recipients, text);
    }

    pub fn create_conversation(&self, recipients: Vec<ParticipantId>) {
        self.conversations.create_conversation(recipients);
    }

    pub fn select_conversation(&self, index: usize) {
        self.conversations.select_conversation(index);
    }

    pub fn add_contact(&self, id: impl Into<ParticipantId>, name: impl Into<String>) {
        self.contacts.add(id, name);
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts.all()
    }

    pub fn lookup_contact(&self, id: &str) -> Option<String> {
        self.contacts.lookup(id)
    }

    pub fn conversations(&self) -> ConversationList {
        self.conversations.all()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Display model for the current state; recomputed on every call.
    pub fn projection(&self) -> Projection {
        let conversations = self.conversations.all();
        let contacts = self.contacts.all();
        Projection::build(
            conversations.as_slice(),
            &contacts,
            self.identity(),
            self.conversations.selected_index(),
        )
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.router.channel().state()
    }

    pub fn persistence_health(&self) -> PersistenceHealth {
        self.conversations.persistence_health()
    }

    /// Closes the channel and stops inbound delivery.
    pub fn close(&self) {
        self.router.detach();
    }
}

fn open_channel(connector: &dyn Connector, identity: &str) -> Arc<dyn TransportChannel> {
    match connector.connect(identity) {
        Ok(channel) => channel,
        Err(e) => {
            log::warn!("transport unavailable for {identity}, staying offline: {e}");
            OfflineChannel::new()
        }
    }
}
